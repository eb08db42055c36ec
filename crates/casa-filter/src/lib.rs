//! casa Filter Layer
//!
//! Temporary overrides for the content-filter profile, with guaranteed
//! rollback.
//!
//! Architecture:
//! 1. `PolicyClient` is the remote profile API seam (NextDNS-backed impl)
//! 2. `ProfileCache` holds one shared snapshot with single-flight refresh
//! 3. `OverrideEngine` runs session create/rollback/expiry and the direct
//!    profile controls
//! 4. Sessions live in memory only; a restart forfeits running timers

mod cache;
mod client;
mod controls;
mod engine;
mod profile;
mod rollback;
mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::ProfileCache;
pub use client::{NextDnsClient, PolicyClient, PolicyError};
pub use controls::{LockdownSummary, ParentalUpdate, ProfileSettings};
pub use engine::{EngineError, FiltersState, OverrideEngine, ProfileSummary, RollbackOutcome};
pub use profile::{FilterEntry, FilterKind, ParentalControl, ParentalPatch, Profile};
pub use rollback::{DenylistRollback, ParentalSnapshot, RollbackFailure, RollbackPlan, RollbackReport};
pub use session::{
    ActiveOverride, OverrideRequest, OverrideSession, OverrideTargets, SessionSnapshot,
    SessionStatus, MAX_DURATION_MINUTES, MIN_DURATION_MINUTES,
};
