//! Rollback plans
//!
//! A plan is captured from the live profile before the first remote write
//! of a session. Replaying it issues compensating writes that put every
//! touched setting back to its recorded prior state.

use crate::client::PolicyError;
use crate::profile::{FilterEntry, ParentalPatch};
use serde::Serialize;
use std::fmt;

/// Prior parental-control scalars.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentalSnapshot {
    pub safe_search: bool,
    pub youtube_restricted_mode: bool,
    pub block_bypass: bool,
}

/// Prior state of one deny-list domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DenylistRollback {
    pub domain: String,
    /// The entry existed before the session touched it.
    pub existed: bool,
    /// Prior `active` value; meaningful only when `existed`.
    pub active: bool,
}

/// Everything needed to restore the profile to its pre-session state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RollbackPlan {
    pub parental: Option<ParentalSnapshot>,
    /// Prior `active` values of the categories the session turned on.
    pub categories: Vec<FilterEntry>,
    /// Prior `active` values of the services the session turned on.
    pub services: Vec<FilterEntry>,
    /// Deny-list domains in the order the session touched them.
    pub denylist: Vec<DenylistRollback>,
}

impl RollbackPlan {
    /// Compensating parental-control patch, when the plan captured one.
    pub fn parental_patch(&self) -> Option<ParentalPatch> {
        if self.parental.is_none() && self.categories.is_empty() && self.services.is_empty() {
            return None;
        }

        let mut patch = ParentalPatch {
            categories: self.categories.clone(),
            services: self.services.clone(),
            ..Default::default()
        };
        if let Some(parental) = &self.parental {
            patch.safe_search = Some(parental.safe_search);
            patch.youtube_restricted_mode = Some(parental.youtube_restricted_mode);
            patch.block_bypass = Some(parental.block_bypass);
        }
        Some(patch)
    }
}

/// One rollback item that could not be restored.
#[derive(Debug)]
pub struct RollbackFailure {
    /// "parentalControl" or "denylist:{domain}".
    pub target: String,
    pub error: PolicyError,
}

/// Failures collected while replaying a plan. Empty means fully restored.
#[derive(Debug, Default)]
pub struct RollbackReport {
    pub failures: Vec<RollbackFailure>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn push(&mut self, target: impl Into<String>, error: PolicyError) {
        self.failures.push(RollbackFailure {
            target: target.into(),
            error,
        });
    }
}

impl fmt::Display for RollbackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failures.is_empty() {
            return write!(f, "no failures");
        }
        let parts: Vec<String> = self
            .failures
            .iter()
            .map(|failure| format!("{}: {}", failure.target, failure.error))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for RollbackReport {}
