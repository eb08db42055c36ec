//! Override sessions
//!
//! A session is one temporary tightening of the filter profile: what was
//! requested, when it ends, and the rollback plan that undoes it.

use crate::rollback::RollbackPlan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tokio::task::JoinHandle;

/// Session duration bounds, in minutes.
pub const MIN_DURATION_MINUTES: i64 = 5;
pub const MAX_DURATION_MINUTES: i64 = 1440;

/// Lifecycle of an override session.
///
/// `active` is the only state a rollback can start from; `rolling_back`
/// makes the transition visible so a concurrent attempt becomes a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    RollingBack,
    RollbackFailed,
}

impl SessionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Active)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SessionStatus::RollbackFailed)
    }
}

/// Request to create an override session.
///
/// Scalar flags default to on; the camelCase aliases accept the remote
/// API's spelling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverrideRequest {
    pub duration_minutes: i64,
    pub reason: Option<String>,
    pub domains: Vec<String>,
    #[serde(alias = "categoryIds")]
    pub category_ids: Vec<String>,
    #[serde(alias = "serviceIds")]
    pub service_ids: Vec<String>,
    #[serde(alias = "safeSearch")]
    pub safe_search: bool,
    #[serde(alias = "youtubeRestrictedMode")]
    pub youtube_restricted_mode: bool,
    #[serde(alias = "blockBypass")]
    pub block_bypass: bool,
}

impl Default for OverrideRequest {
    fn default() -> Self {
        Self {
            duration_minutes: 60,
            reason: None,
            domains: Vec::new(),
            category_ids: Vec::new(),
            service_ids: Vec::new(),
            safe_search: true,
            youtube_restricted_mode: true,
            block_bypass: true,
        }
    }
}

/// What a session enforced, echoed back to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverrideTargets {
    pub domains: Vec<String>,
    pub category_ids: Vec<String>,
    pub service_ids: Vec<String>,
    #[serde(rename = "safeSearch")]
    pub safe_search: bool,
    #[serde(rename = "youtubeRestrictedMode")]
    pub youtube_restricted_mode: bool,
    #[serde(rename = "blockBypass")]
    pub block_bypass: bool,
}

/// One tracked session.
#[derive(Debug, Clone)]
pub struct OverrideSession {
    pub id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub reason: Option<String>,
    pub targets: OverrideTargets,
    pub rollback: RollbackPlan,
    /// Rollback failure detail, once there is one.
    pub error: Option<String>,
}

impl OverrideSession {
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            status: self.status,
            created_at: self.created_at,
            expires_at: self.expires_at,
            duration_minutes: self.duration_minutes,
            reason: self.reason.clone(),
            targets: self.targets.clone(),
            error: self.error.clone(),
        }
    }
}

/// Client-facing view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub duration_minutes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub targets: OverrideTargets,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Active-session entry in state listings.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveOverride {
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
    pub remaining_seconds: i64,
    pub duration_minutes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub targets: OverrideTargets,
}

/// A stored session plus its expiry-timer handle.
///
/// The handle is taken on rollback: aborted by the manual path, merely
/// dropped by the timer path (a task never aborts itself).
pub(crate) struct StoredSession {
    pub session: OverrideSession,
    pub timer: Option<JoinHandle<()>>,
}

/// Normalize one domain: trim, lowercase, strip trailing dots.
pub fn normalize_domain(raw: &str) -> String {
    raw.trim().to_lowercase().trim_end_matches('.').to_string()
}

/// Normalize a domain list: per-domain normalization, empties dropped,
/// deduplicated, sorted.
pub fn normalize_domains(raw: &[String]) -> Vec<String> {
    let mut out = BTreeSet::new();
    for domain in raw {
        let normalized = normalize_domain(domain);
        if !normalized.is_empty() {
            out.insert(normalized);
        }
    }
    out.into_iter().collect()
}

/// Trim, drop empties, deduplicate, and sort an id list.
pub fn normalize_ids(raw: &[String]) -> Vec<String> {
    let mut out = BTreeSet::new();
    for id in raw {
        let trimmed = id.trim();
        if !trimmed.is_empty() {
            out.insert(trimmed.to_string());
        }
    }
    out.into_iter().collect()
}
