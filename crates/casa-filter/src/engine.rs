//! Override engine
//!
//! Creates time-bounded tightenings of the filter profile and guarantees
//! they are undone: every session captures a rollback plan before the first
//! remote write, an expiry timer replays it, and a status machine keeps the
//! rollback single-shot even when manual and timed paths race.

use crate::cache::ProfileCache;
use crate::client::{PolicyClient, PolicyError};
use crate::profile::{unknown_ids_message, FilterEntry, FilterKind, ParentalControl, ParentalPatch};
use crate::rollback::{DenylistRollback, ParentalSnapshot, RollbackPlan, RollbackReport};
use crate::session::{
    normalize_domains, normalize_ids, ActiveOverride, OverrideRequest, OverrideSession,
    OverrideTargets, SessionSnapshot, SessionStatus, StoredSession, MAX_DURATION_MINUTES,
    MIN_DURATION_MINUTES,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors from engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad input; nothing remote was touched.
    #[error("invalid request: {0}")]
    Validation(String),

    /// A remote call failed outside the apply path.
    #[error(transparent)]
    Remote(#[from] PolicyError),

    /// Applying an override failed partway; the accumulated plan was
    /// rolled back.
    #[error("override apply failed: {source}; {rollback}")]
    ApplyFailed {
        #[source]
        source: PolicyError,
        rollback: RollbackOutcome,
    },

    /// A rollback left items unrestored.
    #[error("rollback incomplete: {0}")]
    RollbackIncomplete(RollbackReport),
}

impl EngineError {
    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::Validation(_))
    }
}

/// How the compensating rollback went after a failed apply.
#[derive(Debug)]
pub enum RollbackOutcome {
    Restored,
    Partial(RollbackReport),
}

impl fmt::Display for RollbackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackOutcome::Restored => write!(f, "prior state restored"),
            RollbackOutcome::Partial(report) => write!(f, "rollback incomplete: {report}"),
        }
    }
}

/// Profile identity in state listings.
#[derive(Debug, Serialize)]
pub struct ProfileSummary {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// Filter state reported to clients: fresh profile blocks plus every
/// active session, soonest expiry first.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FiltersState {
    pub profile: ProfileSummary,
    pub parental_control: ParentalControl,
    pub privacy: serde_json::Value,
    pub denylist: Vec<FilterEntry>,
    pub allowlist: Vec<FilterEntry>,
    pub sessions: Vec<ActiveOverride>,
}

/// The override engine. One instance per filter profile.
pub struct OverrideEngine {
    pub(crate) client: Arc<dyn PolicyClient>,
    pub(crate) cache: ProfileCache,
    pub(crate) sessions: Mutex<HashMap<String, StoredSession>>,
}

impl OverrideEngine {
    pub fn new(client: Arc<dyn PolicyClient>) -> Self {
        Self {
            cache: ProfileCache::new(client.clone()),
            client,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Shared profile cache.
    pub fn cache(&self) -> &ProfileCache {
        &self.cache
    }

    /// Create an override session: tighten the profile now, register the
    /// session, and arm its rollback timer.
    pub async fn create_session(
        self: &Arc<Self>,
        request: OverrideRequest,
    ) -> Result<SessionSnapshot, EngineError> {
        // 1. Duration bounds
        if request.duration_minutes < MIN_DURATION_MINUTES
            || request.duration_minutes > MAX_DURATION_MINUTES
        {
            return Err(EngineError::Validation(format!(
                "duration_minutes must be between {} and {}",
                MIN_DURATION_MINUTES, MAX_DURATION_MINUTES
            )));
        }

        // 2. Deterministic targets
        let domains = normalize_domains(&request.domains);
        let category_ids = normalize_ids(&request.category_ids);
        let service_ids = normalize_ids(&request.service_ids);

        // 3. Fresh profile
        let profile = self.cache.get(true).await?;

        // 4. Unknown ids are rejected before anything is written
        let unknown_categories = profile
            .parental_control
            .unknown_ids(FilterKind::Category, category_ids.iter().map(String::as_str));
        let unknown_services = profile
            .parental_control
            .unknown_ids(FilterKind::Service, service_ids.iter().map(String::as_str));
        if !unknown_categories.is_empty() || !unknown_services.is_empty() {
            return Err(EngineError::Validation(unknown_ids_message(
                &unknown_categories,
                &unknown_services,
            )));
        }

        // 5. Capture the rollback plan before the first write
        let mut plan = RollbackPlan {
            parental: Some(ParentalSnapshot {
                safe_search: profile.parental_control.safe_search,
                youtube_restricted_mode: profile.parental_control.youtube_restricted_mode,
                block_bypass: profile.parental_control.block_bypass,
            }),
            ..Default::default()
        };
        for id in &category_ids {
            if let Some(active) = profile.parental_control.entry_active(FilterKind::Category, id) {
                plan.categories.push(FilterEntry::new(id.clone(), active));
            }
        }
        for id in &service_ids {
            if let Some(active) = profile.parental_control.entry_active(FilterKind::Service, id) {
                plan.services.push(FilterEntry::new(id.clone(), active));
            }
        }

        // 6-8. Apply; any failure rolls back whatever the plan holds so far
        if let Err(source) = self
            .apply_targets(&request, &category_ids, &service_ids, &domains, &mut plan)
            .await
        {
            warn!("override apply failed ({}); rolling back partial changes", source);
            let rollback = match self.apply_rollback(&plan).await {
                Ok(()) => RollbackOutcome::Restored,
                Err(report) => RollbackOutcome::Partial(report),
            };
            return Err(EngineError::ApplyFailed { source, rollback });
        }

        // 9. Register the session and arm its timer under one lock, so the
        // timer can never observe an unregistered session.
        let now = Utc::now();
        let expires_at = now + chrono::Duration::minutes(request.duration_minutes);
        let session = OverrideSession {
            id: Uuid::new_v4().simple().to_string(),
            status: SessionStatus::Active,
            created_at: now,
            expires_at,
            duration_minutes: request.duration_minutes,
            reason: request.reason.clone(),
            targets: OverrideTargets {
                domains,
                category_ids,
                service_ids,
                safe_search: request.safe_search,
                youtube_restricted_mode: request.youtube_restricted_mode,
                block_bypass: request.block_bypass,
            },
            rollback: plan,
            error: None,
        };
        let snapshot = session.snapshot();

        let mut sessions = self.sessions.lock().await;
        let timer = self.spawn_expiry(session.id.clone(), expires_at);
        info!(
            "override session {} active for {} min ({} domains, {} categories, {} services)",
            session.id,
            session.duration_minutes,
            session.targets.domains.len(),
            session.targets.category_ids.len(),
            session.targets.service_ids.len()
        );
        sessions.insert(
            session.id.clone(),
            StoredSession {
                session,
                timer: Some(timer),
            },
        );

        Ok(snapshot)
    }

    /// Steps 6-8 of session creation: one parental-control patch, then the
    /// deny-list entries one by one, extending the plan as each is touched.
    async fn apply_targets(
        &self,
        request: &OverrideRequest,
        category_ids: &[String],
        service_ids: &[String],
        domains: &[String],
        plan: &mut RollbackPlan,
    ) -> Result<(), PolicyError> {
        // 6. One patch covers scalars and both filter lists
        let patch = ParentalPatch {
            safe_search: Some(request.safe_search),
            youtube_restricted_mode: Some(request.youtube_restricted_mode),
            block_bypass: Some(request.block_bypass),
            categories: category_ids
                .iter()
                .map(|id| FilterEntry::new(id.clone(), true))
                .collect(),
            services: service_ids
                .iter()
                .map(|id| FilterEntry::new(id.clone(), true))
                .collect(),
        };
        self.client.patch_parental_control(&patch).await?;

        // 7. Authoritative deny-list state
        let profile = self.cache.get(true).await?;

        // 8. Prior state is recorded before each entry is touched, so a
        // failed write still gets compensated
        for domain in domains {
            match profile.denylist_entry(domain) {
                Some(entry) => {
                    plan.denylist.push(DenylistRollback {
                        domain: domain.clone(),
                        existed: true,
                        active: entry.active,
                    });
                    if !entry.active {
                        self.client.patch_denylist_entry(domain, true).await?;
                    }
                }
                None => {
                    plan.denylist.push(DenylistRollback {
                        domain: domain.clone(),
                        existed: false,
                        active: false,
                    });
                    self.client.create_denylist_entry(domain, true).await?;
                }
            }
        }
        Ok(())
    }

    fn spawn_expiry(self: &Arc<Self>, id: String, expires_at: DateTime<Utc>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let delay = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(delay).await;
            engine.expire_session(&id).await;
        })
    }

    /// Timer path: roll back once the deadline passes.
    async fn expire_session(&self, id: &str) {
        match self.roll_back(id, false).await {
            Ok(true) => info!("override session {} expired and was rolled back", id),
            Ok(false) => debug!("override session {} already cleared before expiry", id),
            Err(err) => warn!("override session {} expiry rollback failed: {}", id, err),
        }
    }

    /// Manually roll back an active session and cancel its expiry timer.
    ///
    /// Returns false when no active session has this id; rolling back a
    /// session twice is a no-op, not an error.
    pub async fn rollback_session(&self, id: &str) -> Result<bool, EngineError> {
        self.roll_back(id, true).await
    }

    async fn roll_back(&self, id: &str, cancel_timer: bool) -> Result<bool, EngineError> {
        // Check-and-mark is one critical section: a concurrent attempt sees
        // rolling_back and bails out.
        let plan = {
            let mut sessions = self.sessions.lock().await;
            let Some(entry) = sessions.get_mut(id) else {
                return Ok(false);
            };
            if !entry.session.status.is_active() {
                return Ok(false);
            }
            entry.session.status = SessionStatus::RollingBack;
            let timer = entry.timer.take();
            if cancel_timer {
                if let Some(timer) = timer {
                    timer.abort();
                }
            }
            entry.session.rollback.clone()
        };

        let outcome = self.apply_rollback(&plan).await;

        // Refresh either way: even a partial rollback changed remote state
        if let Err(err) = self.cache.refresh().await {
            warn!("profile refresh after rollback failed: {}", err);
        }

        match outcome {
            Ok(()) => {
                self.sessions.lock().await.remove(id);
                info!("override session {} rolled back", id);
                Ok(true)
            }
            Err(report) => {
                let mut sessions = self.sessions.lock().await;
                if let Some(entry) = sessions.get_mut(id) {
                    entry.session.status = SessionStatus::RollbackFailed;
                    entry.session.error = Some(report.to_string());
                }
                warn!("override session {} rollback failed: {}", id, report);
                Err(EngineError::RollbackIncomplete(report))
            }
        }
    }

    /// Replay a rollback plan with compensating writes. Per-item failures
    /// are collected so one bad entry cannot strand the rest.
    async fn apply_rollback(&self, plan: &RollbackPlan) -> Result<(), RollbackReport> {
        let mut report = RollbackReport::default();

        if let Some(patch) = plan.parental_patch() {
            if let Err(err) = self.client.patch_parental_control(&patch).await {
                report.push("parentalControl", err);
            }
        }

        for item in &plan.denylist {
            let result = if item.existed {
                self.client.patch_denylist_entry(&item.domain, item.active).await
            } else {
                self.client.delete_denylist_entry(&item.domain).await
            };
            if let Err(err) = result {
                report.push(format!("denylist:{}", item.domain), err);
            }
        }

        if report.is_clean() {
            Ok(())
        } else {
            Err(report)
        }
    }

    /// Current filter state: fresh profile plus active sessions ordered by
    /// soonest expiry.
    pub async fn filters_state(&self) -> Result<FiltersState, EngineError> {
        let profile = self.cache.get(true).await?;
        let now = Utc::now();

        let sessions = self.sessions.lock().await;
        let mut active: Vec<ActiveOverride> = sessions
            .values()
            .filter(|entry| entry.session.status.is_active())
            .map(|entry| {
                let session = &entry.session;
                ActiveOverride {
                    session_id: session.id.clone(),
                    expires_at: session.expires_at,
                    remaining_seconds: (session.expires_at - now).num_seconds().max(0),
                    duration_minutes: session.duration_minutes,
                    reason: session.reason.clone(),
                    targets: session.targets.clone(),
                }
            })
            .collect();
        drop(sessions);
        active.sort_by(|a, b| a.expires_at.cmp(&b.expires_at));

        Ok(FiltersState {
            profile: ProfileSummary {
                id: profile.id.clone(),
                name: profile.name.clone(),
            },
            parental_control: profile.parental_control,
            privacy: profile.privacy,
            denylist: profile.denylist,
            allowlist: profile.allowlist,
            sessions: active,
        })
    }

    /// Sessions stuck in rollback_failed, oldest first.
    pub async fn failed_sessions(&self) -> Vec<SessionSnapshot> {
        let sessions = self.sessions.lock().await;
        let mut failed: Vec<SessionSnapshot> = sessions
            .values()
            .filter(|entry| entry.session.status.is_failed())
            .map(|entry| entry.session.snapshot())
            .collect();
        failed.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        failed
    }

    /// Drop a rollback_failed record without retrying its rollback.
    pub async fn clear_failed(&self, id: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(id) {
            Some(entry) if entry.session.status.is_failed() => {
                sessions.remove(id);
                info!("cleared failed override session {}", id);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{profile_fixture, Call, FakePolicy};
    use serde_json::json;

    fn engine_with_fixture() -> (Arc<OverrideEngine>, Arc<FakePolicy>) {
        let fake = FakePolicy::with_profile(profile_fixture());
        let engine = Arc::new(OverrideEngine::new(fake.clone()));
        (engine, fake)
    }

    fn request(duration: i64) -> OverrideRequest {
        OverrideRequest {
            duration_minutes: duration,
            ..Default::default()
        }
    }

    /// Let spawned tasks run after a paused-clock advance.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_create_session_patches_and_registers() {
        let (engine, fake) = engine_with_fixture();

        let snapshot = engine
            .create_session(OverrideRequest {
                duration_minutes: 30,
                category_ids: vec!["ads".to_string()],
                domains: vec!["foo.com".to_string()],
                reason: Some("homework".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(snapshot.status, SessionStatus::Active);
        assert_eq!(snapshot.duration_minutes, 30);
        assert_eq!(snapshot.targets.domains, vec!["foo.com"]);
        assert_eq!(snapshot.targets.category_ids, vec!["ads"]);
        assert_eq!(
            snapshot.expires_at - snapshot.created_at,
            chrono::Duration::minutes(30)
        );

        assert_eq!(
            fake.calls(),
            vec![
                Call::FetchProfile,
                Call::PatchParental(json!({
                    "safeSearch": true,
                    "youtubeRestrictedMode": true,
                    "blockBypass": true,
                    "categories": [{"id": "ads", "active": true}]
                })),
                Call::FetchProfile,
                Call::CreateDenylist {
                    domain: "foo.com".to_string(),
                    active: true
                },
            ]
        );

        let state = engine.filters_state().await.unwrap();
        assert_eq!(state.sessions.len(), 1);
        assert_eq!(state.sessions[0].session_id, snapshot.session_id);
        assert!(state.sessions[0].remaining_seconds > 0);
        assert!(state.sessions[0].remaining_seconds <= 30 * 60);
    }

    #[tokio::test]
    async fn test_unknown_ids_rejected_before_any_write() {
        let (engine, fake) = engine_with_fixture();

        let err = engine
            .create_session(OverrideRequest {
                duration_minutes: 30,
                category_ids: vec!["ads".to_string(), "gaming".to_string()],
                service_ids: vec!["zoom".to_string()],
                ..Default::default()
            })
            .await
            .unwrap_err();

        match err {
            EngineError::Validation(message) => {
                assert!(message.contains("unknown category ids: gaming"));
                assert!(message.contains("unknown service ids: zoom"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(fake.mutations().is_empty());
        assert!(engine.filters_state().await.unwrap().sessions.is_empty());
    }

    #[tokio::test]
    async fn test_duration_bounds_checked_first() {
        let (engine, fake) = engine_with_fixture();

        for bad in [4, 1441, 0, -5] {
            let err = engine.create_session(request(bad)).await.unwrap_err();
            assert!(err.is_validation(), "duration {bad} should be rejected");
        }
        // Validation precedes even the profile read
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_domains_normalized_before_apply() {
        let (engine, fake) = engine_with_fixture();

        let snapshot = engine
            .create_session(OverrideRequest {
                duration_minutes: 30,
                domains: vec!["  Example.com.  ".to_string(), "example.COM".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(snapshot.targets.domains, vec!["example.com"]);
        assert!(fake.calls().contains(&Call::CreateDenylist {
            domain: "example.com".to_string(),
            active: true
        }));
    }

    #[tokio::test]
    async fn test_preexisting_inactive_domain_patched_then_restored() {
        let (engine, fake) = engine_with_fixture();

        // bar.com pre-exists inactive in the fixture
        let snapshot = engine
            .create_session(OverrideRequest {
                duration_minutes: 30,
                domains: vec!["bar.com".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();

        let mutations = fake.mutations();
        assert!(mutations.contains(&Call::PatchDenylist {
            domain: "bar.com".to_string(),
            active: true
        }));
        assert!(!mutations.iter().any(|c| matches!(c, Call::CreateDenylist { .. })));

        fake.clear_calls();
        assert!(engine.rollback_session(&snapshot.session_id).await.unwrap());

        let mutations = fake.mutations();
        assert!(mutations.contains(&Call::PatchDenylist {
            domain: "bar.com".to_string(),
            active: false
        }));
        assert!(!mutations.iter().any(|c| matches!(c, Call::DeleteDenylist { .. })));
    }

    #[tokio::test]
    async fn test_preexisting_active_domain_left_alone_on_apply() {
        let (engine, fake) = engine_with_fixture();

        // baz.com pre-exists active; applying must not touch it
        let snapshot = engine
            .create_session(OverrideRequest {
                duration_minutes: 30,
                domains: vec!["baz.com".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(
            !fake
                .mutations()
                .iter()
                .any(|c| matches!(c, Call::PatchDenylist { .. } | Call::CreateDenylist { .. }))
        );

        // Rollback rewrites the recorded value
        fake.clear_calls();
        engine.rollback_session(&snapshot.session_id).await.unwrap();
        assert!(fake.mutations().contains(&Call::PatchDenylist {
            domain: "baz.com".to_string(),
            active: true
        }));
    }

    #[tokio::test]
    async fn test_created_domain_deleted_on_rollback() {
        let (engine, fake) = engine_with_fixture();

        let snapshot = engine
            .create_session(OverrideRequest {
                duration_minutes: 30,
                domains: vec!["foo.com".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();

        fake.clear_calls();
        assert!(engine.rollback_session(&snapshot.session_id).await.unwrap());

        let mutations = fake.mutations();
        assert!(mutations.contains(&Call::DeleteDenylist {
            domain: "foo.com".to_string()
        }));
        assert!(!mutations.iter().any(|c| matches!(c, Call::PatchDenylist { .. })));

        // Second rollback is a no-op
        assert!(!engine.rollback_session(&snapshot.session_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_apply_rolls_back_accumulated_plan() {
        let (engine, fake) = engine_with_fixture();
        fake.fail("create:bad.com");

        let err = engine
            .create_session(OverrideRequest {
                duration_minutes: 30,
                category_ids: vec!["ads".to_string()],
                // Sorted order guarantees apple.com is created before
                // bad.com fails
                domains: vec!["bad.com".to_string(), "apple.com".to_string()],
                ..Default::default()
            })
            .await
            .unwrap_err();

        match &err {
            EngineError::ApplyFailed { rollback, .. } => {
                assert!(matches!(rollback, RollbackOutcome::Restored));
            }
            other => panic!("expected apply failure, got {other:?}"),
        }

        let calls = fake.calls();
        // The tightening patch and its exact compensation, once each
        let parental_patches: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                Call::PatchParental(payload) => Some(payload.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(parental_patches.len(), 2);
        assert_eq!(
            parental_patches[1],
            json!({
                "safeSearch": false,
                "youtubeRestrictedMode": false,
                "blockBypass": false,
                "categories": [{"id": "ads", "active": false}]
            })
        );
        // Both touched domains are compensated, including the failed one
        assert!(calls.contains(&Call::DeleteDenylist {
            domain: "apple.com".to_string()
        }));
        assert!(calls.contains(&Call::DeleteDenylist {
            domain: "bad.com".to_string()
        }));

        // No session was registered
        assert!(engine.filters_state().await.unwrap().sessions.is_empty());
        assert!(engine.failed_sessions().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_expires_and_rolls_back() {
        let (engine, fake) = engine_with_fixture();

        let snapshot = engine
            .create_session(OverrideRequest {
                duration_minutes: 5,
                domains: vec!["foo.com".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();

        fake.clear_calls();
        settle().await;
        tokio::time::advance(Duration::from_secs(5 * 60 + 1)).await;
        settle().await;

        assert!(fake.mutations().contains(&Call::DeleteDenylist {
            domain: "foo.com".to_string()
        }));
        // Gone from the store entirely
        assert!(!engine.rollback_session(&snapshot.session_id).await.unwrap());
        assert!(engine.failed_sessions().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_rollback_cancels_timer() {
        let (engine, fake) = engine_with_fixture();

        let snapshot = engine
            .create_session(OverrideRequest {
                duration_minutes: 5,
                domains: vec!["foo.com".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(engine.rollback_session(&snapshot.session_id).await.unwrap());
        fake.clear_calls();

        // Long past the deadline, the cancelled timer must not fire a
        // second rollback
        tokio::time::advance(Duration::from_secs(60 * 60)).await;
        settle().await;
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_failure_marks_session_and_keeps_it() {
        let (engine, fake) = engine_with_fixture();

        let snapshot = engine
            .create_session(OverrideRequest {
                duration_minutes: 30,
                domains: vec!["foo.com".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();

        fake.fail("delete:foo.com");
        let err = engine
            .rollback_session(&snapshot.session_id)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RollbackIncomplete(_)));

        // Retained with its error, no longer listed as active
        let failed = engine.failed_sessions().await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].status, SessionStatus::RollbackFailed);
        assert!(failed[0]
            .error
            .as_deref()
            .unwrap()
            .contains("denylist:foo.com"));
        assert!(engine.filters_state().await.unwrap().sessions.is_empty());

        // Not retried by another rollback call
        fake.clear_calls();
        assert!(!engine.rollback_session(&snapshot.session_id).await.unwrap());
        assert!(fake.calls().is_empty());

        // Cleared only explicitly
        assert!(engine.clear_failed(&snapshot.session_id).await);
        assert!(engine.failed_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_rollback_collects_every_failure() {
        let (engine, fake) = engine_with_fixture();

        let snapshot = engine
            .create_session(OverrideRequest {
                duration_minutes: 30,
                category_ids: vec!["ads".to_string()],
                domains: vec!["apple.com".to_string(), "foo.com".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();

        fake.clear_calls();
        fake.fail("patch_parental");
        fake.fail("delete:apple.com");

        let err = engine
            .rollback_session(&snapshot.session_id)
            .await
            .unwrap_err();
        let EngineError::RollbackIncomplete(report) = err else {
            panic!("expected incomplete rollback");
        };

        let targets: Vec<&str> = report.failures.iter().map(|f| f.target.as_str()).collect();
        assert_eq!(targets, vec!["parentalControl", "denylist:apple.com"]);
        // The healthy item was still attempted
        assert!(fake.mutations().contains(&Call::DeleteDenylist {
            domain: "foo.com".to_string()
        }));
    }

    #[tokio::test]
    async fn test_state_sorted_by_soonest_expiry() {
        let (engine, _fake) = engine_with_fixture();

        engine.create_session(request(120)).await.unwrap();
        engine.create_session(request(5)).await.unwrap();
        engine.create_session(request(45)).await.unwrap();

        let state = engine.filters_state().await.unwrap();
        let durations: Vec<i64> = state
            .sessions
            .iter()
            .map(|s| s.duration_minutes)
            .collect();
        assert_eq!(durations, vec![5, 45, 120]);

        // Wire casing follows the remote vocabulary
        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("parentalControl").is_some());
        assert!(json.get("denylist").is_some());
    }
}
