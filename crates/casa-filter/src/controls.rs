//! Filter controls outside the override lifecycle
//!
//! Direct reads and writes against the profile: lockdown, deny-list adds,
//! parental-control and privacy updates. These share the engine's client
//! and cache but never touch sessions.

use crate::engine::{EngineError, OverrideEngine};
use crate::profile::{
    unknown_ids_message, FilterEntry, FilterKind, ParentalControl, ParentalPatch,
};
use crate::session::normalize_domain;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Parental-control update: scalar flags plus per-id toggles.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParentalUpdate {
    #[serde(alias = "safeSearch")]
    pub safe_search: Option<bool>,
    #[serde(alias = "youtubeRestrictedMode")]
    pub youtube_restricted_mode: Option<bool>,
    #[serde(alias = "blockBypass")]
    pub block_bypass: Option<bool>,
    pub categories: BTreeMap<String, bool>,
    pub services: BTreeMap<String, bool>,
}

impl ParentalUpdate {
    pub fn is_empty(&self) -> bool {
        self.safe_search.is_none()
            && self.youtube_restricted_mode.is_none()
            && self.block_bypass.is_none()
            && self.categories.is_empty()
            && self.services.is_empty()
    }
}

/// What a lockdown toggle touched.
#[derive(Debug, Serialize)]
pub struct LockdownSummary {
    pub active: bool,
    pub categories: usize,
    pub denylist: usize,
}

/// Profile blocks relayed as-is to clients.
#[derive(Debug, Serialize)]
pub struct ProfileSettings {
    pub name: Option<String>,
    pub security: serde_json::Value,
    pub privacy: serde_json::Value,
    pub performance: serde_json::Value,
    pub settings: serde_json::Value,
}

impl OverrideEngine {
    /// Flip the whole profile into or out of lockdown: safe search plus
    /// every category in one patch, then every deny-list entry.
    pub async fn set_lockdown(&self, active: bool) -> Result<LockdownSummary, EngineError> {
        let profile = self.cache.get(true).await?;

        let patch = ParentalPatch {
            safe_search: Some(active),
            categories: profile
                .parental_control
                .categories
                .iter()
                .map(|entry| FilterEntry::new(entry.id.clone(), active))
                .collect(),
            ..Default::default()
        };
        let categories = patch.categories.len();
        self.client.patch_parental_control(&patch).await?;

        let mut denylist = 0;
        for entry in &profile.denylist {
            self.client.patch_denylist_entry(&entry.id, active).await?;
            denylist += 1;
        }

        self.cache.refresh().await?;
        info!(
            "lockdown {} ({} categories, {} deny-list entries)",
            if active { "enabled" } else { "disabled" },
            categories,
            denylist
        );
        Ok(LockdownSummary {
            active,
            categories,
            denylist,
        })
    }

    /// Add one domain to the deny list, active immediately.
    pub async fn add_to_denylist(&self, raw_domain: &str) -> Result<String, EngineError> {
        let domain = normalize_domain(raw_domain);
        if domain.is_empty() {
            return Err(EngineError::Validation(
                "domain must not be empty".to_string(),
            ));
        }

        self.client.create_denylist_entry(&domain, true).await?;
        self.cache.refresh().await?;
        info!("deny-list entry added: {}", domain);
        Ok(domain)
    }

    /// Update parental controls. Unknown ids are rejected before any write.
    pub async fn update_parental_controls(
        &self,
        update: &ParentalUpdate,
    ) -> Result<ParentalControl, EngineError> {
        if update.is_empty() {
            return Err(EngineError::Validation(
                "no parental-control changes provided".to_string(),
            ));
        }

        let profile = self.cache.get(true).await?;
        let unknown_categories = profile
            .parental_control
            .unknown_ids(FilterKind::Category, update.categories.keys().map(String::as_str));
        let unknown_services = profile
            .parental_control
            .unknown_ids(FilterKind::Service, update.services.keys().map(String::as_str));
        if !unknown_categories.is_empty() || !unknown_services.is_empty() {
            return Err(EngineError::Validation(unknown_ids_message(
                &unknown_categories,
                &unknown_services,
            )));
        }

        let patch = ParentalPatch {
            safe_search: update.safe_search,
            youtube_restricted_mode: update.youtube_restricted_mode,
            block_bypass: update.block_bypass,
            categories: update
                .categories
                .iter()
                .map(|(id, active)| FilterEntry::new(id.clone(), *active))
                .collect(),
            services: update
                .services
                .iter()
                .map(|(id, active)| FilterEntry::new(id.clone(), *active))
                .collect(),
        };
        self.client.patch_parental_control(&patch).await?;

        let refreshed = self.cache.refresh().await?;
        Ok(refreshed.parental_control)
    }

    /// Toggle a single category or service.
    pub async fn toggle_filter(
        &self,
        kind: FilterKind,
        id: &str,
        active: bool,
    ) -> Result<ParentalControl, EngineError> {
        let mut update = ParentalUpdate::default();
        match kind {
            FilterKind::Category => {
                update.categories.insert(id.to_string(), active);
            }
            FilterKind::Service => {
                update.services.insert(id.to_string(), active);
            }
        }
        self.update_parental_controls(&update).await
    }

    /// Patch the privacy block and return the refreshed view.
    pub async fn update_privacy(
        &self,
        updates: &serde_json::Value,
    ) -> Result<serde_json::Value, EngineError> {
        let valid = updates.as_object().is_some_and(|o| !o.is_empty());
        if !valid {
            return Err(EngineError::Validation(
                "privacy update must be a non-empty object".to_string(),
            ));
        }

        self.client.patch_privacy(updates).await?;
        let refreshed = self.cache.refresh().await?;
        Ok(refreshed.privacy)
    }

    /// Profile settings blocks (cached).
    pub async fn settings(&self) -> Result<ProfileSettings, EngineError> {
        let profile = self.cache.get(false).await?;
        Ok(ProfileSettings {
            name: profile.name,
            security: profile.security,
            privacy: profile.privacy,
            performance: profile.performance,
            settings: profile.settings,
        })
    }

    /// Parental-control block (cached).
    pub async fn parental_controls(&self) -> Result<ParentalControl, EngineError> {
        Ok(self.cache.get(false).await?.parental_control)
    }

    /// Deny list (cached).
    pub async fn denylist(&self) -> Result<Vec<FilterEntry>, EngineError> {
        Ok(self.cache.get(false).await?.denylist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{profile_fixture, Call, FakePolicy};
    use std::sync::Arc;

    fn engine_with_fixture() -> (Arc<OverrideEngine>, Arc<FakePolicy>) {
        let fake = FakePolicy::with_profile(profile_fixture());
        let engine = Arc::new(OverrideEngine::new(fake.clone()));
        (engine, fake)
    }

    #[tokio::test]
    async fn test_lockdown_touches_every_category_and_deny_entry() {
        let (engine, fake) = engine_with_fixture();

        let summary = engine.set_lockdown(true).await.unwrap();
        assert!(summary.active);
        assert_eq!(summary.categories, 2);
        assert_eq!(summary.denylist, 2);

        let mutations = fake.mutations();
        let Call::PatchParental(payload) = &mutations[0] else {
            panic!("first mutation should be the parental patch");
        };
        assert_eq!(payload["safeSearch"], true);
        assert_eq!(payload["categories"].as_array().unwrap().len(), 2);
        assert!(payload.get("services").is_none());

        assert!(mutations.contains(&Call::PatchDenylist {
            domain: "bar.com".to_string(),
            active: true
        }));
        assert!(mutations.contains(&Call::PatchDenylist {
            domain: "baz.com".to_string(),
            active: true
        }));
    }

    #[tokio::test]
    async fn test_add_to_denylist_normalizes_and_rejects_empty() {
        let (engine, fake) = engine_with_fixture();

        let added = engine.add_to_denylist(" Tracker.NET. ").await.unwrap();
        assert_eq!(added, "tracker.net");
        assert!(fake.mutations().contains(&Call::CreateDenylist {
            domain: "tracker.net".to_string(),
            active: true
        }));

        let err = engine.add_to_denylist("   ").await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_update_parental_controls_rejects_unknown_and_empty() {
        let (engine, fake) = engine_with_fixture();

        let err = engine
            .update_parental_controls(&ParentalUpdate::default())
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let mut update = ParentalUpdate::default();
        update.categories.insert("gaming".to_string(), true);
        let err = engine.update_parental_controls(&update).await.unwrap_err();
        match err {
            EngineError::Validation(message) => {
                assert!(message.contains("unknown category ids: gaming"))
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(fake.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_update_parental_controls_patches_only_provided() {
        let (engine, fake) = engine_with_fixture();

        let mut update = ParentalUpdate {
            safe_search: Some(true),
            ..Default::default()
        };
        update.categories.insert("ads".to_string(), true);
        engine.update_parental_controls(&update).await.unwrap();

        let mutations = fake.mutations();
        let Call::PatchParental(payload) = &mutations[0] else {
            panic!("expected a parental patch");
        };
        assert_eq!(
            payload,
            &serde_json::json!({
                "safeSearch": true,
                "categories": [{"id": "ads", "active": true}]
            })
        );
    }

    #[tokio::test]
    async fn test_toggle_filter_routes_by_kind() {
        let (engine, fake) = engine_with_fixture();

        engine
            .toggle_filter(FilterKind::Service, "tiktok", true)
            .await
            .unwrap();

        let mutations = fake.mutations();
        let Call::PatchParental(payload) = &mutations[0] else {
            panic!("expected a parental patch");
        };
        assert_eq!(
            payload["services"],
            serde_json::json!([{"id": "tiktok", "active": true}])
        );
    }

    #[tokio::test]
    async fn test_update_privacy_requires_object() {
        let (engine, fake) = engine_with_fixture();

        assert!(engine
            .update_privacy(&serde_json::json!([]))
            .await
            .unwrap_err()
            .is_validation());
        assert!(engine
            .update_privacy(&serde_json::json!({}))
            .await
            .unwrap_err()
            .is_validation());
        assert!(fake.mutations().is_empty());

        let privacy = engine
            .update_privacy(&serde_json::json!({"disguisedTrackers": false}))
            .await
            .unwrap();
        // Refreshed view comes from the (unchanged) fake profile
        assert_eq!(privacy["disguisedTrackers"], true);
        assert!(fake.mutations().iter().any(|c| matches!(c, Call::PatchPrivacy(_))));
    }

    #[tokio::test]
    async fn test_cached_getters_do_not_force_refresh() {
        let (engine, fake) = engine_with_fixture();

        engine.settings().await.unwrap();
        engine.parental_controls().await.unwrap();
        let denylist = engine.denylist().await.unwrap();
        assert_eq!(denylist.len(), 2);

        // One priming fetch serves all three reads
        assert_eq!(fake.fetches.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
