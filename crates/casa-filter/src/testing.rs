//! Hand-built test doubles shared by the cache and engine tests.

use crate::client::{PolicyClient, PolicyError};
use crate::profile::{FilterEntry, ParentalControl, ParentalPatch, Profile};
use async_trait::async_trait;
use casa_net::RestError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Every remote call the fake observed, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    FetchProfile,
    /// Serialized patch payload, for direct JSON assertions.
    PatchParental(serde_json::Value),
    PatchDenylist { domain: String, active: bool },
    CreateDenylist { domain: String, active: bool },
    DeleteDenylist { domain: String },
    PatchPrivacy(serde_json::Value),
}

/// Scriptable recording policy client.
///
/// Failure keys: "fetch", "patch_parental", "privacy", and per-domain
/// "patch:{domain}", "create:{domain}", "delete:{domain}".
#[derive(Default)]
pub struct FakePolicy {
    pub profile: Mutex<Profile>,
    pub calls: Mutex<Vec<Call>>,
    fail_on: Mutex<HashSet<String>>,
    pub fetches: AtomicU64,
    /// When set, fetches park on `fetch_release` after signalling
    /// `fetch_started`.
    pub gate_fetch: AtomicBool,
    pub fetch_started: Notify,
    pub fetch_release: Notify,
}

impl FakePolicy {
    pub fn with_profile(profile: Profile) -> Arc<Self> {
        let fake = Self::default();
        *fake.profile.lock().unwrap() = profile;
        Arc::new(fake)
    }

    pub fn fail(&self, key: &str) {
        self.fail_on.lock().unwrap().insert(key.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_on.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Calls that mutate remote state (everything but fetches).
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, Call::FetchProfile))
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, key: &str) -> Result<(), PolicyError> {
        if self.fail_on.lock().unwrap().contains(key) {
            return Err(scripted_failure(key));
        }
        Ok(())
    }
}

fn scripted_failure(key: &str) -> PolicyError {
    PolicyError::Request {
        path: format!("/fake/{key}"),
        source: RestError::Status {
            status: 500,
            detail: "scripted failure".to_string(),
        },
    }
}

#[async_trait]
impl PolicyClient for FakePolicy {
    async fn fetch_profile(&self) -> Result<Profile, PolicyError> {
        self.record(Call::FetchProfile);
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.gate_fetch.load(Ordering::SeqCst) {
            self.fetch_started.notify_one();
            self.fetch_release.notified().await;
        }
        self.check("fetch")?;
        Ok(self.profile.lock().unwrap().clone())
    }

    async fn patch_parental_control(&self, patch: &ParentalPatch) -> Result<(), PolicyError> {
        self.record(Call::PatchParental(serde_json::to_value(patch).unwrap()));
        self.check("patch_parental")
    }

    async fn patch_denylist_entry(&self, domain: &str, active: bool) -> Result<(), PolicyError> {
        self.record(Call::PatchDenylist {
            domain: domain.to_string(),
            active,
        });
        self.check(&format!("patch:{domain}"))
    }

    async fn create_denylist_entry(&self, domain: &str, active: bool) -> Result<(), PolicyError> {
        self.record(Call::CreateDenylist {
            domain: domain.to_string(),
            active,
        });
        self.check(&format!("create:{domain}"))
    }

    async fn delete_denylist_entry(&self, domain: &str) -> Result<(), PolicyError> {
        self.record(Call::DeleteDenylist {
            domain: domain.to_string(),
        });
        self.check(&format!("delete:{domain}"))
    }

    async fn patch_privacy(&self, updates: &serde_json::Value) -> Result<(), PolicyError> {
        self.record(Call::PatchPrivacy(updates.clone()));
        self.check("privacy")
    }
}

/// Profile with a little of everything: inactive and active categories, a
/// service, and pre-existing deny-list entries in both active states.
pub fn profile_fixture() -> Profile {
    Profile {
        id: Some("abc123".to_string()),
        name: Some("Home".to_string()),
        parental_control: ParentalControl {
            safe_search: false,
            youtube_restricted_mode: false,
            block_bypass: false,
            categories: vec![
                FilterEntry::new("ads", false),
                FilterEntry::new("social-networks", true),
            ],
            services: vec![FilterEntry::new("tiktok", false)],
        },
        denylist: vec![
            FilterEntry::new("bar.com", false),
            FilterEntry::new("baz.com", true),
        ],
        allowlist: Vec::new(),
        privacy: serde_json::json!({ "disguisedTrackers": true }),
        security: serde_json::Value::Null,
        performance: serde_json::Value::Null,
        settings: serde_json::Value::Null,
    }
}
