//! Profile cache with single-flight refresh
//!
//! One snapshot of the remote profile shared by every reader. The lock is
//! held across the fetch, so refreshes are serialized; a caller that queued
//! behind an in-flight refresh adopts its result instead of fetching again.

use crate::client::{PolicyClient, PolicyError};
use crate::profile::Profile;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::debug;

struct Snapshot {
    profile: Profile,
    fetched_at: Instant,
}

/// Cached view of the remote profile.
pub struct ProfileCache {
    client: Arc<dyn PolicyClient>,
    slot: Mutex<Option<Snapshot>>,
    /// Bumped on every successful refresh; lets waiters detect one that
    /// completed while they were queued.
    generation: AtomicU64,
}

impl ProfileCache {
    pub fn new(client: Arc<dyn PolicyClient>) -> Self {
        Self {
            client,
            slot: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Cached profile, fetched on first use or when `force_refresh` is set.
    ///
    /// A failed fetch keeps the previous snapshot and surfaces the error;
    /// there is no retry here.
    pub async fn get(&self, force_refresh: bool) -> Result<Profile, PolicyError> {
        let seen = self.generation.load(Ordering::Acquire);
        let mut slot = self.slot.lock().await;

        if let Some(snapshot) = slot.as_ref() {
            let refreshed_while_waiting = self.generation.load(Ordering::Acquire) != seen;
            if !force_refresh || refreshed_while_waiting {
                return Ok(snapshot.profile.clone());
            }
        }

        let previous_age = slot.as_ref().map(|s| s.fetched_at.elapsed());
        let profile = self.client.fetch_profile().await?;
        *slot = Some(Snapshot {
            profile: profile.clone(),
            fetched_at: Instant::now(),
        });
        self.generation.fetch_add(1, Ordering::Release);

        match previous_age {
            Some(age) => debug!("profile cache refreshed (previous snapshot {:?} old)", age),
            None => debug!("profile cache primed"),
        }
        Ok(profile)
    }

    /// Force a refresh.
    pub async fn refresh(&self) -> Result<Profile, PolicyError> {
        self.get(true).await
    }
}
