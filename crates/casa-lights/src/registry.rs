//! Device registry
//!
//! Holds the discovered fleet behind a TTL cache:
//! 1. `ensure_fresh` re-discovers only when the snapshot is stale, and a
//!    single-flight lock keeps concurrent callers from double-broadcasting
//! 2. Fleet commands iterate the snapshot; a device that fails is logged
//!    and skipped, never failing the whole operation
//! 3. Discovered addresses are persisted so the next start can probe them
//!    directly instead of waiting on a broadcast

use crate::device::{LightsError, SmartDevice};
use crate::discovery;
use crate::scenes::{self, Hsv};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

const HOSTS_FILE: &str = "devices.json";
const INVENTORY_FILE: &str = "devices_inventory.json";

/// Discovery and command tuning.
#[derive(Debug, Clone)]
pub struct LightsConfig {
    /// How long to collect broadcast replies.
    pub discovery_window: Duration,
    /// Per-command TCP deadline.
    pub command_timeout: Duration,
    /// How long a discovered fleet stays fresh.
    pub cache_ttl: Duration,
    /// Where the remembered host list and inventory snapshots live.
    pub data_dir: PathBuf,
}

impl Default for LightsConfig {
    fn default() -> Self {
        Self {
            discovery_window: Duration::from_secs(3),
            command_timeout: Duration::from_secs(6),
            cache_ttl: Duration::from_secs(300),
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// One device, as the HTTP layer reports it.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    pub host: String,
    pub alias: String,
    pub model: String,
    pub kind: String,
    pub on: bool,
}

#[derive(Default)]
struct Fleet {
    devices: HashMap<String, SmartDevice>,
    refreshed_at: Option<Instant>,
}

/// Whether a snapshot taken at `refreshed_at` has outlived `ttl`.
fn is_stale(refreshed_at: Option<Instant>, ttl: Duration, now: Instant) -> bool {
    match refreshed_at {
        Some(at) => now.saturating_duration_since(at) >= ttl,
        None => true,
    }
}

/// The fleet cache and every operation that touches more than one device.
pub struct DeviceRegistry {
    config: LightsConfig,
    fleet: RwLock<Fleet>,
    discovering: Mutex<()>,
}

impl DeviceRegistry {
    pub fn new(config: LightsConfig) -> Self {
        Self {
            config,
            fleet: RwLock::new(Fleet::default()),
            discovering: Mutex::new(()),
        }
    }

    fn hosts_path(&self) -> PathBuf {
        self.config.data_dir.join(HOSTS_FILE)
    }

    fn inventory_path(&self) -> PathBuf {
        self.config.data_dir.join(INVENTORY_FILE)
    }

    async fn fresh(&self) -> bool {
        let fleet = self.fleet.read().await;
        !is_stale(fleet.refreshed_at, self.config.cache_ttl, Instant::now())
    }

    /// Re-discover the fleet if the snapshot is stale (or `force`).
    ///
    /// Concurrent callers queue on the discovery lock; whoever waited
    /// re-checks staleness and adopts the refresh that just finished.
    pub async fn ensure_fresh(&self, force: bool) {
        if !force && self.fresh().await {
            return;
        }
        let _guard = self.discovering.lock().await;
        if !force && self.fresh().await {
            return;
        }
        self.discover().await;
    }

    async fn discover(&self) {
        let saved = discovery::load_saved_hosts(&self.hosts_path()).await;

        // Broadcast and direct probes run together; the probes cover
        // devices on networks that swallow broadcast traffic.
        let (broadcast, probed) = tokio::join!(
            discovery::broadcast(self.config.discovery_window),
            discovery::probe_hosts(&saved, self.config.command_timeout),
        );

        let mut devices: HashMap<String, SmartDevice> = HashMap::new();
        match broadcast {
            Ok(found) => {
                for device in found {
                    devices.insert(device.host.clone(), device);
                }
            }
            Err(err) => warn!("broadcast discovery failed: {err}"),
        }
        for device in probed {
            devices.entry(device.host.clone()).or_insert(device);
        }

        info!("discovered {} smart device(s)", devices.len());

        let summaries = summarize_sorted(&devices);
        let mut hosts: Vec<String> = devices.keys().cloned().collect();
        hosts.sort();

        {
            let mut fleet = self.fleet.write().await;
            fleet.devices = devices;
            fleet.refreshed_at = Some(Instant::now());
        }

        // Remember what we found; losing this only costs the next start
        // a broadcast wait.
        if !hosts.is_empty() {
            if let Err(err) = discovery::save_hosts(&self.hosts_path(), &hosts).await {
                warn!("could not persist host list: {err}");
            }
            if let Err(err) = save_inventory(&self.inventory_path(), &summaries).await {
                warn!("could not persist inventory: {err}");
            }
        }
    }

    /// Sorted snapshot of the fleet, re-discovering first if stale.
    pub async fn inventory(&self, force: bool) -> Vec<DeviceSummary> {
        self.ensure_fresh(force).await;
        let fleet = self.fleet.read().await;
        summarize_sorted(&fleet.devices)
    }

    /// Live check: is any light currently on? Probes every device.
    pub async fn are_lights_on(&self) -> Result<bool, LightsError> {
        let refreshed = self.refresh_states().await;
        Ok(refreshed.iter().any(|device| device.is_on()))
    }

    /// Switch every device; returns how many answered.
    pub async fn set_power_all(&self, on: bool) -> Result<usize, LightsError> {
        self.ensure_fresh(false).await;
        let devices = self.snapshot().await;
        if devices.is_empty() {
            return Err(LightsError::NoDevices);
        }

        let mut reached = 0;
        for device in &devices {
            match device.set_power(on, self.config.command_timeout).await {
                Ok(()) => reached += 1,
                Err(err) => warn!("{} did not switch: {err}", device.info.alias),
            }
        }
        info!(
            "turned {} {}/{} device(s)",
            if on { "on" } else { "off" },
            reached,
            devices.len()
        );
        Ok(reached)
    }

    /// Color every bulb; plugs are skipped. Errors if there are no bulbs.
    pub async fn set_color_all(&self, color: Hsv) -> Result<usize, LightsError> {
        self.ensure_fresh(false).await;
        let bulbs: Vec<SmartDevice> = self
            .snapshot()
            .await
            .into_iter()
            .filter(|device| device.is_bulb())
            .collect();
        if bulbs.is_empty() {
            return Err(LightsError::NoDevices);
        }

        let mut reached = 0;
        for bulb in &bulbs {
            match bulb.set_color(color, self.config.command_timeout).await {
                Ok(()) => reached += 1,
                Err(err) => warn!("{} did not change color: {err}", bulb.info.alias),
            }
        }
        Ok(reached)
    }

    /// Color only the bulbs that are already on; a dark house is left
    /// dark. Returns how many bulbs were recolored.
    pub async fn set_color_on_active(&self, color: Hsv) -> Result<usize, LightsError> {
        let refreshed = self.refresh_states().await;
        let mut recolored = 0;
        for device in &refreshed {
            if !device.is_bulb() || !device.is_on() {
                continue;
            }
            match device.set_color(color, self.config.command_timeout).await {
                Ok(()) => recolored += 1,
                Err(err) => warn!("{} did not change color: {err}", device.info.alias),
            }
        }
        Ok(recolored)
    }

    /// Wake-up scene: soft warm white on every bulb.
    pub async fn morning_scene(&self) -> Result<usize, LightsError> {
        self.set_color_all(scenes::MORNING).await
    }

    /// Wind-down scene: deep amber on every bulb, but only if somebody
    /// left a light on. A dark house stays dark.
    pub async fn night_scene(&self) -> Result<usize, LightsError> {
        if !self.are_lights_on().await? {
            return Ok(0);
        }
        self.set_color_all(scenes::NIGHT).await
    }

    async fn snapshot(&self) -> Vec<SmartDevice> {
        let fleet = self.fleet.read().await;
        fleet.devices.values().cloned().collect()
    }

    /// Probe every device for current state and fold the answers back
    /// into the fleet. Unreachable devices keep their last-known state.
    async fn refresh_states(&self) -> Vec<SmartDevice> {
        self.ensure_fresh(false).await;
        let mut refreshed = Vec::new();
        for mut device in self.snapshot().await {
            match device.refresh(self.config.command_timeout).await {
                Ok(()) => refreshed.push(device),
                Err(err) => debug!("skipping {}: {err}", device.host),
            }
        }

        let mut fleet = self.fleet.write().await;
        for device in &refreshed {
            fleet.devices.insert(device.host.clone(), device.clone());
        }
        refreshed
    }
}

fn summarize_sorted(devices: &HashMap<String, SmartDevice>) -> Vec<DeviceSummary> {
    let mut summaries: Vec<DeviceSummary> = devices
        .values()
        .map(|device| DeviceSummary {
            host: device.host.clone(),
            alias: device.info.alias.clone(),
            model: device.info.model.clone(),
            kind: if device.is_bulb() { "bulb" } else { "plug" }.to_string(),
            on: device.is_on(),
        })
        .collect();
    summaries.sort_by(|a, b| a.host.cmp(&b.host));
    summaries
}

async fn save_inventory(path: &Path, summaries: &[DeviceSummary]) -> Result<(), LightsError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| LightsError::Persist(err.to_string()))?;
    }
    let body = serde_json::to_vec_pretty(summaries)
        .map_err(|err| LightsError::Persist(err.to_string()))?;
    tokio::fs::write(path, body)
        .await
        .map_err(|err| LightsError::Persist(err.to_string()))?;
    Ok(())
}
