//! Device discovery
//!
//! Two ways to find the fleet:
//! 1. UDP broadcast of a scrambled `get_sysinfo`, collecting replies for
//!    the discovery window
//! 2. Direct TCP probes of remembered addresses, in parallel
//!
//! Successful discoveries are remembered in a JSON host list so a cold
//! start can skip the broadcast wait.

use crate::device::{LightsError, SmartDevice};
use crate::protocol::{self, DEVICE_PORT};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Broadcast a discovery query and collect every device reply in `window`.
pub async fn broadcast(window: Duration) -> Result<Vec<SmartDevice>, LightsError> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
    socket.set_broadcast(true)?;
    socket
        .send_to(&protocol::discovery_payload(), ("255.255.255.255", DEVICE_PORT))
        .await?;

    let mut found: HashMap<String, SmartDevice> = HashMap::new();
    let mut buf = vec![0u8; 4096];
    let deadline = Instant::now() + window;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        let (len, addr) = match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(Ok(received)) => received,
            Ok(Err(err)) => {
                warn!("discovery receive failed: {err}");
                break;
            }
            // Window closed
            Err(_) => break,
        };

        let plain = protocol::unscramble(&buf[..len]);
        match protocol::parse_sysinfo(&plain) {
            Ok(info) => {
                let host = addr.ip().to_string();
                debug!("discovered {} ({}) at {}", info.alias, info.model, host);
                found.insert(host.clone(), SmartDevice { host, info });
            }
            Err(err) => debug!("ignoring reply from {addr}: {err}"),
        }
    }

    Ok(found.into_values().collect())
}

/// Probe remembered hosts concurrently; unreachable ones are dropped.
pub async fn probe_hosts(hosts: &[String], timeout: Duration) -> Vec<SmartDevice> {
    let mut probes = JoinSet::new();
    for host in hosts {
        let host = host.clone();
        probes.spawn(async move {
            let outcome = SmartDevice::probe(&host, timeout).await;
            (host, outcome)
        });
    }

    let mut devices = Vec::new();
    while let Some(joined) = probes.join_next().await {
        match joined {
            Ok((_, Ok(device))) => devices.push(device),
            Ok((host, Err(err))) => debug!("no device at {host}: {err}"),
            Err(err) => warn!("probe task failed: {err}"),
        }
    }
    devices
}

/// Read the remembered host list. Missing or unreadable files mean an
/// empty list, not an error.
pub async fn load_saved_hosts(path: &Path) -> Vec<String> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(_) => return Vec::new(),
    };
    match serde_json::from_slice(&bytes) {
        Ok(hosts) => hosts,
        Err(err) => {
            warn!("ignoring corrupt host list at {}: {err}", path.display());
            Vec::new()
        }
    }
}

/// Persist the host list, creating the parent directory if needed.
pub async fn save_hosts(path: &Path, hosts: &[String]) -> Result<(), LightsError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| LightsError::Persist(err.to_string()))?;
    }
    let body =
        serde_json::to_vec_pretty(hosts).map_err(|err| LightsError::Persist(err.to_string()))?;
    tokio::fs::write(path, body)
        .await
        .map_err(|err| LightsError::Persist(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_file(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("casa-lights-{nanos}-{name}"))
    }

    #[tokio::test]
    async fn test_host_list_round_trip() {
        let path = scratch_file("hosts/devices.json");
        let hosts = vec!["192.168.1.40".to_string(), "192.168.1.41".to_string()];

        save_hosts(&path, &hosts).await.unwrap();
        assert_eq!(load_saved_hosts(&path).await, hosts);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_host_list_is_empty() {
        let path = scratch_file("never-written.json");
        assert!(load_saved_hosts(&path).await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_host_list_is_empty() {
        let path = scratch_file("corrupt.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        assert!(load_saved_hosts(&path).await.is_empty());
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_probe_hosts_empty_list() {
        assert!(probe_hosts(&[], Duration::from_millis(10)).await.is_empty());
    }
}
