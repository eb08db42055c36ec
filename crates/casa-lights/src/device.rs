//! One smart device
//!
//! TCP request/reply with the scrambled-JSON framing, every exchange
//! bounded by a command timeout. State is whatever the last `get_sysinfo`
//! reported.

use crate::protocol::{self, ProtocolError, SysInfo, DEVICE_PORT};
use crate::scenes::Hsv;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Lights errors
#[derive(Debug, Error)]
pub enum LightsError {
    #[error("Device I/O failed: {0}")]
    Io(String),

    #[error("Device did not answer within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("{alias} does not support color")]
    Unsupported { alias: String },

    #[error("No smart lights found")]
    NoDevices,

    #[error("Device state could not be persisted: {0}")]
    Persist(String),
}

impl From<std::io::Error> for LightsError {
    fn from(err: std::io::Error) -> Self {
        LightsError::Io(err.to_string())
    }
}

/// A device at one address, with its last observed state.
#[derive(Debug, Clone)]
pub struct SmartDevice {
    pub host: String,
    pub info: SysInfo,
}

impl SmartDevice {
    /// Query a host directly and build a device from its answer.
    pub async fn probe(host: &str, timeout: Duration) -> Result<SmartDevice, LightsError> {
        let reply = exchange(host, &protocol::sysinfo_query(), timeout).await?;
        let info = protocol::parse_sysinfo(&reply)?;
        debug!("probed {} ({} at {})", info.alias, info.model, host);
        Ok(SmartDevice {
            host: host.to_string(),
            info,
        })
    }

    /// Re-read state from the device.
    pub async fn refresh(&mut self, timeout: Duration) -> Result<(), LightsError> {
        let reply = exchange(&self.host, &protocol::sysinfo_query(), timeout).await?;
        self.info = protocol::parse_sysinfo(&reply)?;
        Ok(())
    }

    pub fn is_bulb(&self) -> bool {
        self.info.is_bulb()
    }

    pub fn is_on(&self) -> bool {
        self.info.is_on()
    }

    /// Power the device on or off, bulb or plug alike.
    pub async fn set_power(&self, on: bool, timeout: Duration) -> Result<(), LightsError> {
        let command = if self.is_bulb() {
            protocol::bulb_power_command(on)
        } else {
            protocol::relay_command(on)
        };
        let reply = exchange(&self.host, &command, timeout).await?;
        protocol::check_reply(&reply)?;
        Ok(())
    }

    /// Set hue/saturation/brightness. Turns the bulb on; plugs can't.
    pub async fn set_color(&self, color: Hsv, timeout: Duration) -> Result<(), LightsError> {
        if !self.is_bulb() {
            return Err(LightsError::Unsupported {
                alias: self.info.alias.clone(),
            });
        }
        let command = protocol::bulb_color_command(color.hue, color.saturation, color.value);
        let reply = exchange(&self.host, &command, timeout).await?;
        protocol::check_reply(&reply)?;
        Ok(())
    }
}

/// One framed TCP exchange with a device.
async fn exchange(host: &str, command: &str, timeout: Duration) -> Result<Vec<u8>, LightsError> {
    tokio::time::timeout(timeout, async {
        let addr = format!("{}:{}", host, DEVICE_PORT);
        let mut stream = TcpStream::connect(&addr).await?;

        stream.write_all(&protocol::encode_tcp(command)).await?;

        let mut header = [0u8; 4];
        stream.read_exact(&mut header).await?;
        let len = protocol::frame_len(header)?;

        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await?;
        Ok(protocol::unscramble(&body))
    })
    .await
    .map_err(|_| LightsError::Timeout(timeout))?
}
