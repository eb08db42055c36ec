//! Smart-plug wire protocol
//!
//! TP-Link-style devices speak scrambled JSON on port 9999: an autokey XOR
//! cipher (initial key 171), length-prefixed over TCP, bare datagrams over
//! UDP discovery. No authentication, LAN only.

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// TCP command and UDP discovery port.
pub const DEVICE_PORT: u16 = 9999;

/// Autokey cipher seed.
const CIPHER_KEY: u8 = 171;

/// Largest frame a device is allowed to claim.
pub const MAX_FRAME: usize = 1 << 20;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed device payload: {0}")]
    Malformed(String),

    #[error("Device reported error code {0}")]
    ErrCode(i64),

    #[error("Frame of {0} bytes exceeds limit")]
    Oversize(usize),
}

/// Scramble plaintext for the wire.
pub fn scramble(plain: &[u8]) -> Vec<u8> {
    let mut key = CIPHER_KEY;
    plain
        .iter()
        .map(|&byte| {
            let out = byte ^ key;
            key = out;
            out
        })
        .collect()
}

/// Unscramble wire bytes back to plaintext.
pub fn unscramble(cipher: &[u8]) -> Vec<u8> {
    let mut key = CIPHER_KEY;
    cipher
        .iter()
        .map(|&byte| {
            let out = byte ^ key;
            key = byte;
            out
        })
        .collect()
}

/// Frame a command for TCP: 4-byte big-endian length, then scrambled body.
pub fn encode_tcp(command: &str) -> Vec<u8> {
    let body = scramble(command.as_bytes());
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    frame
}

/// Claimed body length from a TCP frame header.
pub fn frame_len(header: [u8; 4]) -> Result<usize, ProtocolError> {
    let len = u32::from_be_bytes(header) as usize;
    if len == 0 || len > MAX_FRAME {
        return Err(ProtocolError::Oversize(len));
    }
    Ok(len)
}

/// The state-request every device answers.
pub fn sysinfo_query() -> String {
    json!({"system": {"get_sysinfo": {}}}).to_string()
}

/// Scrambled sysinfo query for UDP broadcast (no length prefix).
pub fn discovery_payload() -> Vec<u8> {
    scramble(sysinfo_query().as_bytes())
}

/// Relay command for plugs and switches.
pub fn relay_command(on: bool) -> String {
    json!({"system": {"set_relay_state": {"state": if on { 1 } else { 0 }}}}).to_string()
}

/// Bulb power command.
pub fn bulb_power_command(on: bool) -> String {
    json!({
        "smartlife.iot.smartbulb.lightingservice": {
            "transition_light_state": {
                "ignore_default": 1,
                "transition_period": 0,
                "on_off": if on { 1 } else { 0 }
            }
        }
    })
    .to_string()
}

/// Bulb color command; also turns the bulb on.
pub fn bulb_color_command(hue: u16, saturation: u8, brightness: u8) -> String {
    json!({
        "smartlife.iot.smartbulb.lightingservice": {
            "transition_light_state": {
                "ignore_default": 1,
                "transition_period": 0,
                "on_off": 1,
                "hue": hue,
                "saturation": saturation,
                "brightness": brightness,
                "color_temp": 0
            }
        }
    })
    .to_string()
}

/// Light block of a bulb's sysinfo.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LightState {
    pub on_off: u8,
    pub hue: u16,
    pub saturation: u8,
    pub brightness: u8,
    pub color_temp: u16,
}

/// Device identity and state, as reported by `get_sysinfo`.
///
/// Bulbs report `mic_type` and `light_state`; plugs report `type` and
/// `relay_state`. Everything is optional-with-default because models
/// disagree about which fields exist.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SysInfo {
    pub alias: String,
    pub model: String,
    pub mac: String,
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(rename = "mic_type", alias = "type")]
    pub device_type: String,
    pub sw_ver: String,
    pub relay_state: Option<u8>,
    pub light_state: Option<LightState>,
    pub is_dimmable: Option<u8>,
    pub is_color: Option<u8>,
}

impl SysInfo {
    pub fn is_bulb(&self) -> bool {
        self.device_type.contains("SMARTBULB")
    }

    pub fn is_on(&self) -> bool {
        if self.is_bulb() {
            self.light_state.map(|s| s.on_off == 1).unwrap_or(false)
        } else {
            self.relay_state == Some(1)
        }
    }
}

/// Parse a `get_sysinfo` reply.
pub fn parse_sysinfo(payload: &[u8]) -> Result<SysInfo, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    let info = value
        .get("system")
        .and_then(|s| s.get("get_sysinfo"))
        .ok_or_else(|| ProtocolError::Malformed("missing system.get_sysinfo".to_string()))?;

    let err_code = info.get("err_code").and_then(|v| v.as_i64()).unwrap_or(0);
    if err_code != 0 {
        return Err(ProtocolError::ErrCode(err_code));
    }

    serde_json::from_value(info.clone()).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Confirm a command reply did not carry an error code.
pub fn check_reply(payload: &[u8]) -> Result<(), ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    // Replies nest {module: {command: {"err_code": n}}}
    if let Some(modules) = value.as_object() {
        for commands in modules.values() {
            if let Some(commands) = commands.as_object() {
                for reply in commands.values() {
                    if let Some(code) = reply.get("err_code").and_then(|v| v.as_i64()) {
                        if code != 0 {
                            return Err(ProtocolError::ErrCode(code));
                        }
                    }
                }
            }
        }
    }
    Ok(())
}
