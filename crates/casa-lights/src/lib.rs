//! casa Lights Layer
//!
//! LAN control of TP-Link-style smart bulbs and plugs:
//! 1. `protocol` speaks the scrambled-JSON wire format (port 9999)
//! 2. `device` is one addressable bulb or plug
//! 3. `discovery` finds the fleet by broadcast and remembered addresses
//! 4. `registry` caches the fleet and runs whole-house operations
//! 5. `scenes` holds named colors, morning/night, and the sunset fade

pub mod device;
pub mod discovery;
pub mod protocol;
pub mod registry;
pub mod scenes;

pub use device::{LightsError, SmartDevice};
pub use protocol::{LightState, ProtocolError, SysInfo};
pub use registry::{DeviceRegistry, DeviceSummary, LightsConfig};
pub use scenes::{color_by_name, fade_schedule, Hsv, FADE_END, FADE_START, MORNING, NIGHT};
