//! Hub configuration
//!
//! One TOML file (path from `CASA_CONFIG`, else `./casa.toml`), every
//! field defaulted so an empty file is a valid start. The NextDNS key can
//! come from the environment instead; validation fails fast at startup
//! rather than on the first request.

use chrono::NaiveTime;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read {path}: {source}")]
    Unreadable {
        path: String,
        source: std::io::Error,
    },

    #[error("Could not parse {path}: {source}")]
    Invalid {
        path: String,
        source: toml::de::Error,
    },

    #[error("Invalid bind address {0:?}")]
    BadBindAddr(String),

    #[error("Invalid schedule time {0:?}, expected HH:MM")]
    BadTime(String),

    #[error("NextDNS API key is not set (nextdns_api_key in the config file or NEXTDNS_API_KEY)")]
    MissingApiKey,

    #[error("fade_steps must be at least 2")]
    BadFadeSteps,
}

/// When the standing jobs run, as local wall-clock times.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Morning scene, weekdays only.
    pub morning: String,
    /// Night scene, every day.
    pub night: String,
    /// Daily re-resolution of the sunset fade.
    pub sunset_refresh: String,
    pub fade_steps: usize,
    pub fade_duration_minutes: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            morning: "06:45".to_string(),
            night: "20:00".to_string(),
            sunset_refresh: "04:00".to_string(),
            fade_steps: 20,
            fade_duration_minutes: 60,
        }
    }
}

/// Top-level hub settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub nextdns_api_key: String,
    pub default_location: String,
    pub schedules: ScheduleConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            data_dir: PathBuf::from("./data"),
            nextdns_api_key: String::new(),
            default_location: "Nashville, TN".to_string(),
            schedules: ScheduleConfig::default(),
        }
    }
}

/// Parse an HH:MM wall-clock time.
pub fn parse_time(value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| ConfigError::BadTime(value.to_string()))
}

impl HubConfig {
    /// Load from disk and the environment, then validate.
    ///
    /// A missing `./casa.toml` just means defaults; a missing file named
    /// by `CASA_CONFIG` is an error, since someone asked for it.
    pub fn load() -> Result<HubConfig, ConfigError> {
        let explicit = std::env::var("CASA_CONFIG").ok();
        let path = explicit
            .clone()
            .unwrap_or_else(|| "./casa.toml".to_string());

        let mut config = if std::path::Path::new(&path).exists() || explicit.is_some() {
            let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Unreadable {
                path: path.clone(),
                source,
            })?;
            HubConfig::from_toml(&text, &path)?
        } else {
            HubConfig::default()
        };

        if let Ok(key) = std::env::var("NEXTDNS_API_KEY") {
            if !key.trim().is_empty() {
                config.nextdns_api_key = key.trim().to_string();
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn from_toml(text: &str, path: &str) -> Result<HubConfig, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Invalid {
            path: path.to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        parse_time(&self.schedules.morning)?;
        parse_time(&self.schedules.night)?;
        parse_time(&self.schedules.sunset_refresh)?;
        if self.nextdns_api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.schedules.fade_steps < 2 {
            return Err(ConfigError::BadFadeSteps);
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr
            .parse()
            .map_err(|_| ConfigError::BadBindAddr(self.bind_addr.clone()))
    }
}
