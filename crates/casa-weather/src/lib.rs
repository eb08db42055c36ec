//! casa Weather Layer
//!
//! Open-Meteo geocoding, current conditions, and sunset lookups. The
//! sunset time feeds the evening fade; the rest answers "what's it like
//! outside" with a spoken-ready summary.

pub mod client;
pub mod report;

pub use client::{WeatherClient, WeatherError};
pub use report::{
    condition_label, format_number, parse_sunset, SunsetReport, Units, WeatherData, WeatherReport,
};
