//! Report shapes and formatting
//!
//! The provider-independent half of the weather layer: unit systems,
//! weather-code labels, number formatting for spoken summaries, and
//! sunset timestamp parsing.

use chrono::NaiveDateTime;
use serde::Serialize;

/// Unit system for temperature and wind speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    Imperial,
    Metric,
}

impl Default for Units {
    fn default() -> Self {
        Units::Imperial
    }
}

impl Units {
    pub fn parse(value: &str) -> Option<Units> {
        match value.trim().to_lowercase().as_str() {
            "imperial" => Some(Units::Imperial),
            "metric" => Some(Units::Metric),
            _ => None,
        }
    }

    /// Provider query value for temperature.
    pub fn temperature_param(self) -> &'static str {
        match self {
            Units::Imperial => "fahrenheit",
            Units::Metric => "celsius",
        }
    }

    /// Provider query value for wind speed.
    pub fn wind_param(self) -> &'static str {
        match self {
            Units::Imperial => "mph",
            Units::Metric => "kmh",
        }
    }

    pub fn temp_symbol(self) -> &'static str {
        match self {
            Units::Imperial => "F",
            Units::Metric => "C",
        }
    }

    pub fn wind_symbol(self) -> &'static str {
        match self {
            Units::Imperial => "mph",
            Units::Metric => "km/h",
        }
    }
}

/// WMO weather code to a human condition label.
pub fn condition_label(code: Option<i64>) -> &'static str {
    match code {
        Some(0) => "Clear sky",
        Some(1) => "Mainly clear",
        Some(2) => "Partly cloudy",
        Some(3) => "Overcast",
        Some(45) => "Fog",
        Some(48) => "Depositing rime fog",
        Some(51) => "Light drizzle",
        Some(53) => "Moderate drizzle",
        Some(55) => "Dense drizzle",
        Some(56) => "Light freezing drizzle",
        Some(57) => "Dense freezing drizzle",
        Some(61) => "Slight rain",
        Some(63) => "Moderate rain",
        Some(65) => "Heavy rain",
        Some(66) => "Light freezing rain",
        Some(67) => "Heavy freezing rain",
        Some(71) => "Slight snow fall",
        Some(73) => "Moderate snow fall",
        Some(75) => "Heavy snow fall",
        Some(77) => "Snow grains",
        Some(80) => "Slight rain showers",
        Some(81) => "Moderate rain showers",
        Some(82) => "Violent rain showers",
        Some(85) => "Slight snow showers",
        Some(86) => "Heavy snow showers",
        Some(95) => "Thunderstorm",
        Some(96) => "Thunderstorm with slight hail",
        Some(99) => "Thunderstorm with heavy hail",
        _ => "Unknown conditions",
    }
}

/// One decimal place, no trailing `.0`, `unknown` for missing values.
pub fn format_number(value: Option<f64>) -> String {
    let Some(value) = value else {
        return "unknown".to_string();
    };
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        format!("{rounded:.1}")
    }
}

/// Current conditions plus today's range.
#[derive(Debug, Clone, Serialize)]
pub struct WeatherData {
    pub current_temperature: Option<f64>,
    pub feels_like_temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub condition: String,
    pub today_high: Option<f64>,
    pub today_low: Option<f64>,
    pub observation_time: Option<String>,
    pub temperature_unit: String,
    pub wind_speed_unit: String,
}

/// The full weather answer, summary included.
#[derive(Debug, Clone, Serialize)]
pub struct WeatherReport {
    pub requested_location: String,
    pub resolved_location: String,
    pub fallback_used: bool,
    pub units: Units,
    pub data: WeatherData,
    pub summary: String,
}

/// Today's sunset for a location.
#[derive(Debug, Clone, Serialize)]
pub struct SunsetReport {
    pub requested_location: String,
    pub resolved_location: String,
    pub fallback_used: bool,
    /// Local time at the location, no offset attached.
    pub sunset: NaiveDateTime,
}

/// Spoken one-liner built from the report pieces.
pub fn summary_line(resolved_location: &str, data: &WeatherData) -> String {
    format!(
        "In {}, it is {} {} and {} with {} {} wind. Today ranges from {} {} to {} {}.",
        resolved_location,
        format_number(data.current_temperature),
        data.temperature_unit,
        data.condition.to_lowercase(),
        format_number(data.wind_speed),
        data.wind_speed_unit,
        format_number(data.today_low),
        data.temperature_unit,
        format_number(data.today_high),
        data.temperature_unit,
    )
}

/// Provider sunset timestamps come minute-precise, sometimes with seconds.
pub fn parse_sunset(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}
