//! Open-Meteo client
//!
//! Geocoding plus forecast over the shared REST client. Geocoding tries a
//! fallback chain of query spellings before giving up, and falls back to
//! the configured default location as a last resort.

use crate::report::{
    condition_label, parse_sunset, summary_line, SunsetReport, Units, WeatherData, WeatherReport,
};
use casa_net::{build_url, RestClient, RestError};
use hyper::HeaderMap;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

const GEOCODE_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Weather errors
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("Weather provider request failed at {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: RestError,
    },

    #[error("Unable to resolve location from weather provider")]
    NoMatch,

    #[error("Weather provider geocoding returned incomplete coordinates")]
    IncompleteCoordinates,

    #[error("Weather provider returned incomplete forecast data")]
    IncompleteForecast,

    #[error("Weather provider returned no sunset data")]
    NoSunset,

    #[error("Weather provider returned invalid sunset timestamp: {0}")]
    BadSunset(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GeocodeEnvelope {
    results: Vec<GeocodePlace>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GeocodePlace {
    name: Option<String>,
    admin1: Option<String>,
    country_code: Option<String>,
    country: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ForecastEnvelope {
    current: CurrentBlock,
    daily: DailyBlock,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CurrentBlock {
    time: Option<String>,
    temperature_2m: Option<f64>,
    apparent_temperature: Option<f64>,
    relative_humidity_2m: Option<f64>,
    wind_speed_10m: Option<f64>,
    weather_code: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DailyBlock {
    temperature_2m_max: Vec<Option<f64>>,
    temperature_2m_min: Vec<Option<f64>>,
    sunset: Vec<Option<String>>,
}

/// A geocoded place with coordinates and how we got there.
#[derive(Debug, Clone)]
struct ResolvedLocation {
    requested: String,
    resolved: String,
    latitude: f64,
    longitude: f64,
    fallback_used: bool,
}

/// Progressively looser spellings of a location query.
fn location_queries(location: &str) -> Vec<String> {
    let mut queries: Vec<String> = Vec::new();
    let mut add = |candidate: &str| {
        let value = candidate.split_whitespace().collect::<Vec<_>>().join(" ");
        if !value.is_empty() && !queries.contains(&value) {
            queries.push(value);
        }
    };

    add(location);
    add(&location.replace(',', " "));
    if let Some((city, _)) = location.split_once(',') {
        add(city);
    }
    queries
}

/// Open-Meteo weather and sunset lookups.
pub struct WeatherClient {
    rest: Arc<RestClient>,
    default_location: String,
}

impl WeatherClient {
    pub fn new(rest: Arc<RestClient>, default_location: impl Into<String>) -> Self {
        Self {
            rest,
            default_location: default_location.into(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, WeatherError> {
        let response = self
            .rest
            .get(url, &HeaderMap::new())
            .await
            .map_err(|source| WeatherError::Request {
                url: url.to_string(),
                source,
            })?;
        response.json().map_err(|source| WeatherError::Request {
            url: url.to_string(),
            source,
        })
    }

    async fn geocode(&self, query: &str) -> Result<Vec<GeocodePlace>, WeatherError> {
        let url = build_url(
            GEOCODE_URL,
            &[
                ("name", query.to_string()),
                ("count", "1".to_string()),
                ("language", "en".to_string()),
                ("format", "json".to_string()),
            ],
        )
        .map_err(|source| WeatherError::Request {
            url: GEOCODE_URL.to_string(),
            source,
        })?;

        let envelope: GeocodeEnvelope = self.get_json(&url).await?;
        Ok(envelope.results)
    }

    async fn first_match(&self, queries: &[String]) -> Result<Option<GeocodePlace>, WeatherError> {
        for query in queries {
            let mut results = self.geocode(query).await?;
            if !results.is_empty() {
                return Ok(Some(results.remove(0)));
            }
            debug!("no geocoding match for {query:?}");
        }
        Ok(None)
    }

    async fn resolve_location(&self, location: &str) -> Result<ResolvedLocation, WeatherError> {
        let requested = {
            let trimmed = location.trim();
            if trimmed.is_empty() {
                self.default_location.clone()
            } else {
                trimmed.to_string()
            }
        };

        let mut fallback_used = false;
        let mut place = self.first_match(&location_queries(&requested)).await?;
        if place.is_none() {
            fallback_used = true;
            info!(
                "{requested:?} did not geocode, falling back to {:?}",
                self.default_location
            );
            place = self
                .first_match(&location_queries(&self.default_location))
                .await?;
        }
        let place = place.ok_or(WeatherError::NoMatch)?;

        let (Some(latitude), Some(longitude)) = (place.latitude, place.longitude) else {
            return Err(WeatherError::IncompleteCoordinates);
        };

        let resolved = {
            let country = place.country_code.or(place.country);
            let parts: Vec<String> = [place.name, place.admin1, country]
                .into_iter()
                .flatten()
                .collect();
            if parts.is_empty() {
                self.default_location.clone()
            } else {
                parts.join(", ")
            }
        };

        Ok(ResolvedLocation {
            requested,
            resolved,
            latitude,
            longitude,
            fallback_used,
        })
    }

    /// Current conditions and today's range for a location.
    pub async fn current_weather(
        &self,
        location: &str,
        units: Units,
    ) -> Result<WeatherReport, WeatherError> {
        let place = self.resolve_location(location).await?;

        let url = build_url(
            FORECAST_URL,
            &[
                ("latitude", place.latitude.to_string()),
                ("longitude", place.longitude.to_string()),
                (
                    "current",
                    "temperature_2m,apparent_temperature,relative_humidity_2m,\
                     wind_speed_10m,weather_code"
                        .to_string(),
                ),
                ("daily", "temperature_2m_max,temperature_2m_min".to_string()),
                ("temperature_unit", units.temperature_param().to_string()),
                ("wind_speed_unit", units.wind_param().to_string()),
                ("timezone", "auto".to_string()),
                ("forecast_days", "1".to_string()),
            ],
        )
        .map_err(|source| WeatherError::Request {
            url: FORECAST_URL.to_string(),
            source,
        })?;

        let forecast: ForecastEnvelope = self.get_json(&url).await?;
        let current = forecast.current;
        let today_high = forecast.daily.temperature_2m_max.first().copied().flatten();
        let today_low = forecast.daily.temperature_2m_min.first().copied().flatten();

        if current.temperature_2m.is_none() && today_high.is_none() && today_low.is_none() {
            return Err(WeatherError::IncompleteForecast);
        }

        let data = WeatherData {
            current_temperature: current.temperature_2m,
            feels_like_temperature: current.apparent_temperature,
            humidity: current.relative_humidity_2m,
            wind_speed: current.wind_speed_10m,
            condition: condition_label(current.weather_code).to_string(),
            today_high,
            today_low,
            observation_time: current.time,
            temperature_unit: units.temp_symbol().to_string(),
            wind_speed_unit: units.wind_symbol().to_string(),
        };
        let summary = summary_line(&place.resolved, &data);

        Ok(WeatherReport {
            requested_location: place.requested,
            resolved_location: place.resolved,
            fallback_used: place.fallback_used,
            units,
            data,
            summary,
        })
    }

    /// Today's sunset time at a location, as local naive time.
    pub async fn sunset(&self, location: &str) -> Result<SunsetReport, WeatherError> {
        let place = self.resolve_location(location).await?;

        let url = build_url(
            FORECAST_URL,
            &[
                ("latitude", place.latitude.to_string()),
                ("longitude", place.longitude.to_string()),
                ("daily", "sunset".to_string()),
                ("timezone", "auto".to_string()),
                ("forecast_days", "1".to_string()),
            ],
        )
        .map_err(|source| WeatherError::Request {
            url: FORECAST_URL.to_string(),
            source,
        })?;

        let forecast: ForecastEnvelope = self.get_json(&url).await?;
        let raw = forecast
            .daily
            .sunset
            .into_iter()
            .next()
            .flatten()
            .filter(|value| !value.is_empty())
            .ok_or(WeatherError::NoSunset)?;

        let sunset = parse_sunset(&raw).ok_or_else(|| WeatherError::BadSunset(raw.clone()))?;

        Ok(SunsetReport {
            requested_location: place.requested,
            resolved_location: place.resolved,
            fallback_used: place.fallback_used,
            sunset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_queries_fallback_chain() {
        assert_eq!(
            location_queries("Nashville, TN"),
            ["Nashville, TN", "Nashville TN", "Nashville"]
        );
        assert_eq!(location_queries("Berlin"), ["Berlin"]);
        assert_eq!(
            location_queries("  New   York ,  NY "),
            ["New York , NY", "New York NY", "New York"]
        );
    }

    #[test]
    fn test_geocode_envelope_tolerates_gaps() {
        let envelope: GeocodeEnvelope = serde_json::from_str(
            r#"{"results": [{"name": "Nashville", "latitude": 36.16, "longitude": -86.78}]}"#,
        )
        .unwrap();
        assert_eq!(envelope.results.len(), 1);
        assert_eq!(envelope.results[0].admin1, None);

        let empty: GeocodeEnvelope = serde_json::from_str("{}").unwrap();
        assert!(empty.results.is_empty());
    }

    #[test]
    fn test_forecast_envelope_null_daily_values() {
        let envelope: ForecastEnvelope = serde_json::from_str(
            r#"{
                "current": {"temperature_2m": 72.4, "weather_code": 2},
                "daily": {"temperature_2m_max": [null], "temperature_2m_min": [58.6]}
            }"#,
        )
        .unwrap();

        assert_eq!(envelope.current.temperature_2m, Some(72.4));
        assert_eq!(envelope.daily.temperature_2m_max.first().copied().flatten(), None);
        assert_eq!(
            envelope.daily.temperature_2m_min.first().copied().flatten(),
            Some(58.6)
        );
    }
}
