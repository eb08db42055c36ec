//! Weather endpoint

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use casa_weather::Units;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::{envelope, ApiError, AppState};

#[derive(Deserialize)]
pub struct WeatherQuery {
    pub location: Option<String>,
    pub units: Option<String>,
}

/// GET /weather - Current conditions and today's range
pub async fn get_weather_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WeatherQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let location = query
        .location
        .unwrap_or_else(|| state.config.default_location.clone());
    let units = match query.units.as_deref() {
        Some(raw) => Units::parse(raw)
            .ok_or_else(|| ApiError::BadRequest("Unsupported unit system.".to_string()))?,
        None => Units::default(),
    };

    let report = state.weather.current_weather(&location, units).await?;
    Ok(envelope("weather", report))
}
