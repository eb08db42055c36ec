//! Lights endpoints
//!
//! Scenes, whole-house power, named colors, and the device inventory.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use casa_lights::color_by_name;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::api::{envelope, ApiError, AppState};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColorRequest {
    pub color: String,
}

#[derive(Deserialize)]
pub struct DevicesQuery {
    #[serde(default)]
    pub force_refresh: bool,
}

/// POST /lights/scenes/morning - Soft warm white on every bulb
pub async fn morning_scene_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    state.lights.morning_scene().await?;
    Ok(envelope("lights_scene_morning", json!({})))
}

/// POST /lights/scenes/night - Amber wind-down, only if a light is on
pub async fn night_scene_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    state.lights.night_scene().await?;
    Ok(envelope("lights_scene_night", json!({})))
}

/// POST /lights/power/on - Switch everything on
pub async fn power_on_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    state.lights.set_power_all(true).await?;
    Ok(envelope("lights_power_on", json!({})))
}

/// POST /lights/power/off - Switch everything off
pub async fn power_off_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    state.lights.set_power_all(false).await?;
    Ok(envelope("lights_power_off", json!({})))
}

/// POST /lights/color - Named color on every bulb
pub async fn set_color_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ColorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let hsv = color_by_name(&payload.color)
        .ok_or_else(|| ApiError::BadRequest("Unsupported color value.".to_string()))?;
    state.lights.set_color_all(hsv).await?;
    Ok(envelope("lights_color", json!({ "color": payload.color })))
}

/// GET /lights/devices - Fleet inventory, optionally forcing re-discovery
pub async fn get_devices_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DevicesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let devices = state.lights.inventory(query.force_refresh).await;
    Ok(envelope(
        "lights_devices",
        json!({ "count": devices.len(), "data": devices }),
    ))
}
