//! HTTP surface
//!
//! Shared state, the error-to-status mapping, and the router. Every
//! mutation answers with a `{"action", "status": "ok", ...}` envelope;
//! every failure answers `{"detail": ...}` with 400 for bad input, 404
//! for unknown sessions, and 502 when a remote let us down.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use casa_filter::EngineError;
use casa_lights::LightsError;
use casa_weather::WeatherError;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::HubConfig;
use crate::{filters_api, lights_api, weather_api};

/// Application state shared across handlers
pub struct AppState {
    pub config: HubConfig,
    pub engine: Arc<casa_filter::OverrideEngine>,
    pub lights: Arc<casa_lights::DeviceRegistry>,
    pub weather: Arc<casa_weather::WeatherClient>,
}

/// An error already mapped to a status code.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Upstream(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            ApiError::Upstream(detail) => (StatusCode::BAD_GATEWAY, detail),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        if err.is_validation() {
            ApiError::BadRequest(err.to_string())
        } else {
            ApiError::Upstream(err.to_string())
        }
    }
}

impl From<WeatherError> for ApiError {
    fn from(err: WeatherError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

impl From<LightsError> for ApiError {
    fn from(err: LightsError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

/// Action envelope wrapped around every successful answer.
#[derive(Serialize)]
pub struct Envelope<T: Serialize> {
    pub action: &'static str,
    pub status: &'static str,
    #[serde(flatten)]
    pub body: T,
}

pub fn envelope<T: Serialize>(action: &'static str, body: T) -> Json<Envelope<T>> {
    Json(Envelope {
        action,
        status: "ok",
        body,
    })
}

/// GET / - Service banner
async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({ "message": "casa hub is running!" }))
}

/// GET /health - Health check
async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Build the full route table.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/weather", get(weather_api::get_weather_handler))
        .route("/lights/scenes/morning", post(lights_api::morning_scene_handler))
        .route("/lights/scenes/night", post(lights_api::night_scene_handler))
        .route("/lights/power/on", post(lights_api::power_on_handler))
        .route("/lights/power/off", post(lights_api::power_off_handler))
        .route("/lights/color", post(lights_api::set_color_handler))
        .route("/lights/devices", get(lights_api::get_devices_handler))
        .route("/filters/lockdown", post(filters_api::toggle_lockdown_handler))
        .route(
            "/filters/denylist",
            get(filters_api::get_denylist_handler).post(filters_api::add_to_denylist_handler),
        )
        .route("/filters/settings", get(filters_api::get_settings_handler))
        .route(
            "/filters/parental-controls",
            get(filters_api::get_parental_controls_handler)
                .patch(filters_api::update_parental_controls_handler),
        )
        .route(
            "/filters/parental-controls/:kind/:id",
            patch(filters_api::toggle_parental_filter_handler),
        )
        .route("/filters/privacy", patch(filters_api::update_privacy_handler))
        .route("/filters/overrides", post(filters_api::create_override_handler))
        .route(
            "/filters/overrides/failed",
            get(filters_api::get_failed_overrides_handler),
        )
        .route(
            "/filters/overrides/:id",
            delete(filters_api::cancel_override_handler),
        )
        .route("/filters/state", get(filters_api::get_filters_state_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let body = serde_json::to_value(&Envelope {
            action: "weather",
            status: "ok",
            body: json!({ "summary": "clear" }),
        })
        .unwrap();

        assert_eq!(
            body,
            json!({ "action": "weather", "status": "ok", "summary": "clear" })
        );
    }

    #[test]
    fn test_error_mapping() {
        let err = ApiError::from(EngineError::Validation("bad duration".to_string()));
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err = ApiError::from(LightsError::NoDevices);
        assert!(matches!(err, ApiError::Upstream(_)));
    }
}
