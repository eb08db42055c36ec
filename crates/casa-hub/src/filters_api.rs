//! Filter endpoints
//!
//! Override sessions plus the direct profile controls. Request bodies
//! reject unknown fields; camelCase aliases are accepted where the
//! upstream API spells things that way.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use casa_filter::{FilterKind, OverrideRequest, ParentalUpdate};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::api::{envelope, ApiError, AppState};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockdownToggleRequest {
    pub active: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DenylistAddRequest {
    pub domain: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterToggleRequest {
    pub active: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrivacyUpdateRequest {
    pub updates: serde_json::Value,
}

/// POST /filters/lockdown - Flip the whole profile into or out of lockdown
pub async fn toggle_lockdown_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LockdownToggleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.engine.set_lockdown(payload.active).await?;
    Ok(envelope(
        "toggle_lockdown",
        json!({ "active": payload.active }),
    ))
}

/// POST /filters/denylist - Permanently deny one domain
pub async fn add_to_denylist_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DenylistAddRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.engine.add_to_denylist(&payload.domain).await?;
    Ok(envelope(
        "add_to_denylist",
        json!({ "domain": payload.domain }),
    ))
}

/// GET /filters/denylist - Current deny list
pub async fn get_denylist_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let denylist = state.engine.denylist().await?;
    Ok(envelope("get_denylist", json!({ "data": denylist })))
}

/// GET /filters/settings - Profile settings blocks
pub async fn get_settings_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let settings = state.engine.settings().await?;
    Ok(envelope("get_settings", json!({ "data": settings })))
}

/// GET /filters/parental-controls - Parental-control block
pub async fn get_parental_controls_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let parental_controls = state.engine.parental_controls().await?;
    Ok(envelope(
        "get_parental_controls",
        json!({ "data": parental_controls }),
    ))
}

/// PATCH /filters/parental-controls - Update flags and per-id toggles
pub async fn update_parental_controls_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ParentalUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let parental_controls = state.engine.update_parental_controls(&payload).await?;
    Ok(envelope(
        "update_parental_controls",
        json!({ "data": parental_controls }),
    ))
}

/// PATCH /filters/parental-controls/:kind/:id - Toggle one category or service
pub async fn toggle_parental_filter_handler(
    State(state): State<Arc<AppState>>,
    Path((kind_raw, id)): Path<(String, String)>,
    Json(payload): Json<FilterToggleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = FilterKind::parse(&kind_raw)
        .ok_or_else(|| ApiError::BadRequest("kind must be category or service".to_string()))?;
    let parental_controls = state.engine.toggle_filter(kind, &id, payload.active).await?;
    Ok(envelope(
        "toggle_parental_filter",
        json!({
            "entry_type": kind_raw,
            "entry_id": id,
            "active": payload.active,
            "data": parental_controls,
        }),
    ))
}

/// PATCH /filters/privacy - Patch the privacy block
pub async fn update_privacy_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PrivacyUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let privacy = state.engine.update_privacy(&payload.updates).await?;
    Ok(envelope("update_privacy", json!({ "data": privacy })))
}

/// POST /filters/overrides - Create a temporary override session
pub async fn create_override_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OverrideRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.engine.create_session(payload).await?;
    Ok(envelope("create_override", json!({ "data": session })))
}

/// DELETE /filters/overrides/:id - Roll back now, or clear a failed record
pub async fn cancel_override_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if state.engine.rollback_session(&id).await? {
        return Ok(envelope(
            "cancel_override",
            json!({ "session_id": id, "result": "rolled_back" }),
        ));
    }
    if state.engine.clear_failed(&id).await {
        return Ok(envelope(
            "cancel_override",
            json!({ "session_id": id, "result": "cleared" }),
        ));
    }
    Err(ApiError::NotFound(format!("No override session {id}")))
}

/// GET /filters/overrides/failed - Sessions whose rollback did not finish
pub async fn get_failed_overrides_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let failed = state.engine.failed_sessions().await;
    Ok(envelope(
        "get_failed_overrides",
        json!({ "count": failed.len(), "data": failed }),
    ))
}

/// GET /filters/state - Profile blocks plus active sessions
pub async fn get_filters_state_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let filters_state = state.engine.filters_state().await?;
    Ok(envelope("get_filters_state", json!({ "data": filters_state })))
}
