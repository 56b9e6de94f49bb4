use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use fleet_domain::{AlertId, DeviceId};
use fleet_store::Filter;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

// ── Health ───────────────────────────────────────────────────────────

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn ready(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.manager.check_connection().await?;
    Ok(StatusCode::OK)
}

pub async fn status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let (kind, _url) = state.manager.info().await?;
    let stats = state.manager.statistics().await;
    Ok(Json(json!({
        "database_kind": kind.to_string(),
        "checkouts": stats.checkout_count,
        "checkout_failures": stats.checkout_failures,
    })))
}

// ── Devices ──────────────────────────────────────────────────────────

pub async fn list_devices(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let devices = state.devices.list(&Filter::new()).await?;
    Ok(Json(json!(devices)))
}

pub async fn get_device(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Value>, ApiError> {
    let device = state.devices.get_required(&DeviceId(id)).await?;
    Ok(Json(json!(device)))
}

// ── Alerts ───────────────────────────────────────────────────────────

pub async fn list_alerts(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let alerts = state.alerts.list_open().await?;
    Ok(Json(json!(alerts)))
}

pub async fn get_alert(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Value>, ApiError> {
    let alert = state
        .alerts
        .get(&AlertId(id))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("alert '{id}' not found")))?;
    Ok(Json(json!(alert)))
}

// ── Audit ────────────────────────────────────────────────────────────

pub async fn list_audit(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let logs = state.audit_logs.list_recent(100).await?;
    Ok(Json(json!(logs)))
}
