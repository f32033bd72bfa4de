//! ==============================================================================
//! api.rs - relay HTTP surface
//! ==============================================================================
//!
//! purpose:
//!     maps the registry operations onto the routes the devices and the
//!     dashboard already speak:
//!
//!     GET    /                health + active device count
//!     GET    /start/{id}      dashboard signals the device to collect
//!     POST   /data/{id}       device uploads a measurement
//!     GET    /latest/{id}     device polls for instructions / dashboard
//!                             polls for data
//!     GET    /devices         list all sessions and their status
//!     DELETE /device/{id}     clear one session
//!     DELETE /devices/clear   clear everything
//!     GET    /debug/{id}      full session snapshot for diagnostics
//!
//! relationships:
//!     - used by: main.rs (serves the router), tests/api.rs (drives it
//!       in-process with tower::ServiceExt)
//!     - uses: registry.rs (all state), domain.rs (payload types)
//!
//! ==============================================================================

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::domain::EcgPayload;
use crate::registry::{DeviceRegistry, PollOutcome, now_ms};

/// Build the relay router. CORS is permissive so a browser dashboard on
/// another origin can poll the relay directly.
pub fn router(registry: DeviceRegistry) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/start/:esp_id", get(start_measurement))
        .route("/data/:esp_id", post(receive_data))
        .route("/latest/:esp_id", get(latest))
        .route("/devices", get(list_devices))
        .route("/device/:esp_id", delete(clear_device))
        .route("/devices/clear", delete(clear_all_devices))
        .route("/debug/:esp_id", get(debug_device))
        .layer(CorsLayer::permissive())
        .with_state(registry)
}

/// health check endpoint
async fn health(State(registry): State<DeviceRegistry>) -> Json<Value> {
    Json(json!({
        "status": "online",
        "message": "IoT ECG Relay",
        "active_devices": registry.count().await,
        "timestamp_ms": now_ms(),
    }))
}

#[derive(Deserialize)]
struct StartParams {
    /// advisory device address, logged but not acted on
    esp_ip: Option<String>,
}

/// dashboard signals the device to start collecting; the device picks the
/// signal up on its next poll
async fn start_measurement(
    State(registry): State<DeviceRegistry>,
    Path(esp_id): Path<String>,
    Query(params): Query<StartParams>,
) -> Json<Value> {
    registry.start(&esp_id).await;
    if let Some(ip) = params.esp_ip {
        debug!(%esp_id, esp_ip = %ip, "start signal carried a device address");
    }
    info!(%esp_id, "start signal issued");

    Json(json!({
        "status": "collecting",
        "esp_id": esp_id,
        "message": format!("Measurement started for {esp_id}"),
    }))
}

/// device posts its measurement after collecting
async fn receive_data(
    State(registry): State<DeviceRegistry>,
    Path(esp_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    match registry.upload(&esp_id, &body).await {
        Ok(payload) => {
            info!(
                %esp_id,
                hr = payload.hr,
                spo2 = payload.spo2,
                samples = payload.ecg.len(),
                "measurement stored"
            );
            Json(json!({
                "status": "ok",
                "message": "Data received successfully",
                "esp_id": esp_id,
            }))
            .into_response()
        }
        Err(e) => {
            warn!(%esp_id, error = %e, "upload rejected");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "status": "error",
                    "message": format!("Invalid data format: {e}"),
                })),
            )
                .into_response()
        }
    }
}

/// ready response: the stored payload with a status tag injected beside it
#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    #[serde(flatten)]
    payload: EcgPayload,
}

/// polled by both sides: the device to learn whether it should collect,
/// the dashboard to fetch the latest ready measurement
async fn latest(
    State(registry): State<DeviceRegistry>,
    Path(esp_id): Path<String>,
) -> Response {
    match registry.poll(&esp_id).await {
        PollOutcome::Initialized => {
            debug!(%esp_id, "unknown device initialized");
            status_message("idle", "Device initialized, waiting for start signal")
        }
        PollOutcome::Idle => status_message("idle", "Waiting for start signal..."),
        PollOutcome::Collecting => status_message("collecting", "Start data collection now"),
        PollOutcome::Stale => {
            status_message("stale", "Data is too old, please start new measurement")
        }
        PollOutcome::Ready(payload) => Json(ReadyResponse {
            status: "ready",
            payload,
        })
        .into_response(),
    }
}

/// list all sessions and their logical status
async fn list_devices(State(registry): State<DeviceRegistry>) -> Json<Value> {
    let devices = registry.list().await;
    Json(json!({
        "total_devices": devices.len(),
        "devices": devices,
    }))
}

/// clear one session; succeeds either way and reports which case applied
async fn clear_device(
    State(registry): State<DeviceRegistry>,
    Path(esp_id): Path<String>,
) -> Json<Value> {
    let removed = registry.clear(&esp_id).await;
    if removed {
        info!(%esp_id, "session cleared");
    }
    Json(json!({
        "status": if removed { "cleared" } else { "not_found" },
        "esp_id": esp_id,
    }))
}

/// clear every session, reporting how many existed
async fn clear_all_devices(State(registry): State<DeviceRegistry>) -> Json<Value> {
    let count = registry.clear_all().await;
    info!(count, "all sessions cleared");
    Json(json!({"status": "cleared", "count": count}))
}

/// full diagnostic snapshot of one session
async fn debug_device(
    State(registry): State<DeviceRegistry>,
    Path(esp_id): Path<String>,
) -> Response {
    match registry.debug_snapshot(&esp_id).await {
        Some(snapshot) => Json(snapshot).into_response(),
        None => Json(json!({"error": "Device not found"})).into_response(),
    }
}

fn status_message(status: &str, message: &str) -> Response {
    Json(json!({"status": status, "message": message})).into_response()
}
