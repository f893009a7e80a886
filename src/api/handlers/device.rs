//! Controller diagnostics: current handle state and visible serial ports.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::app_state::AppState;
use crate::device::{DeviceSnapshot, PortInfo};
use crate::error::{BridgeError, ErrorResponse};

/// `GET /device` — Current controller handle state.
#[utoipa::path(
    get,
    path = "/device",
    tag = "Device",
    summary = "Controller state",
    description = "Reports whether the controller handle is absent, open or faulted, and which port it is on.",
    responses(
        (status = 200, description = "Handle state", body = DeviceSnapshot),
    )
)]
pub async fn device_handler(State(state): State<AppState>) -> Json<DeviceSnapshot> {
    Json(state.device.snapshot())
}

/// `GET /device/ports` — Enumerate serial ports.
///
/// # Errors
///
/// Returns [`BridgeError::Locate`] if the OS refuses enumeration.
#[utoipa::path(
    get,
    path = "/device/ports",
    tag = "Device",
    summary = "List serial ports",
    description = "Lists every serial port the bridge can see, with its hardware id and whether it matches the controller's vendor signature.",
    responses(
        (status = 200, description = "Visible ports", body = Vec<PortInfo>),
        (status = 503, description = "Enumeration failed", body = ErrorResponse),
    )
)]
pub async fn ports_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<PortInfo>>, BridgeError> {
    let ports = state.device.locator().list_ports().await?;
    tracing::debug!(count = ports.len(), "listed serial ports");
    Ok(Json(ports))
}

/// Device routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/device", get(device_handler))
        .route("/device/ports", get(ports_handler))
}
