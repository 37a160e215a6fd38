//! Mod control endpoints: attach, screenshot stream, stop

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{api_error, valid_port, ApiError, ErrorResponse};
use crate::error::GatewayError;
use crate::gateway::ScreenshotStatus;
use crate::state::RelaySession;

#[derive(Debug, Deserialize)]
pub struct PortRequest {
    #[serde(default)]
    pub port: i64,
}

#[derive(Debug, Deserialize)]
pub struct ScreenshotRequest {
    #[serde(default)]
    pub port: i64,
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_command() -> String {
    "start".to_string()
}

fn default_fps() -> u32 {
    1
}

#[derive(Debug, Serialize)]
pub struct AttachResponse {
    pub status: &'static str,
    pub port: u16,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub status: &'static str,
}

/// Connect to the mod on `port`, reusing a live connection
async fn attach(
    State(session): State<RelaySession>,
    Json(req): Json<PortRequest>,
) -> Result<Json<AttachResponse>, ApiError> {
    let port = valid_port(req.port)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "port_required"))?;

    session
        .registry()
        .connect_or_reuse(port)
        .await
        .map_err(|e| {
            warn!("Attach to port {} failed: {}", port, e);
            api_error(e.status_code(), e.to_string())
        })?;

    Ok(Json(AttachResponse {
        status: "connected",
        port,
    }))
}

/// Start or stop the mod's screenshot stream
async fn screenshot_control(
    State(session): State<RelaySession>,
    Json(req): Json<ScreenshotRequest>,
) -> Result<Json<ScreenshotStatus>, ApiError> {
    let port = u16::try_from(req.port).unwrap_or(0);
    let start = req.command == "start";

    session
        .relay()
        .screenshot_control(port, start, req.fps)
        .await
        .map(Json)
        .map_err(|e| match e {
            GatewayError::Connection { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "attach_failed".to_string(),
                    detail: Some(e.to_string()),
                }),
            ),
            other => api_error(other.status_code(), other.to_string()),
        })
}

/// Send the stop command to an attached mod
async fn stop(
    State(session): State<RelaySession>,
    Json(req): Json<PortRequest>,
) -> Result<Json<StopResponse>, ApiError> {
    let port = u16::try_from(req.port).unwrap_or(0);

    session.relay().stop(port).await.map_err(|e| match e {
        GatewayError::NotAttached { .. } => api_error(StatusCode::BAD_REQUEST, "not_attached"),
        other => api_error(other.status_code(), other.to_string()),
    })?;

    Ok(Json(StopResponse {
        status: "stop_sent",
    }))
}

pub fn router() -> Router<RelaySession> {
    Router::new()
        .route("/attach", post(attach))
        .route("/screenshot_control", post(screenshot_control))
        .route("/stop", post(stop))
}
