//! Route handlers

pub mod config;
pub mod frontend;
pub mod health;
pub mod instances;
pub mod mods;
pub mod prompt;

use axum::{http::StatusCode, Json, Router};
use serde::Serialize;

use crate::state::RelaySession;

/// JSON error body shared by every route
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            detail: None,
        }),
    )
}

/// Ports arrive as loose JSON numbers; only 1..=65535 is usable
pub fn valid_port(raw: i64) -> Option<u16> {
    u16::try_from(raw).ok().filter(|port| *port > 0)
}

/// Every HTTP and WebSocket route of the gateway
pub fn router() -> Router<RelaySession> {
    Router::new()
        .merge(health::router())
        .merge(config::router())
        .merge(instances::router())
        .merge(mods::router())
        .merge(prompt::router())
        .merge(frontend::router())
}
