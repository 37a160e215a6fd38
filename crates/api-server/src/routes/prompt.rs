//! Prompt relay endpoint

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use modrelay_core::PromptMode;

use super::{api_error, ApiError};
use crate::error::GatewayError;
use crate::gateway::{PromptSummary, PromptTurn};
use crate::state::RelaySession;

#[derive(Debug, Deserialize)]
pub struct SendPromptRequest {
    #[serde(default)]
    pub port: i64,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub mode: PromptMode,
}

/// Run one prompt turn against the mod on `port`
async fn send_prompt(
    State(session): State<RelaySession>,
    Json(req): Json<SendPromptRequest>,
) -> Result<Json<PromptSummary>, ApiError> {
    let turn = PromptTurn {
        port: u16::try_from(req.port).unwrap_or(0),
        prompt: req.prompt,
        mode: req.mode,
    };

    session
        .relay()
        .handle_prompt(turn)
        .await
        .map(Json)
        .map_err(|e| match e {
            GatewayError::Connection { .. } => {
                api_error(e.status_code(), format!("attach_failed: {}", e))
            }
            other => api_error(other.status_code(), other.to_string()),
        })
}

pub fn router() -> Router<RelaySession> {
    Router::new().route("/send_prompt", post(send_prompt))
}
