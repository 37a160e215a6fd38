//! Relay configuration endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::RelaySession;

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub auth_token: String,
    pub lm_url: String,
}

async fn get_config(State(session): State<RelaySession>) -> Json<ConfigResponse> {
    let config = session.config();
    Json(ConfigResponse {
        auth_token: config.auth_token().to_string(),
        lm_url: config.lm_url().to_string(),
    })
}

pub fn router() -> Router<RelaySession> {
    Router::new().route("/config", get(get_config))
}
