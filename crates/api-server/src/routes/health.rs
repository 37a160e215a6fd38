//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::RelaySession;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    attached_mods: Vec<u16>,
    frontends: usize,
}

async fn health_check(State(session): State<RelaySession>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        attached_mods: session.registry().attached_ports().await,
        frontends: session.hub().client_count().await,
    })
}

pub fn router() -> Router<RelaySession> {
    Router::new().route("/health", get(health_check))
}
