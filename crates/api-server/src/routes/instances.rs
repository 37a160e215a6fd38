//! Mod discovery endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tracing::warn;

use crate::gateway::{McProcess, ModInstance};
use crate::state::RelaySession;

#[derive(Debug, Serialize)]
pub struct InstancesResponse {
    pub mods: Vec<ModInstance>,
    pub mc_processes: Vec<McProcess>,
}

/// Scan the mod port range and list local game processes
async fn list_instances(State(session): State<RelaySession>) -> Json<InstancesResponse> {
    let inspector = session.processes();
    let processes = tokio::task::spawn_blocking(move || inspector.game_processes());
    let mods = session.scanner().scan(session.port_range()).await;

    let mc_processes = processes.await.unwrap_or_else(|e| {
        warn!("Process enumeration failed: {}", e);
        Vec::new()
    });

    Json(InstancesResponse { mods, mc_processes })
}

pub fn router() -> Router<RelaySession> {
    Router::new().route("/instances", get(list_instances))
}
