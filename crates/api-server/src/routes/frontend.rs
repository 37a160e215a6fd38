//! Frontend WebSocket endpoint

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    routing::get,
    Router,
};
use tracing::info;

use crate::state::RelaySession;

/// Upgrade to a frontend event socket
async fn frontend_ws_handler(
    ws: WebSocketUpgrade,
    State(session): State<RelaySession>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let client_id = session.hub().accept(socket).await;
        info!("Frontend {} disconnected", client_id);
    })
}

pub fn router() -> Router<RelaySession> {
    Router::new().route("/ws/frontend", get(frontend_ws_handler))
}
