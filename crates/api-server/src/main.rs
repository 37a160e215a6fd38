//! Mod relay gateway
//!
//! This is the main entry point for the relay backend. It serves the REST
//! API and the frontend WebSocket on one port, and talks to mod endpoints
//! and the LM service as a client.

mod config;
mod error;
mod gateway;
mod routes;
mod state;

#[cfg(test)]
mod test_support;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modrelay_core::ConfigProvider;

use crate::config::ServerConfig;
use crate::state::RelaySession;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "modrelay_api=debug,modrelay_core=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let server_config = ServerConfig::from_env()?;
    tracing::info!("Using data directory: {:?}", server_config.data_dir);

    let mut relay_config = ConfigProvider::load_or_create(server_config.config_path()).await?;
    if let Some(lm_url) = server_config.lm_url.clone() {
        relay_config = relay_config.with_lm_url(lm_url);
    }
    tracing::info!("LM service: {}", relay_config.lm_url());

    let session = RelaySession::new(relay_config, server_config.session.clone());
    tracing::info!(
        "Relay session ready (mod ports {}-{})",
        session.port_range().start(),
        session.port_range().end()
    );

    let app = routes::router()
        .with_state(session.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(server_config.bind_addr).await?;
    tracing::info!("Relay gateway listening on {}", server_config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    session.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
