//! Port scanner - point-in-time discovery of mod endpoints

use futures::future::join_all;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::ops::RangeInclusive;
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use modrelay_core::ModCommand;

use super::ModStream;

/// Default bounded wait for a handshake reply
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// One discovered mod endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModInstance {
    pub port: u16,
    /// Parsed handshake reply, `None` when the port stayed silent
    pub handshake: Option<Value>,
}

/// Result of probing a single port
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// Connected and replied with JSON
    Handshake(Value),
    /// Connected but no usable reply within the timeout
    Silent,
    /// Could not connect
    Unreachable,
}

impl ProbeOutcome {
    fn into_instance(self, port: u16) -> Option<ModInstance> {
        match self {
            Self::Handshake(reply) => Some(ModInstance {
                port,
                handshake: Some(reply),
            }),
            Self::Silent => Some(ModInstance {
                port,
                handshake: None,
            }),
            Self::Unreachable => None,
        }
    }
}

/// Probes a range of local ports for mod WebSocket endpoints
#[derive(Debug, Clone)]
pub struct PortScanner {
    host: String,
    auth_token: String,
    timeout: Duration,
}

impl PortScanner {
    pub fn new(host: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            auth_token: auth_token.into(),
            timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Probe every port in `range` concurrently. Unreachable ports are
    /// omitted; the result is sorted by port.
    pub async fn scan(&self, range: RangeInclusive<u16>) -> Vec<ModInstance> {
        let probes = range.map(|port| async move { self.probe(port).await.into_instance(port) });
        let mut found: Vec<ModInstance> = join_all(probes).await.into_iter().flatten().collect();
        found.sort_by_key(|instance| instance.port);
        debug!("Port scan found {} mod endpoint(s)", found.len());
        found
    }

    /// Connect, send the handshake, and wait for one reply
    pub async fn probe(&self, port: u16) -> ProbeOutcome {
        let url = format!("ws://{}:{}", self.host, port);
        let connect = tokio_tungstenite::connect_async(url.as_str());
        let mut stream = match timeout(self.timeout, connect).await {
            Ok(Ok((stream, _))) => stream,
            Ok(Err(e)) => {
                debug!("Port {} unreachable: {}", port, e);
                return ProbeOutcome::Unreachable;
            }
            Err(_) => {
                debug!("Port {} connect timed out", port);
                return ProbeOutcome::Unreachable;
            }
        };

        let outcome = match timeout(self.timeout, self.handshake(&mut stream)).await {
            Ok(Some(reply)) => ProbeOutcome::Handshake(reply),
            Ok(None) => ProbeOutcome::Silent,
            Err(_) => {
                debug!("Port {} silent after {:?}", port, self.timeout);
                ProbeOutcome::Silent
            }
        };

        let _ = timeout(self.timeout, stream.close(None)).await;
        outcome
    }

    async fn handshake(&self, stream: &mut ModStream) -> Option<Value> {
        let text = ModCommand::handshake(&self.auth_token).to_json().ok()?;
        stream.send(Message::text(text)).await.ok()?;

        loop {
            match stream.next().await? {
                Ok(Message::Text(text)) => return serde_json::from_str(text.as_str()).ok(),
                Ok(Message::Binary(data)) => return serde_json::from_slice(&data).ok(),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }
}
