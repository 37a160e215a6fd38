//! Mod registry - owns at most one live WebSocket connection per mod port

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::timeout;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use modrelay_core::{ModCommand, RelayEvent};

use super::hub::FrontendHub;
use super::ModStream;
use crate::error::{GatewayError, Result};

type ConnectionMap = Arc<RwLock<HashMap<u16, Arc<ModConnection>>>>;

/// Upper bound on opening a mod socket and sending its handshake
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Live connection to one mod endpoint
pub struct ModConnection {
    port: u16,
    id: u64,
    tx: mpsc::UnboundedSender<Message>,
    live: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl ModConnection {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Registry-unique connection id
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn send(&self, command: &ModCommand) -> Result<()> {
        if !self.is_live() {
            return Err(GatewayError::NotAttached { port: self.port });
        }
        let text = command.to_json()?;
        self.tx
            .send(Message::text(text))
            .map_err(|_| GatewayError::NotAttached { port: self.port })
    }

    fn abort(&self) {
        self.live.store(false, Ordering::SeqCst);
        self.reader.abort();
        self.writer.abort();
    }
}

/// Registry of mod connections keyed by port
pub struct ModRegistry {
    connections: ConnectionMap,
    /// One lock per port; connects to different ports never wait on each other
    connect_locks: Mutex<HashMap<u16, Arc<Mutex<()>>>>,
    hub: Arc<FrontendHub>,
    host: String,
    auth_token: String,
    connect_timeout: Duration,
    next_id: AtomicU64,
}

impl ModRegistry {
    pub fn new(
        host: impl Into<String>,
        auth_token: impl Into<String>,
        hub: Arc<FrontendHub>,
    ) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            connect_locks: Mutex::new(HashMap::new()),
            hub,
            host: host.into(),
            auth_token: auth_token.into(),
            connect_timeout: CONNECT_TIMEOUT,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Return the live connection for `port`, opening one if needed.
    ///
    /// A new connection sends the handshake and gets its own read loop before
    /// it is returned. Nothing is registered when the connect fails.
    pub async fn connect_or_reuse(&self, port: u16) -> Result<Arc<ModConnection>> {
        if port == 0 {
            return Err(GatewayError::connection(port, "port must be positive"));
        }
        if let Some(conn) = self.live_connection(port).await {
            return Ok(conn);
        }

        let port_lock = {
            let mut locks = self.connect_locks.lock().await;
            Arc::clone(locks.entry(port).or_default())
        };
        let _guard = port_lock.lock().await;
        if let Some(conn) = self.live_connection(port).await {
            return Ok(conn);
        }

        let url = format!("ws://{}:{}", self.host, port);
        let (stream, _) = timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await
        .map_err(|_| GatewayError::connection(port, "timed out opening socket"))?
        .map_err(|e| GatewayError::connection(port, e))?;
        let (mut sink, source) = stream.split();

        let handshake = ModCommand::handshake(&self.auth_token).to_json()?;
        timeout(self.connect_timeout, sink.send(Message::text(handshake)))
            .await
            .map_err(|_| GatewayError::connection(port, "timed out sending handshake"))?
            .map_err(|e| GatewayError::connection(port, e))?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let live = Arc::new(AtomicBool::new(true));
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    warn!("Failed to write to mod on port {}: {}", port, e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Hold the map lock until the connection is inserted so the read loop
        // cannot deregister before registration.
        let mut connections = self.connections.write().await;
        let reader = tokio::spawn(read_loop(
            port,
            id,
            source,
            Arc::clone(&live),
            Arc::clone(&self.connections),
            Arc::clone(&self.hub),
        ));

        let conn = Arc::new(ModConnection {
            port,
            id,
            tx,
            live,
            reader,
            writer,
        });
        // A replaced entry is already dead; its own read loop announces the close.
        connections.insert(port, Arc::clone(&conn));
        info!("Attached to mod on port {} (connection {})", port, id);

        Ok(conn)
    }

    /// Send a command without waiting for any reply
    pub async fn send(&self, port: u16, command: &ModCommand) -> Result<()> {
        let conn = self
            .live_connection(port)
            .await
            .ok_or(GatewayError::NotAttached { port })?;
        conn.send(command)?;
        debug!("Sent {} command to mod on port {}", command.kind(), port);
        Ok(())
    }

    pub async fn is_attached(&self, port: u16) -> bool {
        self.live_connection(port).await.is_some()
    }

    /// Ports with a live connection, ascending
    pub async fn attached_ports(&self) -> Vec<u16> {
        let connections = self.connections.read().await;
        let mut ports: Vec<u16> = connections
            .values()
            .filter(|c| c.is_live())
            .map(|c| c.port)
            .collect();
        ports.sort_unstable();
        ports
    }

    /// Drop every connection and stop its tasks
    pub async fn shutdown(&self) {
        let mut connections = self.connections.write().await;
        for (port, conn) in connections.drain() {
            conn.abort();
            debug!("Closed mod connection on port {}", port);
        }
    }

    async fn live_connection(&self, port: u16) -> Option<Arc<ModConnection>> {
        let connections = self.connections.read().await;
        connections.get(&port).filter(|c| c.is_live()).cloned()
    }
}

/// Relay every inbound mod message to the frontends until the socket ends
async fn read_loop(
    port: u16,
    id: u64,
    mut source: futures::stream::SplitStream<ModStream>,
    live: Arc<AtomicBool>,
    connections: ConnectionMap,
    hub: Arc<FrontendHub>,
) {
    let cause = loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => {
                hub.broadcast(&RelayEvent::from_mod(port, parse_or_raw(text.as_str())))
                    .await;
            }
            Some(Ok(Message::Binary(data))) => {
                let text = String::from_utf8_lossy(&data);
                hub.broadcast(&RelayEvent::from_mod(port, parse_or_raw(&text)))
                    .await;
            }
            Some(Ok(Message::Close(frame))) => {
                break match frame {
                    Some(frame) if !frame.reason.as_str().is_empty() => format!(
                        "closed by peer ({}): {}",
                        u16::from(frame.code),
                        frame.reason.as_str()
                    ),
                    Some(frame) => format!("closed by peer ({})", u16::from(frame.code)),
                    None => "closed by peer".to_string(),
                };
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                error!("WebSocket error from mod on port {}: {}", port, e);
                break e.to_string();
            }
            None => break "connection closed".to_string(),
        }
    };

    live.store(false, Ordering::SeqCst);
    {
        let mut connections = connections.write().await;
        if connections.get(&port).is_some_and(|c| c.id == id) {
            connections.remove(&port);
        }
    }

    info!("Mod connection on port {} ended: {}", port, cause);
    hub.broadcast(&RelayEvent::server(format!(
        "mod connection closed {}: {}",
        port, cause
    )))
    .await;
}

/// Parse a mod payload, wrapping non-JSON text as `{raw: ...}`
pub fn parse_or_raw(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "raw": text }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{free_port, next_event, MockMod};
    use std::time::Duration;

    const TOKEN: &str = "test-token";

    fn registry() -> (ModRegistry, Arc<FrontendHub>) {
        let hub = Arc::new(FrontendHub::new());
        (ModRegistry::new("127.0.0.1", TOKEN, Arc::clone(&hub)), hub)
    }

    #[tokio::test]
    async fn connect_or_reuse_sends_one_handshake() {
        let mut mock = MockMod::spawn(Some(json!({"status": "handshake_ok"}))).await;
        let (registry, _hub) = registry();

        let first = registry.connect_or_reuse(mock.port).await.unwrap();
        let second = registry.connect_or_reuse(mock.port).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.port(), mock.port);
        let handshake = mock.next_message().await.unwrap();
        assert_eq!(handshake, json!({"type": "handshake", "auth": TOKEN}));
        assert!(mock
            .next_message_within(Duration::from_millis(200))
            .await
            .is_none());
        assert_eq!(mock.accepted(), 1);
    }

    #[tokio::test]
    async fn connect_failure_registers_nothing() {
        let (registry, _hub) = registry();
        let port = free_port().await;

        let result = registry.connect_or_reuse(port).await;

        assert!(matches!(result, Err(GatewayError::Connection { .. })));
        assert!(!registry.is_attached(port).await);
    }

    #[tokio::test]
    async fn zero_port_is_rejected() {
        let (registry, _hub) = registry();
        assert!(matches!(
            registry.connect_or_reuse(0).await,
            Err(GatewayError::Connection { port: 0, .. })
        ));
    }

    #[tokio::test]
    async fn send_requires_attachment() {
        let (registry, _hub) = registry();
        let result = registry.send(42060, &ModCommand::stop(TOKEN)).await;
        assert!(matches!(
            result,
            Err(GatewayError::NotAttached { port: 42060 })
        ));
    }

    #[tokio::test]
    async fn send_delivers_command() {
        let mut mock = MockMod::spawn(None).await;
        let (registry, _hub) = registry();
        registry.connect_or_reuse(mock.port).await.unwrap();
        mock.next_message().await.unwrap();

        registry
            .send(mock.port, &ModCommand::goal("mine diamonds", TOKEN))
            .await
            .unwrap();

        let goal = mock.next_message().await.unwrap();
        assert_eq!(
            goal,
            json!({"type": "goal", "goal": "mine diamonds", "auth": TOKEN})
        );
    }

    #[tokio::test]
    async fn inbound_messages_are_relayed() {
        let mut mock = MockMod::spawn(None).await;
        let (registry, hub) = registry();
        let (_id, mut events) = hub.register().await;
        registry.connect_or_reuse(mock.port).await.unwrap();
        mock.next_message().await.unwrap();

        mock.push(r#"{"status":"progress","step":1}"#);
        mock.push("not json");

        let first = next_event(&mut events).await;
        assert_eq!(
            first,
            json!({
                "source": "mod",
                "port": mock.port,
                "payload": {"status": "progress", "step": 1}
            })
        );
        let second = next_event(&mut events).await;
        assert_eq!(second["payload"], json!({"raw": "not json"}));
    }

    #[tokio::test]
    async fn closed_socket_deregisters_once() {
        let mut mock = MockMod::spawn(None).await;
        let (registry, hub) = registry();
        let (_id, mut events) = hub.register().await;
        registry.connect_or_reuse(mock.port).await.unwrap();
        mock.next_message().await.unwrap();

        mock.disconnect();

        let event = next_event(&mut events).await;
        assert_eq!(event["source"], "server");
        let message = event["message"].as_str().unwrap();
        assert!(message.starts_with(&format!("mod connection closed {}", mock.port)));

        assert!(matches!(
            registry.send(mock.port, &ModCommand::stop(TOKEN)).await,
            Err(GatewayError::NotAttached { .. })
        ));
        assert!(registry.attached_ports().await.is_empty());
        assert!(
            tokio::time::timeout(Duration::from_millis(200), events.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn reconnects_after_close() {
        let mut mock = MockMod::spawn(None).await;
        let (registry, hub) = registry();
        let (_id, mut events) = hub.register().await;
        let first = registry.connect_or_reuse(mock.port).await.unwrap();
        mock.next_message().await.unwrap();

        mock.disconnect();
        next_event(&mut events).await;

        let second = registry.connect_or_reuse(mock.port).await.unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(
            mock.next_message().await.unwrap(),
            json!({"type": "handshake", "auth": TOKEN})
        );
        assert_eq!(mock.accepted(), 2);
    }

    #[tokio::test]
    async fn shutdown_drops_connections() {
        let mut mock = MockMod::spawn(None).await;
        let (registry, _hub) = registry();
        let conn = registry.connect_or_reuse(mock.port).await.unwrap();
        mock.next_message().await.unwrap();

        registry.shutdown().await;

        assert!(!conn.is_live());
        assert!(!registry.is_attached(mock.port).await);
    }

    /// Listener that accepts TCP but never answers the upgrade
    async fn stalled_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        port
    }

    #[tokio::test]
    async fn stalled_port_does_not_block_other_ports() {
        let mut mock = MockMod::spawn(None).await;
        let stalled = stalled_port().await;
        let (registry, _hub) = registry();
        let registry = Arc::new(registry);

        let background = Arc::clone(&registry);
        let pending = tokio::spawn(async move { background.connect_or_reuse(stalled).await });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let healthy = tokio::time::timeout(
            Duration::from_secs(3),
            registry.connect_or_reuse(mock.port),
        )
        .await
        .expect("attach to a healthy port should not wait on a stalled one");
        assert!(healthy.is_ok());
        assert_eq!(
            mock.next_message().await.unwrap(),
            json!({"type": "handshake", "auth": TOKEN})
        );
        assert!(!pending.is_finished());
        pending.abort();
    }

    #[tokio::test]
    async fn stalled_connect_times_out() {
        let stalled = stalled_port().await;
        let hub = Arc::new(FrontendHub::new());
        let registry = ModRegistry::new("127.0.0.1", TOKEN, hub)
            .with_connect_timeout(Duration::from_millis(300));

        let result = registry.connect_or_reuse(stalled).await;

        assert!(matches!(
            result,
            Err(GatewayError::Connection { port, .. }) if port == stalled
        ));
        assert!(!registry.is_attached(stalled).await);
    }

    #[test]
    fn wraps_unparsable_payloads() {
        assert_eq!(parse_or_raw(r#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(parse_or_raw("hello"), json!({"raw": "hello"}));
    }
}
