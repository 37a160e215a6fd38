//! In-process mock peers shared by the gateway tests

use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

/// A port that nothing listens on
pub async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// `len` consecutive free ports, each held by a bound listener
pub async fn free_port_run(len: u16) -> Vec<TcpListener> {
    loop {
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = first.local_addr().unwrap().port();
        if base.checked_add(len).is_none() {
            continue;
        }
        let mut run = vec![first];
        for offset in 1..len {
            match TcpListener::bind(("127.0.0.1", base + offset)).await {
                Ok(listener) => run.push(listener),
                Err(_) => break,
            }
        }
        if run.len() == usize::from(len) {
            return run;
        }
    }
}

/// Next frontend event, parsed
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
    let text = tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for relay event")
        .expect("hub queue closed");
    serde_json::from_str(&text).unwrap()
}

#[derive(Debug, Clone)]
enum Control {
    Push(String),
    Disconnect,
}

/// Mock mod endpoint: records every message it receives and optionally
/// answers handshakes
pub struct MockMod {
    pub port: u16,
    received: mpsc::UnboundedReceiver<Value>,
    control: broadcast::Sender<Control>,
    accepted: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockMod {
    pub async fn spawn(reply: Option<Value>) -> Self {
        Self::start(reply.map(|v| v.to_string())).await
    }

    pub async fn spawn_with_reply_text(reply: &str) -> Self {
        Self::start(Some(reply.to_string())).await
    }

    /// Serve on an already bound listener
    pub fn on_listener(listener: TcpListener, reply: Option<Value>) -> Self {
        Self::serve(listener, reply.map(|v| v.to_string()))
    }

    async fn start(reply: Option<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener, reply)
    }

    fn serve(listener: TcpListener, reply: Option<String>) -> Self {
        let port = listener.local_addr().unwrap().port();
        let (received_tx, received) = mpsc::unbounded_channel();
        let (control, _) = broadcast::channel(16);
        let accepted = Arc::new(AtomicUsize::new(0));

        let control_tx = control.clone();
        let accepted_count = Arc::clone(&accepted);
        let task = tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let mut control_rx = control_tx.subscribe();
                let received_tx = received_tx.clone();
                let reply = reply.clone();
                let Ok(mut ws) = tokio_tungstenite::accept_async(tcp).await else {
                    continue;
                };
                accepted_count.fetch_add(1, Ordering::SeqCst);

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            msg = ws.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    let value: Value = serde_json::from_str(text.as_str())
                                        .unwrap_or_else(|_| json!({"raw": text.as_str()}));
                                    let is_handshake = value["type"] == "handshake";
                                    let _ = received_tx.send(value);
                                    if let (true, Some(reply)) = (is_handshake, &reply) {
                                        let _ = ws.send(Message::text(reply.clone())).await;
                                    }
                                }
                                Some(Ok(_)) => {}
                                _ => break,
                            },
                            ctrl = control_rx.recv() => match ctrl {
                                Ok(Control::Push(text)) => {
                                    let _ = ws.send(Message::text(text)).await;
                                }
                                Ok(Control::Disconnect) | Err(_) => {
                                    let _ = ws.close(None).await;
                                    break;
                                }
                            },
                        }
                    }
                });
            }
        });

        Self {
            port,
            received,
            control,
            accepted,
            task,
        }
    }

    pub async fn next_message(&mut self) -> Option<Value> {
        self.next_message_within(WAIT).await
    }

    pub async fn next_message_within(&mut self, wait: Duration) -> Option<Value> {
        tokio::time::timeout(wait, self.received.recv())
            .await
            .ok()
            .flatten()
    }

    /// Send a text frame to every open connection
    pub fn push(&self, text: &str) {
        let _ = self.control.send(Control::Push(text.to_string()));
    }

    /// Close every open connection from the mod side
    pub fn disconnect(&self) {
        let _ = self.control.send(Control::Disconnect);
    }

    /// Number of WebSocket connections accepted so far
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

impl Drop for MockMod {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Clone)]
struct MockLmState {
    chunks: Arc<Vec<String>>,
    body: Arc<String>,
    status: StatusCode,
    requests: Arc<Mutex<Vec<Value>>>,
}

/// Mock LM service serving either a socket stream or the HTTP fallback
pub struct MockLm {
    port: u16,
    requests: Arc<Mutex<Vec<Value>>>,
    task: JoinHandle<()>,
}

impl MockLm {
    /// Socket endpoint at `/stream` replying with `chunks`, one frame each
    pub async fn socket(chunks: Vec<String>) -> Self {
        let state = MockLmState {
            chunks: Arc::new(chunks),
            body: Arc::new(String::new()),
            status: StatusCode::OK,
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        Self::serve(Router::new().route("/stream", get(stream_handler)), state).await
    }

    /// Only the HTTP generation endpoint, answering with `body`
    pub async fn http(body: &str) -> Self {
        Self::http_with_status(StatusCode::OK, body).await
    }

    pub async fn http_with_status(status: StatusCode, body: &str) -> Self {
        let state = MockLmState {
            chunks: Arc::new(Vec::new()),
            body: Arc::new(body.to_string()),
            status,
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        Self::serve(
            Router::new().route("/api/v1/generate", post(generate_handler)),
            state,
        )
        .await
    }

    async fn serve(router: Router<MockLmState>, state: MockLmState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::clone(&state.requests);
        let app = router.with_state(state);
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            port,
            requests,
            task,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Generation requests received so far
    pub async fn requests(&self) -> Vec<Value> {
        self.requests.lock().await.clone()
    }
}

impl Drop for MockLm {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn stream_handler(ws: WebSocketUpgrade, State(state): State<MockLmState>) -> Response {
    ws.on_upgrade(move |socket| stream_chunks(socket, state))
}

async fn stream_chunks(mut socket: WebSocket, state: MockLmState) {
    if let Some(Ok(AxumMessage::Text(text))) = socket.recv().await {
        if let Ok(request) = serde_json::from_str::<Value>(text.as_str()) {
            state.requests.lock().await.push(request);
        }
    }
    for chunk in state.chunks.iter() {
        if socket
            .send(AxumMessage::Text(chunk.clone().into()))
            .await
            .is_err()
        {
            return;
        }
    }
    let _ = socket.send(AxumMessage::Close(None)).await;
}

async fn generate_handler(
    State(state): State<MockLmState>,
    Json(request): Json<Value>,
) -> (StatusCode, String) {
    state.requests.lock().await.push(request);
    (state.status, state.body.as_str().to_string())
}
