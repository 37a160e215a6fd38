//! Frontend hub - fan-out of relay events to connected UI clients

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use modrelay_core::RelayEvent;

/// Registered frontend clients, keyed by client id
pub struct FrontendHub {
    clients: RwLock<HashMap<Uuid, mpsc::UnboundedSender<String>>>,
}

impl FrontendHub {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new client, returning its id and the outbound queue
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client_id = Uuid::new_v4();
        self.clients.write().await.insert(client_id, tx);
        info!("Frontend {} registered", client_id);
        (client_id, rx)
    }

    /// Remove a client. Returns false when it was already gone.
    pub async fn unregister(&self, client_id: Uuid) -> bool {
        let removed = self.clients.write().await.remove(&client_id).is_some();
        if removed {
            info!("Frontend {} unregistered", client_id);
        }
        removed
    }

    /// Send one event to a single client
    pub async fn send_to(&self, client_id: Uuid, event: &RelayEvent) -> bool {
        let text = match event.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize relay event: {}", e);
                return false;
            }
        };
        let clients = self.clients.read().await;
        clients
            .get(&client_id)
            .is_some_and(|tx| tx.send(text).is_ok())
    }

    /// Send an event to every registered client.
    ///
    /// Clients whose queue is closed are pruned once the pass is over; a
    /// failure never stops delivery to the remaining clients. Returns the
    /// number of clients the event was handed to.
    pub async fn broadcast(&self, event: &RelayEvent) -> usize {
        let text = match event.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize relay event: {}", e);
                return 0;
            }
        };

        let mut dead = Vec::new();
        let mut delivered = 0;
        {
            let clients = self.clients.read().await;
            for (client_id, tx) in clients.iter() {
                if tx.send(text.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(*client_id);
                }
            }
        }

        if !dead.is_empty() {
            let mut clients = self.clients.write().await;
            for client_id in dead {
                if clients.remove(&client_id).is_some() {
                    warn!("Pruned unreachable frontend {}", client_id);
                }
            }
        }

        delivered
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Serve one frontend WebSocket until it disconnects.
    ///
    /// Sends the `connected` acknowledgement, then echoes every text frame
    /// back. Broadcasts reach the socket through the same outbound queue.
    pub async fn accept(&self, socket: WebSocket) -> Uuid {
        let (mut ws_sender, mut ws_receiver) = socket.split();
        let (client_id, mut rx) = self.register().await;

        let send_task = tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if ws_sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        });

        self.send_to(client_id, &RelayEvent::connected(client_id))
            .await;

        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    self.send_to(client_id, &RelayEvent::echo(text.as_str()))
                        .await;
                }
                Ok(Message::Close(_)) => {
                    debug!("Frontend {} sent close frame", client_id);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket error from frontend {}: {}", client_id, e);
                    break;
                }
            }
        }

        self.unregister(client_id).await;
        send_task.abort();
        client_id
    }
}

impl Default for FrontendHub {
    fn default() -> Self {
        Self::new()
    }
}
