//! Relay events pushed to frontend clients
//!
//! Every event is a JSON object tagged by `source`: `mod` for messages read
//! from a mod connection, `lm` for model output, `server` for gateway notices.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Envelope broadcast to every frontend client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum RelayEvent {
    Mod { port: u16, payload: Value },
    Lm(LmEvent),
    Server(ServerEvent),
}

/// Model output relayed during a prompt turn
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LmEvent {
    Started { event: String, endpoint: String },
    Chunk { chunk: Value },
    Final {
        #[serde(rename = "final")]
        value: Value,
    },
    FinalText { final_text: String },
}

/// Notices originating from the gateway itself
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerEvent {
    Connected { message: String, client_id: Uuid },
    Echo { echo: String },
    Message { message: String },
}

impl RelayEvent {
    /// Message read from the mod on `port`
    pub fn from_mod(port: u16, payload: Value) -> Self {
        Self::Mod { port, payload }
    }

    pub fn stream_started(endpoint: impl Into<String>) -> Self {
        Self::Lm(LmEvent::Started {
            event: "stream_started".to_string(),
            endpoint: endpoint.into(),
        })
    }

    pub fn lm_chunk(chunk: Value) -> Self {
        Self::Lm(LmEvent::Chunk { chunk })
    }

    pub fn lm_final(value: Value) -> Self {
        Self::Lm(LmEvent::Final { value })
    }

    pub fn lm_final_text(text: impl Into<String>) -> Self {
        Self::Lm(LmEvent::FinalText {
            final_text: text.into(),
        })
    }

    /// Acknowledgement sent to a frontend right after it connects
    pub fn connected(client_id: Uuid) -> Self {
        Self::Server(ServerEvent::Connected {
            message: "connected".to_string(),
            client_id,
        })
    }

    pub fn echo(text: impl Into<String>) -> Self {
        Self::Server(ServerEvent::Echo { echo: text.into() })
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::Server(ServerEvent::Message {
            message: message.into(),
        })
    }

    /// Serialize to the JSON text sent over the wire
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
