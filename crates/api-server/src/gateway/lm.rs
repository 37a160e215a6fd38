//! LM inference service client
//!
//! Two transports are supported: a WebSocket stream (several endpoint paths
//! are guessed, in order) and a chunked HTTP generation request used when no
//! socket endpoint answers.

use futures::{SinkExt, StreamExt};
use reqwest::Client;
use serde::Serialize;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::ModStream;
use crate::error::{GatewayError, Result};

/// Default model requested from the LM service
pub const DEFAULT_MODEL: &str = "hermes-3-llama-3.1-8b";

/// Socket endpoint suffixes, in priority order
pub const STREAM_PATHS: [&str; 3] = ["/stream", "/ws", "/api/v1/stream"];

/// REST path of the chunked HTTP fallback
pub const GENERATE_PATH: &str = "/api/v1/generate";

#[derive(Serialize)]
struct StreamRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    input: &'a str,
    stream: bool,
}

/// Client for the LM inference service
#[derive(Debug, Clone)]
pub struct LmClient {
    client: Client,
    base_url: String,
    model: String,
}

impl LmClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            // Disable proxy for local inference traffic
            client: Client::builder()
                .no_proxy()
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    /// Socket streaming endpoints derived from the base URL, in the order
    /// they are tried
    pub fn stream_candidates(&self) -> Vec<String> {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        STREAM_PATHS
            .iter()
            .map(|path| format!("{}{}", ws_base, path))
            .collect()
    }

    /// Open a socket stream on `endpoint` and submit the generation request
    pub async fn open_stream(&self, endpoint: &str, prompt: &str) -> Result<LmStream> {
        let (mut stream, _) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| GatewayError::upstream(format!("{}: {}", endpoint, e)))?;

        let request = serde_json::to_string(&StreamRequest {
            model: &self.model,
            prompt,
            stream: true,
        })?;
        if let Err(e) = stream.send(Message::text(request)).await {
            let _ = stream.close(None).await;
            return Err(GatewayError::upstream(format!("{}: {}", endpoint, e)));
        }

        info!("LM stream opened at {}", endpoint);
        Ok(LmStream { stream })
    }

    /// Issue the chunked HTTP generation request.
    ///
    /// A non-success status is not an error: its body is streamed like any
    /// other output. Only transport failures fail the request.
    pub async fn generate(&self, prompt: &str) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, GENERATE_PATH);
        debug!("Sending generation request to {}", url);

        let res = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model: &self.model,
                input: prompt,
                stream: true,
            })
            .send()
            .await
            .map_err(|e| GatewayError::upstream(format!("Failed to reach LM service: {}", e)))?;

        if !res.status().is_success() {
            warn!("LM service returned {} for {}", res.status(), url);
        }
        Ok(res)
    }
}

/// Active socket stream from the LM service
pub struct LmStream {
    stream: ModStream,
}

impl LmStream {
    /// Next text chunk; `None` once the stream has ended
    pub async fn next_chunk(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Binary(data)) => {
                    return Some(Ok(String::from_utf8_lossy(&data).into_owned()))
                }
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => return Some(Err(GatewayError::upstream(e))),
            }
        }
    }

    /// Close the socket; errors are irrelevant once the turn is done
    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// First `max_chars` characters of `text`
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Drain the longest valid UTF-8 prefix from `pending`, keeping an
/// incomplete trailing sequence for the next chunk
pub fn take_utf8(pending: &mut Vec<u8>) -> String {
    let valid = match std::str::from_utf8(pending) {
        Ok(_) => pending.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            return text;
        }
    };
    let rest = pending.split_off(valid);
    let text = String::from_utf8_lossy(pending).into_owned();
    *pending = rest;
    text
}
