//! Prompt relay - drives one prompt turn from the LM to a mod
//!
//! A turn attaches to the target mod, streams model output to every frontend
//! and forwards commands to the mod according to the prompt mode:
//! - `low`: every action found in the stream is forwarded as it arrives
//! - `high`: one goal command carrying the prompt is sent after streaming

use futures::StreamExt;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use modrelay_core::{ModCommand, PromptMode, RelayEvent};

use super::hub::FrontendHub;
use super::lm::{preview, take_utf8, LmClient};
use super::registry::ModRegistry;
use crate::error::{GatewayError, Result};

/// Preview length of an unparsable final body
pub const FINAL_PREVIEW_CHARS: usize = 1000;

/// One prompt turn
#[derive(Debug, Clone)]
pub struct PromptTurn {
    pub port: u16,
    pub prompt: String,
    pub mode: PromptMode,
}

/// Summary returned once a turn is handled
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptSummary {
    pub status: &'static str,
    pub mode: PromptMode,
}

/// Outcome of a screenshot control request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ScreenshotStatus {
    Started { port: u16, fps: u32 },
    Stopped { port: u16 },
}

/// Orchestrates prompt turns and direct mod commands
pub struct PromptRelay {
    registry: Arc<ModRegistry>,
    hub: Arc<FrontendHub>,
    lm: LmClient,
    auth_token: String,
}

impl PromptRelay {
    pub fn new(
        registry: Arc<ModRegistry>,
        hub: Arc<FrontendHub>,
        lm: LmClient,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            hub,
            lm,
            auth_token: auth_token.into(),
        }
    }

    /// Run one prompt turn.
    ///
    /// Fails only when the mod cannot be attached or when the HTTP fallback
    /// fails; everything relayed before a failure stands.
    pub async fn handle_prompt(&self, turn: PromptTurn) -> Result<PromptSummary> {
        if !self.registry.is_attached(turn.port).await {
            self.registry.connect_or_reuse(turn.port).await?;
        }
        info!(
            "Prompt turn on port {} (mode {}, {} chars)",
            turn.port,
            turn.mode,
            turn.prompt.len()
        );

        match self.stream_socket(&turn).await {
            Ok(()) => {}
            Err(GatewayError::StreamTransportExhausted) => {
                debug!("No LM socket endpoint answered, falling back to HTTP");
                if let Err(e) = self.stream_http(&turn).await {
                    warn!("LM fallback failed: {}", e);
                    self.hub
                        .broadcast(&RelayEvent::server(format!("lm_fallback_error: {}", e)))
                        .await;
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }

        if turn.mode == PromptMode::High {
            let goal = ModCommand::goal(turn.prompt.as_str(), &self.auth_token);
            self.forward(turn.port, &goal).await;
        }

        Ok(PromptSummary {
            status: "prompt_handled",
            mode: turn.mode,
        })
    }

    /// Send the stop command to an attached mod
    pub async fn stop(&self, port: u16) -> Result<()> {
        self.registry
            .send(port, &ModCommand::stop(&self.auth_token))
            .await
    }

    /// Start or stop the mod's screenshot stream, attaching first if needed
    pub async fn screenshot_control(
        &self,
        port: u16,
        start: bool,
        fps: u32,
    ) -> Result<ScreenshotStatus> {
        if !self.registry.is_attached(port).await {
            self.registry.connect_or_reuse(port).await?;
        }
        if start {
            self.registry
                .send(port, &ModCommand::screenshot_start(fps, &self.auth_token))
                .await?;
            Ok(ScreenshotStatus::Started { port, fps })
        } else {
            self.registry
                .send(port, &ModCommand::screenshot_stop(&self.auth_token))
                .await?;
            Ok(ScreenshotStatus::Stopped { port })
        }
    }

    /// Try each socket candidate in order; the first one that accepts the
    /// generation request is streamed to completion.
    async fn stream_socket(&self, turn: &PromptTurn) -> Result<()> {
        for endpoint in self.lm.stream_candidates() {
            let mut stream = match self.lm.open_stream(&endpoint, &turn.prompt).await {
                Ok(stream) => stream,
                Err(e) => {
                    debug!("LM candidate rejected: {}", e);
                    continue;
                }
            };

            self.hub
                .broadcast(&RelayEvent::stream_started(endpoint.as_str()))
                .await;

            while let Some(next) = stream.next_chunk().await {
                let text = match next {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("LM stream {} failed: {}", endpoint, e);
                        self.hub
                            .broadcast(&RelayEvent::server(format!("lm_stream_error: {}", e)))
                            .await;
                        break;
                    }
                };
                let chunk: Value =
                    serde_json::from_str(&text).unwrap_or_else(|_| json!({ "chunk": text }));
                self.hub.broadcast(&RelayEvent::lm_chunk(chunk.clone())).await;

                if turn.mode == PromptMode::Low {
                    let action = chunk
                        .get("action")
                        .filter(|a| a.as_object().is_some_and(|o| !o.is_empty()));
                    if let Some(action) = action {
                        self.forward_action(turn.port, action).await;
                    }
                }
            }

            stream.close().await;
            return Ok(());
        }
        Err(GatewayError::StreamTransportExhausted)
    }

    /// Chunked HTTP fallback
    async fn stream_http(&self, turn: &PromptTurn) -> Result<()> {
        let res = self.lm.generate(&turn.prompt).await?;
        let mut body = res.bytes_stream();
        let mut pending = Vec::new();
        let mut full = String::new();

        while let Some(item) = body.next().await {
            let bytes = item.map_err(|e| GatewayError::upstream(format!("Stream error: {}", e)))?;
            pending.extend_from_slice(&bytes);
            let text = take_utf8(&mut pending);
            if text.is_empty() {
                continue;
            }
            full.push_str(&text);
            self.relay_http_chunk(turn, &text).await;
        }
        if !pending.is_empty() {
            let text = String::from_utf8_lossy(&pending).into_owned();
            full.push_str(&text);
            self.relay_http_chunk(turn, &text).await;
        }

        if !full.is_empty() {
            let event = match serde_json::from_str::<Value>(&full) {
                Ok(value) => RelayEvent::lm_final(value),
                Err(_) => RelayEvent::lm_final_text(preview(&full, FINAL_PREVIEW_CHARS)),
            };
            self.hub.broadcast(&event).await;
        }
        Ok(())
    }

    async fn relay_http_chunk(&self, turn: &PromptTurn, text: &str) {
        let parsed: Value = serde_json::from_str(text).unwrap_or_else(|_| json!({ "text": text }));
        self.hub.broadcast(&RelayEvent::lm_chunk(parsed.clone())).await;

        let is_actions = parsed.get("type").and_then(Value::as_str) == Some("actions");
        if turn.mode == PromptMode::Low && is_actions {
            if let Some(actions) = parsed.get("actions").and_then(Value::as_array) {
                for action in actions {
                    self.forward_action(turn.port, action).await;
                }
            }
        }
    }

    async fn forward_action(&self, port: u16, action: &Value) {
        match ModCommand::action_from_value(action, &self.auth_token) {
            Some(command) => self.forward(port, &command).await,
            None => debug!("Ignoring non-object action: {}", action),
        }
    }

    /// Best-effort send; a failure is announced to the frontends only
    async fn forward(&self, port: u16, command: &ModCommand) {
        if let Err(e) = self.registry.send(port, command).await {
            warn!("Failed to send {} to mod on port {}: {}", command.kind(), port, e);
            self.hub
                .broadcast(&RelayEvent::server(format!("failed_to_send_to_mod: {}", e)))
                .await;
        }
    }
}
