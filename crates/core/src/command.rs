//! Commands sent from the gateway to mod endpoints

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Forwarding policy for one prompt turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    /// A single goal command, dispatched once after streaming
    #[default]
    High,
    /// Action commands forwarded as they appear in the model stream
    Low,
}

impl fmt::Display for PromptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Outbound mod command. Every variant carries the session auth token.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModCommand {
    Handshake {
        auth: String,
    },
    Screenshot {
        #[serde(skip_serializing_if = "Option::is_none")]
        fps: Option<u32>,
        auth: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        stop: bool,
    },
    Action {
        /// Model-supplied `type`, written over the default tag on the wire
        #[serde(skip)]
        kind: Option<Value>,
        #[serde(flatten)]
        fields: Map<String, Value>,
        auth: String,
    },
    Goal {
        goal: String,
        auth: String,
    },
    Stop {
        auth: String,
    },
}

impl ModCommand {
    pub fn handshake(auth: &str) -> Self {
        Self::Handshake {
            auth: auth.to_string(),
        }
    }

    pub fn screenshot_start(fps: u32, auth: &str) -> Self {
        Self::Screenshot {
            fps: Some(fps),
            auth: auth.to_string(),
            stop: false,
        }
    }

    pub fn screenshot_stop(auth: &str) -> Self {
        Self::Screenshot {
            fps: None,
            auth: auth.to_string(),
            stop: true,
        }
    }

    /// Action command built from a model-produced object.
    ///
    /// The object's fields are forwarded verbatim, `type` included when the
    /// model sets one. `auth` always carries the session token.
    pub fn action(mut fields: Map<String, Value>, auth: &str) -> Self {
        let kind = fields.remove("type");
        fields.remove("auth");
        Self::Action {
            kind,
            fields,
            auth: auth.to_string(),
        }
    }

    /// Action command from an arbitrary value; `None` unless it is an object
    pub fn action_from_value(value: &Value, auth: &str) -> Option<Self> {
        value
            .as_object()
            .map(|fields| Self::action(fields.clone(), auth))
    }

    pub fn goal(goal: impl Into<String>, auth: &str) -> Self {
        Self::Goal {
            goal: goal.into(),
            auth: auth.to_string(),
        }
    }

    pub fn stop(auth: &str) -> Self {
        Self::Stop {
            auth: auth.to_string(),
        }
    }

    /// Wire name of the command (`type` field)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Handshake { .. } => "handshake",
            Self::Screenshot { .. } => "screenshot",
            Self::Action { .. } => "action",
            Self::Goal { .. } => "goal",
            Self::Stop { .. } => "stop",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            Self::Action {
                kind: Some(kind), ..
            } => {
                let mut value = serde_json::to_value(self)?;
                if let Some(object) = value.as_object_mut() {
                    object.insert("type".to_string(), kind.clone());
                }
                serde_json::to_string(&value)
            }
            _ => serde_json::to_string(self),
        }
    }
}
