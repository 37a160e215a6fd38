//! Core library for the mod relay gateway
//!
//! This crate contains the pieces shared by every part of the gateway:
//! - Persisted relay configuration (auth token, LM base URL)
//! - Relay events broadcast to frontends
//! - Commands sent to mod endpoints

pub mod command;
pub mod config;
pub mod error;
pub mod event;

pub use command::{ModCommand, PromptMode};
pub use config::{ConfigProvider, RelayConfig, DEFAULT_LM_URL};
pub use error::Error;
pub use event::{LmEvent, RelayEvent, ServerEvent};

pub type Result<T> = std::result::Result<T, Error>;
