//! Gateway module for mod, frontend and LM communication
//!
//! This module owns every live connection of a relay session: probe sockets
//! used by discovery, mod control sockets, frontend sockets and the LM stream.

pub mod hub;
pub mod lm;
pub mod process;
pub mod registry;
pub mod relay;
pub mod scanner;

pub use hub::FrontendHub;
pub use lm::LmClient;
pub use process::{McProcess, ProcessInspector, SysinfoInspector};
#[cfg(test)]
pub use process::StaticInspector;
pub use registry::{ModConnection, ModRegistry};
pub use relay::{PromptRelay, PromptSummary, PromptTurn, ScreenshotStatus};
pub use scanner::{ModInstance, PortScanner, ProbeOutcome};

/// Client-side WebSocket stream used for mod and LM connections
pub type ModStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;
