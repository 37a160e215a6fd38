//! Process-level settings read from the environment

use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use crate::gateway::lm::DEFAULT_MODEL;
use crate::gateway::registry::CONNECT_TIMEOUT;
use crate::gateway::scanner::PROBE_TIMEOUT;

/// Conventional mod port range
pub const DEFAULT_PORT_RANGE: RangeInclusive<u16> = 42060..=42089;

/// Settings of one relay session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Host the mod endpoints listen on
    pub mod_host: String,
    /// Ports probed by `/instances`
    pub port_range: RangeInclusive<u16>,
    /// Model name sent with generation requests
    pub model: String,
    pub probe_timeout: Duration,
    /// Bound on attaching to a mod
    pub connect_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            mod_host: "127.0.0.1".to_string(),
            port_range: DEFAULT_PORT_RANGE,
            model: DEFAULT_MODEL.to_string(),
            probe_timeout: PROBE_TIMEOUT,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
    /// Session override of the persisted LM URL
    pub lm_url: Option<String>,
    pub session: SessionSettings,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let data_dir = std::env::var("MODRELAY_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".modrelay"));

        let bind_addr = match std::env::var("MODRELAY_BIND") {
            Ok(addr) => addr
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid MODRELAY_BIND {:?}: {}", addr, e))?,
            Err(_) => SocketAddr::from(([127, 0, 0, 1], 8000)),
        };

        let mut session = SessionSettings::default();
        if let Ok(host) = std::env::var("MODRELAY_MOD_HOST") {
            session.mod_host = host;
        }
        if let Ok(model) = std::env::var("MODRELAY_MODEL") {
            session.model = model;
        }
        if let Ok(range) = std::env::var("MODRELAY_PORT_RANGE") {
            session.port_range = parse_port_range(&range)?;
        }

        Ok(Self {
            data_dir,
            bind_addr,
            lm_url: std::env::var("MODRELAY_LM_URL").ok(),
            session,
        })
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }
}

/// Parse `lo-hi` (inclusive) or a single port
pub fn parse_port_range(value: &str) -> anyhow::Result<RangeInclusive<u16>> {
    let (lo, hi) = match value.split_once('-') {
        Some((lo, hi)) => (lo.trim(), hi.trim()),
        None => (value.trim(), value.trim()),
    };
    let lo: u16 = lo.parse()?;
    let hi: u16 = hi.parse()?;
    if lo == 0 || lo > hi {
        anyhow::bail!("invalid port range {:?}", value);
    }
    Ok(lo..=hi)
}
