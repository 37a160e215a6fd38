//! Persisted relay configuration
//!
//! The gateway keeps a single `config.json` holding the auth token that every
//! mod command carries and the base URL of the LM inference service. The file
//! is generated on first run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use crate::error::Error;
use crate::Result;

/// Default LM Studio URL, used when no config file exists yet
pub const DEFAULT_LM_URL: &str = "http://127.0.0.1:1234";

/// On-disk configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    pub auth_token: String,
    #[serde(default = "default_lm_url")]
    pub lm_url: String,
}

fn default_lm_url() -> String {
    DEFAULT_LM_URL.to_string()
}

impl RelayConfig {
    /// Fresh config with a random auth token
    pub fn generate() -> Self {
        Self {
            auth_token: Uuid::new_v4().to_string(),
            lm_url: default_lm_url(),
        }
    }
}

/// Read-only view of the relay configuration for one session
#[derive(Debug, Clone)]
pub struct ConfigProvider {
    config: RelayConfig,
    file_path: Option<PathBuf>,
}

impl ConfigProvider {
    /// Load the config at `file_path`, creating it when missing
    pub async fn load_or_create(file_path: impl Into<PathBuf>) -> Result<Self> {
        let file_path = file_path.into();

        let config = if file_path.exists() {
            let content = tokio::fs::read_to_string(&file_path).await.map_err(|e| {
                Error::Storage(format!("Failed to read config file: {}", e))
            })?;
            let config: RelayConfig = serde_json::from_str(&content)?;
            if config.auth_token.trim().is_empty() {
                return Err(Error::InvalidConfig("auth_token is empty".into()));
            }
            config
        } else {
            let config = RelayConfig::generate();
            write_config(&file_path, &config).await?;
            info!("Generated new relay config at {:?}", file_path);
            config
        };

        Ok(Self {
            config,
            file_path: Some(file_path),
        })
    }

    /// Provider backed by an in-memory config only
    pub fn in_memory(config: RelayConfig) -> Self {
        Self {
            config,
            file_path: None,
        }
    }

    /// Override the LM URL for this session without touching the file
    pub fn with_lm_url(mut self, lm_url: impl Into<String>) -> Self {
        self.config.lm_url = lm_url.into();
        self
    }

    pub fn auth_token(&self) -> &str {
        &self.config.auth_token
    }

    pub fn lm_url(&self) -> &str {
        self.config.lm_url.trim_end_matches('/')
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }
}

async fn write_config(file_path: &Path, config: &RelayConfig) -> Result<()> {
    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let content = serde_json::to_string_pretty(config)?;
    tokio::fs::write(file_path, content)
        .await
        .map_err(|e| Error::Storage(format!("Failed to write config file: {}", e)))
}
