//! Relay session state

use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::info;

use modrelay_core::ConfigProvider;

use crate::config::SessionSettings;
use crate::gateway::{
    FrontendHub, LmClient, ModRegistry, PortScanner, ProcessInspector, PromptRelay,
    SysinfoInspector,
};

/// One operator session: config plus every live connection.
///
/// Cloning is cheap; all clones share the same registries.
#[derive(Clone)]
pub struct RelaySession {
    inner: Arc<RelaySessionInner>,
}

struct RelaySessionInner {
    config: ConfigProvider,
    hub: Arc<FrontendHub>,
    registry: Arc<ModRegistry>,
    scanner: PortScanner,
    relay: PromptRelay,
    processes: Arc<dyn ProcessInspector>,
    port_range: RangeInclusive<u16>,
}

impl RelaySession {
    /// Create a session reading processes from the OS
    pub fn new(config: ConfigProvider, settings: SessionSettings) -> Self {
        Self::with_process_inspector(config, settings, Arc::new(SysinfoInspector))
    }

    pub fn with_process_inspector(
        config: ConfigProvider,
        settings: SessionSettings,
        processes: Arc<dyn ProcessInspector>,
    ) -> Self {
        let token = config.auth_token().to_string();
        let hub = Arc::new(FrontendHub::new());
        let registry = Arc::new(
            ModRegistry::new(settings.mod_host.clone(), token.clone(), Arc::clone(&hub))
                .with_connect_timeout(settings.connect_timeout),
        );
        let scanner = PortScanner::new(settings.mod_host.clone(), token.clone())
            .with_timeout(settings.probe_timeout);
        let relay = PromptRelay::new(
            Arc::clone(&registry),
            Arc::clone(&hub),
            LmClient::new(config.lm_url(), settings.model.clone()),
            token,
        );

        Self {
            inner: Arc::new(RelaySessionInner {
                config,
                hub,
                registry,
                scanner,
                relay,
                processes,
                port_range: settings.port_range,
            }),
        }
    }

    pub fn config(&self) -> &ConfigProvider {
        &self.inner.config
    }

    pub fn hub(&self) -> &Arc<FrontendHub> {
        &self.inner.hub
    }

    pub fn registry(&self) -> &Arc<ModRegistry> {
        &self.inner.registry
    }

    pub fn scanner(&self) -> &PortScanner {
        &self.inner.scanner
    }

    pub fn relay(&self) -> &PromptRelay {
        &self.inner.relay
    }

    pub fn processes(&self) -> Arc<dyn ProcessInspector> {
        Arc::clone(&self.inner.processes)
    }

    pub fn port_range(&self) -> RangeInclusive<u16> {
        self.inner.port_range.clone()
    }

    /// Tear down every mod connection of this session
    pub async fn shutdown(&self) {
        self.inner.registry.shutdown().await;
        info!("Relay session shut down");
    }
}
