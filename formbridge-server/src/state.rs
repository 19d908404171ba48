//! Application state shared across HTTP handlers.

use std::sync::Arc;

use formbridge_core::config::Config;
use formbridge_core::connectors::Connector;
use formbridge_core::ports::{EventBus, SecretStore, SubmissionStore};

/// Shared application state: the resolved config plus the three ports
/// every handler and the orchestrator depend on, all behind trait objects
/// so swapping an adapter never touches call sites.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub secrets: Arc<dyn SecretStore>,
    pub store: Arc<dyn SubmissionStore>,
    pub bus: Arc<dyn EventBus>,
    pub connector: Arc<dyn Connector>,
}

impl AppState {
    pub fn new(
        config: Config,
        secrets: Arc<dyn SecretStore>,
        store: Arc<dyn SubmissionStore>,
        bus: Arc<dyn EventBus>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            secrets,
            store,
            bus,
            connector,
        }
    }

    /// `true` only when both backing ports report ready (spec §4.13 `/ready`).
    pub async fn is_ready(&self) -> bool {
        self.store.is_ready().await && self.bus.is_ready().await
    }
}
