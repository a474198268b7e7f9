//! Shared, read-only context handed to every accumulator.

use crate::core::config::Config;
use crate::export::ClientManager;
use crate::metadata::{AppMetadata, PlaceholderMetadata};
use std::sync::Arc;

/// Configuration, app metadata and the exporter, shared by reference.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub metadata: Arc<dyn AppMetadata>,
    pub exporter: Arc<ClientManager>,
}

impl AppContext {
    pub fn new(config: Config, metadata: Arc<dyn AppMetadata>, exporter: Arc<ClientManager>) -> Self {
        Self {
            config: Arc::new(config),
            metadata,
            exporter,
        }
    }

    /// Context with placeholder metadata.
    pub fn with_exporter(config: Config, exporter: Arc<ClientManager>) -> Self {
        Self::new(config, Arc::new(PlaceholderMetadata), exporter)
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
