//! Device stream ingestion
//!
//! Each Online device gets at most one [`StreamIngestor`], started through
//! the registry so the "one ingestor per device" rule is checked under its
//! lock.

pub mod config;
pub mod handle;
pub mod ingestor;

pub use config::{IngestConfig, DEFAULT_STREAM_PORT};
pub use handle::{IngestHandle, IngestTicket};
pub use ingestor::{CloseReason, IngestReport, IngestState, StreamIngestor};

use std::sync::Arc;

use crate::registry::{DeviceId, DeviceRegistry, RegistryError};

/// Starts ingestors for registered devices
#[derive(Debug, Clone)]
pub struct IngestLauncher {
    registry: Arc<DeviceRegistry>,
    config: IngestConfig,
}

impl IngestLauncher {
    pub fn new(registry: Arc<DeviceRegistry>, config: IngestConfig) -> Self {
        Self { registry, config }
    }

    /// Start capturing a device unless an ingestor is already running
    ///
    /// Returns `Ok(true)` if a new ingestor was spawned.
    pub fn launch(&self, id: DeviceId) -> Result<bool, RegistryError> {
        let registry = self.registry.clone();
        let config = self.config.clone();

        self.registry
            .ensure_ingest(id, move |ticket| StreamIngestor::spawn(ticket, registry, config))
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }
}
