//! Relay facade
//!
//! Owns the hub, the device registry and the scanner, and exposes the
//! discovery and device APIs used by the binary and the WebSocket server.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::error::Result;
use crate::hub::{decode, BroadcastHub, ClientMessage, ServerMessage, SessionId};
use crate::ingest::{IngestConfig, IngestLauncher};
use crate::registry::{DeviceId, DeviceRecord, DeviceRegistry, RegistryConfig};
use crate::scanner::{HttpProber, NetworkScanner, Prober, ScanConfig};
use crate::stats::{unix_millis, RelayStatus};

/// Configuration for every relay component
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    pub scan: ScanConfig,
    pub ingest: IngestConfig,
    pub registry: RegistryConfig,
}

impl RelayConfig {
    /// Set scan configuration
    pub fn scan(mut self, config: ScanConfig) -> Self {
        self.scan = config;
        self
    }

    /// Set ingest configuration
    pub fn ingest(mut self, config: IngestConfig) -> Self {
        self.ingest = config;
        self
    }

    /// Set registry configuration
    pub fn registry(mut self, config: RegistryConfig) -> Self {
        self.registry = config;
        self
    }
}

/// Discovery, ingestion and fan-out for one LAN
pub struct Relay<P: Prober = HttpProber> {
    hub: Arc<BroadcastHub>,
    registry: Arc<DeviceRegistry>,
    scanner: NetworkScanner<P>,
}

impl Relay<HttpProber> {
    /// Create a relay that probes devices over HTTP
    pub fn new(config: RelayConfig) -> Result<Self> {
        let prober = HttpProber::new(&config.scan)?;
        Ok(Self::with_prober(config, prober))
    }
}

impl<P: Prober> Relay<P> {
    /// Create a relay with a custom prober
    pub fn with_prober(config: RelayConfig, prober: P) -> Self {
        let hub = Arc::new(BroadcastHub::new());
        let registry = Arc::new(DeviceRegistry::with_config(config.registry, hub.clone()));
        let launcher = IngestLauncher::new(registry.clone(), config.ingest);
        let scanner = NetworkScanner::new(config.scan, prober, registry.clone(), launcher);

        Self {
            hub,
            registry,
            scanner,
        }
    }

    /// Subscriber hub
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Device registry
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Network scanner
    pub fn scanner(&self) -> &NetworkScanner<P> {
        &self.scanner
    }

    /// Scan the configured network
    ///
    /// Returns the devices found by this scan and publishes the full device
    /// list to subscribers.
    pub async fn scan_network(&self) -> Result<Vec<DeviceRecord>> {
        let found = self.scanner.scan().await?;
        self.hub.publish_device_list(&self.registry.list());
        Ok(found)
    }

    /// Scan an explicit range as a single batch
    pub async fn scan_range(&self, base_ip: &str, start: u32, end: u32) -> Result<Vec<DeviceRecord>> {
        let found = self.scanner.scan_range(base_ip, start, end).await?;
        self.hub.publish_device_list(&self.registry.list());
        Ok(found)
    }

    /// All known devices, ordered by ID
    pub fn devices(&self) -> Vec<DeviceRecord> {
        self.registry.list()
    }

    /// One device by ID
    pub fn device(&self, id: DeviceId) -> Option<DeviceRecord> {
        self.registry.get(id)
    }

    /// Remove a device and stop its stream
    pub fn remove_device(&self, id: DeviceId) -> Result<DeviceRecord> {
        Ok(self.registry.remove(id)?)
    }

    /// Change the network used by later full scans
    pub fn update_network(&self, base_ip: &str, start: u32, end: u32) -> Result<()> {
        Ok(self.scanner.update_network(base_ip, start, end)?)
    }

    /// Relay-wide counters
    pub fn status(&self) -> RelayStatus {
        RelayStatus {
            device_count: self.registry.len(),
            active_connections: self.registry.active_ingests(),
            active_sessions: self.hub.subscriber_count(),
            timestamp: unix_millis(),
        }
    }

    /// React to a text message from a subscriber
    ///
    /// Malformed or unknown messages are logged and ignored.
    pub fn handle_client_message(&self, session_id: SessionId, text: &str) {
        let message = match decode(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(session_id = session_id, error = %e, "Ignoring client message");
                return;
            }
        };

        let reply = match message {
            ClientMessage::Ping => ServerMessage::pong(),
            ClientMessage::RequestDeviceList => ServerMessage::device_list(&self.registry.list()),
        };

        if !self.hub.send_to(session_id, &reply) {
            tracing::debug!(session_id = session_id, reply = reply.kind(), "Reply not delivered");
        }
    }

    /// Stop every ingestor and close every subscriber
    pub fn shutdown(&self) {
        let stopped = self.registry.shutdown();
        self.hub.close_all();
        tracing::info!(ingestors = stopped, "Relay shut down");
    }

    /// Run one full scan in the background
    ///
    /// Lets the caller start serving subscribers while a wide range is still
    /// being probed; they get the device list when the scan completes.
    pub fn spawn_scan_task(self: &Arc<Self>) -> JoinHandle<()> {
        let relay = Arc::clone(self);

        tokio::spawn(async move {
            match relay.scan_network().await {
                Ok(found) => tracing::info!(found = found.len(), "Initial scan complete"),
                Err(e) => tracing::warn!(error = %e, "Initial scan failed"),
            }
        })
    }

    /// Spawn a background task running a full scan every `interval`
    ///
    /// The first scan runs one interval after spawning. Returns a handle that
    /// can be used to abort the task.
    pub fn spawn_rescan_task(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let relay = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match relay.scan_network().await {
                    Ok(found) => tracing::debug!(found = found.len(), "Periodic scan complete"),
                    Err(e) => tracing::warn!(error = %e, "Periodic scan failed"),
                }
            }
        })
    }
}

impl<P: Prober> std::fmt::Debug for Relay<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("registry", &self.registry)
            .field("hub", &self.hub)
            .finish()
    }
}
