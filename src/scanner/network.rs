//! Batched network discovery

use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};

use crate::error::ConfigError;
use crate::ingest::IngestLauncher;
use crate::registry::{DeviceRecord, DeviceRegistry};

use super::config::ScanConfig;
use super::probe::{HttpProber, ProbeError, ProbeReport, Prober};
use super::range::ScanRange;

/// Probes address ranges and admits answering devices into the registry
pub struct NetworkScanner<P: Prober = HttpProber> {
    prober: Arc<P>,
    registry: Arc<DeviceRegistry>,
    launcher: IngestLauncher,
    config: RwLock<ScanConfig>,
}

impl<P: Prober> NetworkScanner<P> {
    pub fn new(
        config: ScanConfig,
        prober: P,
        registry: Arc<DeviceRegistry>,
        launcher: IngestLauncher,
    ) -> Self {
        Self {
            prober: Arc::new(prober),
            registry,
            launcher,
            config: RwLock::new(config),
        }
    }

    pub fn prober(&self) -> &P {
        &self.prober
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> ScanConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the range used by later full scans
    pub fn update_network(&self, base_ip: &str, start: u32, end: u32) -> Result<(), ConfigError> {
        let range = ScanRange::new(base_ip, start, end)?;

        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        config.base_ip = range.base();
        config.start = start;
        config.end = end;

        tracing::info!(range = %range, "Scan network updated");
        Ok(())
    }

    /// Full scan of the configured range, batch by batch
    ///
    /// Returns the devices that answered, in ascending address order.
    pub async fn scan(&self) -> Result<Vec<DeviceRecord>, ConfigError> {
        let config = self.config();
        config.validate()?;
        let range = config.range()?;

        tracing::info!(range = %range, batch_size = config.batch_size, "Starting network scan");

        let batches = range.batches(config.batch_size);
        let last = batches.len().saturating_sub(1);
        let mut found = Vec::new();

        for (i, batch) in batches.iter().enumerate() {
            found.extend(self.scan_batch(batch, &config).await);

            if i < last && !config.batch_pause.is_zero() {
                sleep(config.batch_pause).await;
            }
        }

        tracing::info!(range = %range, found = found.len(), "Network scan complete");
        Ok(found)
    }

    /// Probe an explicit range as a single batch
    pub async fn scan_range(
        &self,
        base_ip: &str,
        start: u32,
        end: u32,
    ) -> Result<Vec<DeviceRecord>, ConfigError> {
        let range = ScanRange::new(base_ip, start, end)?;
        let config = self.config();

        let found = self.scan_batch(&range, &config).await;
        tracing::info!(range = %range, found = found.len(), "Range scan complete");
        Ok(found)
    }

    /// Probe every address of `range` concurrently
    ///
    /// Completes once every probe has answered, failed, or hit its timeout.
    async fn scan_batch(&self, range: &ScanRange, config: &ScanConfig) -> Vec<DeviceRecord> {
        tracing::debug!(batch = %range, "Scanning batch");

        let mut probes = JoinSet::new();
        for ip in range.addresses() {
            let prober = self.prober.clone();
            let limit = config.probe_timeout;
            probes.spawn(async move {
                let result = match timeout(limit, prober.probe(ip)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProbeError::Timeout),
                };
                (ip, result)
            });
        }

        let mut answered: Vec<ProbeReport> = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((_, Ok(report))) => answered.push(report),
                Ok((ip, Err(e))) => {
                    tracing::debug!(ip = %ip, error = %e, "Probe failed");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Probe task failed");
                }
            }
        }

        answered.sort_by_key(|report| report.ip);
        answered
            .into_iter()
            .map(|report| self.admit(report, config))
            .collect()
    }

    fn admit(&self, report: ProbeReport, config: &ScanConfig) -> DeviceRecord {
        let addr = SocketAddr::from((report.ip, config.stream_port));
        let record = self
            .registry
            .upsert_probed(addr, report.display_name(), report.resolution);

        if config.auto_capture {
            if let Err(e) = self.launcher.launch(record.id) {
                tracing::warn!(device_id = %record.id, error = %e, "Failed to start capture");
            }
        }
        record
    }
}

impl<P: Prober> std::fmt::Debug for NetworkScanner<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkScanner")
            .field("config", &self.config())
            .finish()
    }
}
