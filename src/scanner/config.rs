//! Scanner configuration

use std::time::Duration;

use crate::error::ConfigError;
use crate::ingest::DEFAULT_STREAM_PORT;

use super::range::ScanRange;

/// Default HTTP probe port
pub const DEFAULT_PROBE_PORT: u16 = 9801;

/// Default HTTP probe path
pub const DEFAULT_PROBE_PATH: &str = "/getscreensize";

/// Network discovery options
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Three-octet network prefix, e.g. "192.168.31"
    pub base_ip: String,

    /// First host suffix (inclusive)
    pub start: u32,

    /// Last host suffix (inclusive)
    pub end: u32,

    /// Addresses probed concurrently per batch
    pub batch_size: usize,

    /// Port of the HTTP probe endpoint
    pub probe_port: u16,

    /// Path of the HTTP probe endpoint
    pub probe_path: String,

    /// Port of the raw JPEG stream
    pub stream_port: u16,

    /// TCP connect limit for a probe
    pub probe_connect_timeout: Duration,

    /// Overall limit for a probe
    pub probe_timeout: Duration,

    /// Pause between batches of a full scan
    pub batch_pause: Duration,

    /// Start an ingestor for every device that answers
    pub auto_capture: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            base_ip: "192.168.31".to_string(),
            start: 0,
            end: 255,
            batch_size: 10,
            probe_port: DEFAULT_PROBE_PORT,
            probe_path: DEFAULT_PROBE_PATH.to_string(),
            stream_port: DEFAULT_STREAM_PORT,
            probe_connect_timeout: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(2),
            batch_pause: Duration::from_millis(100),
            auto_capture: true,
        }
    }
}

impl ScanConfig {
    /// Set the scanned network
    pub fn network(mut self, base_ip: impl Into<String>, start: u32, end: u32) -> Self {
        self.base_ip = base_ip.into();
        self.start = start;
        self.end = end;
        self
    }

    /// Set batch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set probe port
    pub fn probe_port(mut self, port: u16) -> Self {
        self.probe_port = port;
        self
    }

    /// Set probe path
    pub fn probe_path(mut self, path: impl Into<String>) -> Self {
        self.probe_path = path.into();
        self
    }

    /// Set stream port
    pub fn stream_port(mut self, port: u16) -> Self {
        self.stream_port = port;
        self
    }

    /// Set probe timeouts
    pub fn probe_timeouts(mut self, connect: Duration, overall: Duration) -> Self {
        self.probe_connect_timeout = connect;
        self.probe_timeout = overall;
        self
    }

    /// Set pause between batches
    pub fn batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    /// Enable or disable automatic stream capture
    pub fn auto_capture(mut self, enabled: bool) -> Self {
        self.auto_capture = enabled;
        self
    }

    /// Configured range, validated
    pub fn range(&self) -> Result<ScanRange, ConfigError> {
        ScanRange::new(&self.base_ip, self.start, self.end)
    }

    /// Check range and batch size
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        self.range().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScanConfig::default();

        assert_eq!(config.base_ip, "192.168.31");
        assert_eq!((config.start, config.end), (0, 255));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.probe_port, 9801);
        assert_eq!(config.probe_path, "/getscreensize");
        assert_eq!(config.stream_port, 9802);
        assert_eq!(config.probe_timeout, Duration::from_secs(2));
        assert_eq!(config.batch_pause, Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert_eq!(
            ScanConfig::default().batch_size(0).validate(),
            Err(ConfigError::ZeroBatchSize)
        );
        assert_eq!(
            ScanConfig::default().network("10.0.0", 20, 10).validate(),
            Err(ConfigError::EmptyRange { start: 20, end: 10 })
        );
    }
}
