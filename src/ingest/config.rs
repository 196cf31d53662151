//! Ingest configuration

use std::time::Duration;

use crate::media::DEFAULT_MAX_BUFFER;

/// Default device stream port
pub const DEFAULT_STREAM_PORT: u16 = 9802;

/// Per-device stream ingestion options
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// TCP connect must complete within this time
    pub connect_timeout: Duration,

    /// Close the stream if no bytes arrive for this long
    pub idle_timeout: Duration,

    /// Bytes reserved for each socket read
    pub read_chunk_size: usize,

    /// Hard cap of the per-device frame accumulator
    pub max_buffer_size: usize,

    /// Enable TCP_NODELAY on the device socket
    pub tcp_nodelay: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            idle_timeout: Duration::from_secs(30),
            read_chunk_size: 16 * 1024,
            max_buffer_size: DEFAULT_MAX_BUFFER,
            tcp_nodelay: true,
        }
    }
}

impl IngestConfig {
    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set idle read timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the per-read reservation (minimum 1 byte)
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// Set the accumulator cap
    pub fn max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IngestConfig::default();

        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.max_buffer_size, 1024 * 1024);
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_builder_chaining() {
        let config = IngestConfig::default()
            .connect_timeout(Duration::from_millis(500))
            .idle_timeout(Duration::from_secs(5))
            .read_chunk_size(0)
            .max_buffer_size(64);

        assert_eq!(config.connect_timeout, Duration::from_millis(500));
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
        assert_eq!(config.read_chunk_size, 1);
        assert_eq!(config.max_buffer_size, 64);
    }
}
