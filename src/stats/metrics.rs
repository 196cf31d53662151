//! Statistics for ingest sessions and the relay as a whole

use std::time::{Duration, Instant};

use serde::Serialize;

/// Per-ingestor statistics
#[derive(Debug, Clone)]
pub struct IngestStats {
    /// When the stream reached `Streaming`
    pub started_at: Instant,
    /// Total bytes read from the device
    pub bytes_received: u64,
    /// Complete frames extracted
    pub frames: u64,
    /// Frames that reached no subscriber
    pub undelivered_frames: u64,
    /// Times the accumulator exceeded its cap and was reset
    pub buffer_overflows: u64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            bytes_received: 0,
            frames: 0,
            undelivered_frames: 0,
            buffer_overflows: 0,
        }
    }

    /// Get duration since the stream started
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Calculate bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration().as_secs();
        if secs > 0 {
            (self.bytes_received * 8) / secs
        } else {
            0
        }
    }

    /// Calculate frames per second
    pub fn framerate(&self) -> f64 {
        let secs = self.duration().as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }
}

impl Default for IngestStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Relay-wide snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    /// Devices in the registry
    pub device_count: usize,
    /// Ingestors currently running
    pub active_connections: usize,
    /// Subscribers attached to the hub
    pub active_sessions: usize,
    /// Snapshot time, epoch millis
    pub timestamp: u64,
}
