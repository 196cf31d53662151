//! Per-device stream ingestion
//!
//! One ingestor owns one outbound TCP connection to a device's stream port.
//! It reads into a [`FrameBuffer`], publishes each complete JPEG frame to the
//! hub and reports the device's connection state to the registry.
//!
//! ```text
//! Connecting ──connect ok──► Streaming ──eof / error / idle / stop──► Closed
//!      │                                                               ▲
//!      └────────────────connect failed / timeout / stop────────────────┘
//! ```
//!
//! `Closed` is terminal. A later discovery scan starts a fresh ingestor.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;

use crate::media::FrameBuffer;
use crate::registry::{ConnectionState, DeviceId, DeviceRegistry};
use crate::stats::IngestStats;

use super::config::IngestConfig;
use super::handle::{IngestHandle, IngestTicket};

/// Ingestor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Connecting,
    Streaming,
    Closed,
}

/// Why an ingestor reached `Closed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// TCP connect was refused or failed
    ConnectFailed(String),
    /// TCP connect did not complete in time
    ConnectTimeout,
    /// Device closed the stream
    Eof,
    /// Socket read failed
    ReadError(String),
    /// No bytes within the idle timeout
    IdleTimeout,
    /// Stop signal, handle dropped, or device removed
    Stopped,
}

impl CloseReason {
    /// Whether the stream broke rather than being stopped on our side
    pub fn is_failure(&self) -> bool {
        !matches!(self, CloseReason::Stopped)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::ConnectFailed(e) => write!(f, "connect failed: {}", e),
            CloseReason::ConnectTimeout => write!(f, "connect timed out"),
            CloseReason::Eof => write!(f, "stream closed by device"),
            CloseReason::ReadError(e) => write!(f, "read error: {}", e),
            CloseReason::IdleTimeout => write!(f, "no data within idle timeout"),
            CloseReason::Stopped => write!(f, "stopped"),
        }
    }
}

/// Summary returned when an ingestor terminates
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub device_id: DeviceId,
    pub session: u64,
    pub reason: CloseReason,
    pub frames: u64,
    pub undelivered_frames: u64,
    pub bytes_received: u64,
    pub buffer_overflows: u64,
}

/// Stream reader for a single device
pub struct StreamIngestor {
    ticket: IngestTicket,
    registry: Arc<DeviceRegistry>,
    config: IngestConfig,
    buffer: FrameBuffer,
    state: IngestState,
    stats: IngestStats,
}

impl StreamIngestor {
    /// Create an ingestor for a ticket issued by the registry
    pub fn new(ticket: IngestTicket, registry: Arc<DeviceRegistry>, config: IngestConfig) -> Self {
        Self {
            ticket,
            registry,
            buffer: FrameBuffer::with_max_size(config.max_buffer_size),
            config,
            state: IngestState::Connecting,
            stats: IngestStats::new(),
        }
    }

    /// Spawn the ingestor on the runtime and return its handle
    pub fn spawn(
        ticket: IngestTicket,
        registry: Arc<DeviceRegistry>,
        config: IngestConfig,
    ) -> IngestHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let ingestor = Self::new(ticket, registry, config);
        let task = tokio::spawn(ingestor.run(stop_rx));

        IngestHandle::new(ticket.session, stop_tx, task)
    }

    /// Current lifecycle state
    pub fn state(&self) -> IngestState {
        self.state
    }

    /// Run until the stream closes or `stop` fires
    ///
    /// A dropped stop sender counts as a stop.
    pub async fn run(mut self, mut stop: oneshot::Receiver<()>) -> IngestReport {
        let IngestTicket {
            device_id,
            addr,
            session,
        } = self.ticket;

        tracing::debug!(device_id = %device_id, addr = %addr, session = session, "Connecting to device stream");
        self.registry
            .set_state(device_id, session, ConnectionState::Connecting);

        let reason = match self.connect(&mut stop).await {
            Ok(stream) => {
                self.state = IngestState::Streaming;
                self.stats = IngestStats::new();
                self.registry
                    .set_state(device_id, session, ConnectionState::Online);

                tracing::info!(device_id = %device_id, addr = %addr, "Device stream connected");
                self.stream_frames(stream, &mut stop).await
            }
            Err(reason) => reason,
        };

        self.close(reason)
    }

    async fn connect(&self, stop: &mut oneshot::Receiver<()>) -> Result<TcpStream, CloseReason> {
        let connect = timeout(self.config.connect_timeout, TcpStream::connect(self.ticket.addr));

        let stream = tokio::select! {
            _ = stop => return Err(CloseReason::Stopped),
            result = connect => match result {
                Err(_) => return Err(CloseReason::ConnectTimeout),
                Ok(Err(e)) => return Err(CloseReason::ConnectFailed(e.to_string())),
                Ok(Ok(stream)) => stream,
            },
        };

        if self.config.tcp_nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(device_id = %self.ticket.device_id, error = %e, "Failed to set TCP_NODELAY");
            }
        }
        Ok(stream)
    }

    /// Read loop: accumulate, extract, forward
    pub(crate) async fn stream_frames<S>(
        &mut self,
        mut stream: S,
        stop: &mut oneshot::Receiver<()>,
    ) -> CloseReason
    where
        S: AsyncRead + Unpin,
    {
        let chunk = self.config.read_chunk_size;

        loop {
            let read = tokio::select! {
                _ = &mut *stop => return CloseReason::Stopped,
                read = timeout(self.config.idle_timeout, self.buffer.read_from(&mut stream, chunk)) => read,
            };

            let n = match read {
                Err(_) => return CloseReason::IdleTimeout,
                Ok(Err(e)) => return CloseReason::ReadError(e.to_string()),
                Ok(Ok(0)) => return CloseReason::Eof,
                Ok(Ok(n)) => n,
            };
            self.stats.bytes_received += n as u64;

            let (frames, overflowed) = self.buffer.drain_frames();
            if overflowed {
                self.stats.buffer_overflows += 1;
                tracing::warn!(
                    device_id = %self.ticket.device_id,
                    max_size = self.buffer.max_size(),
                    "Frame buffer exceeded cap, dropping pending bytes"
                );
            }

            if !frames.is_empty() {
                for frame in frames {
                    self.forward(frame);
                }
                self.registry.touch(self.ticket.device_id, self.ticket.session);
            }
        }
    }

    fn forward(&mut self, frame: Bytes) {
        self.stats.frames += 1;

        let delivered = self
            .registry
            .hub()
            .publish_frame(self.ticket.device_id, &frame);
        if delivered == 0 {
            self.stats.undelivered_frames += 1;
        }

        if self.stats.frames % 100 == 0 {
            tracing::debug!(
                device_id = %self.ticket.device_id,
                frames = self.stats.frames,
                fps = self.stats.framerate(),
                bitrate = self.stats.bitrate(),
                "Ingest progress"
            );
        }
    }

    fn close(mut self, reason: CloseReason) -> IngestReport {
        self.state = IngestState::Closed;
        self.registry
            .finish_ingest(self.ticket.device_id, self.ticket.session);

        let report = IngestReport {
            device_id: self.ticket.device_id,
            session: self.ticket.session,
            reason,
            frames: self.stats.frames,
            undelivered_frames: self.stats.undelivered_frames,
            bytes_received: self.stats.bytes_received,
            buffer_overflows: self.stats.buffer_overflows,
        };

        if report.reason.is_failure() {
            tracing::warn!(
                device_id = %report.device_id,
                addr = %self.ticket.addr,
                reason = %report.reason,
                frames = report.frames,
                "Device stream broken"
            );
        } else {
            tracing::info!(
                device_id = %report.device_id,
                reason = %report.reason,
                frames = report.frames,
                bytes = report.bytes_received,
                overflows = report.buffer_overflows,
                "Device stream closed"
            );
        }
        report
    }
}
