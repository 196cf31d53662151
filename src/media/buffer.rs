//! Bounded accumulator for one device stream
//!
//! Owned by a single ingest read loop. Reads are appended at the tail and
//! frames are split off the head, so the unread remainder is never copied
//! back to the front on every read. A [`FrameCursor`] carries the marker
//! search across reads, so a large frame is scanned once rather than once
//! per read.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::jpeg::FrameCursor;

/// Default hard cap (1 MiB)
pub const DEFAULT_MAX_BUFFER: usize = 1024 * 1024;

/// Byte accumulator with a hard size cap
#[derive(Debug)]
pub struct FrameBuffer {
    /// Pending bytes not yet part of an emitted frame
    buf: BytesMut,
    /// Marker search progress within `buf`
    cursor: FrameCursor,
    /// Hard cap in bytes
    max_size: usize,
    /// Number of times the cap was exceeded and the buffer dropped
    overflows: u64,
}

impl FrameBuffer {
    /// Create a buffer with the default 1 MiB cap
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_BUFFER)
    }

    /// Create a buffer with a custom cap
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(64 * 1024),
            cursor: FrameCursor::default(),
            max_size,
            overflows: 0,
        }
    }

    /// Append freshly read bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Read once from `reader` straight into the tail
    ///
    /// Reserves at least `chunk` bytes first. Returns the number of bytes
    /// read; 0 means end of stream.
    pub async fn read_from<R>(&mut self, reader: &mut R, chunk: usize) -> std::io::Result<usize>
    where
        R: AsyncRead + Unpin,
    {
        self.buf.reserve(chunk.max(1));
        reader.read_buf(&mut self.buf).await
    }

    /// Extract every complete frame, then enforce the cap
    ///
    /// If the leftover tail is still larger than the cap it is discarded.
    /// Returns the frames and whether the tail was dropped.
    pub fn drain_frames(&mut self) -> (Vec<Bytes>, bool) {
        let frames = self.cursor.extract(&mut self.buf);

        let overflowed = self.buf.len() > self.max_size;
        if overflowed {
            self.buf.clear();
            self.cursor.reset();
            self.overflows += 1;
        }

        (frames, overflowed)
    }

    /// Number of pending bytes
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if there are no pending bytes
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Hard cap in bytes
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// How many times the buffer was reset for exceeding the cap
    pub fn overflows(&self) -> u64 {
        self.overflows
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
