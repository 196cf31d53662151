//! JPEG frame extraction from an unframed byte stream
//!
//! Devices push back-to-back JPEG images with no container or length prefix.
//! The only structure is the image itself:
//!
//! ```text
//!   ... noise ... FF D8 <entropy-coded data> FF D9 ... FF D8 ... FF D9 ...
//!                 └──── SOI            EOI ────┘
//! ```
//!
//! A frame is the span from an SOI marker through the first EOI marker that
//! follows it. Anything before the SOI is dropped together with the frame.

use bytes::{Buf, Bytes, BytesMut};

/// Start-of-image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End-of-image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Find the first occurrence of a two-byte marker at or after `from`
fn find_marker(data: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    if from >= data.len() {
        return None;
    }
    data[from..]
        .windows(2)
        .position(|w| w == marker)
        .map(|pos| pos + from)
}

/// Resumable frame search over a buffer that only grows at the tail
///
/// Remembers where the pending SOI sits and how far the buffer has already
/// been searched, so each new read only scans the bytes it added (plus one,
/// for a marker split across reads). Offsets are relative to the buffer
/// head: reset the cursor whenever bytes are removed from the front.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCursor {
    start: Option<usize>,
    resume_at: usize,
}

impl FrameCursor {
    /// Offset the next marker search starts from
    pub fn resume_at(&self) -> usize {
        self.resume_at
    }

    /// Forget all progress
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Locate the next complete frame in `data`
    ///
    /// Returns `(start, end)` where `data[start..end]` is the frame, `end`
    /// being one past the EOI marker.
    pub fn frame_bounds(&mut self, data: &[u8]) -> Option<(usize, usize)> {
        let start = match self.start {
            Some(start) => start,
            None => match find_marker(data, SOI, self.resume_at) {
                Some(start) => {
                    self.start = Some(start);
                    self.resume_at = start + SOI.len();
                    start
                }
                None => {
                    self.resume_at = data.len().saturating_sub(1);
                    return None;
                }
            },
        };

        match find_marker(data, EOI, self.resume_at) {
            Some(eoi) => Some((start, eoi + EOI.len())),
            None => {
                self.resume_at = data.len().saturating_sub(1).max(start + SOI.len());
                None
            }
        }
    }

    /// Split the next complete frame off the front of `buf`
    pub fn next_frame(&mut self, buf: &mut BytesMut) -> Option<Bytes> {
        let (start, end) = self.frame_bounds(buf)?;
        let mut frame = buf.split_to(end);
        frame.advance(start);
        self.reset();
        Some(frame.freeze())
    }

    /// Drain every complete frame from `buf`, in stream order
    pub fn extract(&mut self, buf: &mut BytesMut) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame(buf) {
            frames.push(frame);
        }
        frames
    }
}

/// Locate the next complete frame in `data`
///
/// Returns `(start, end)` where `data[start..end]` is the frame, `end` being
/// one past the EOI marker. The EOI search starts after the SOI marker.
pub fn frame_bounds(data: &[u8]) -> Option<(usize, usize)> {
    FrameCursor::default().frame_bounds(data)
}

/// Split the next complete frame off the front of `buf`
///
/// Bytes preceding the frame are discarded. If no complete frame is present
/// the buffer is left untouched.
pub fn next_frame(buf: &mut BytesMut) -> Option<Bytes> {
    FrameCursor::default().next_frame(buf)
}

/// Drain every complete frame from `buf`, in stream order
///
/// Whatever is left in `buf` afterwards is the incomplete tail.
pub fn extract(buf: &mut BytesMut) -> Vec<Bytes> {
    FrameCursor::default().extract(buf)
}
