//! Media handling for device streams
//!
//! This module provides:
//! - JPEG SOI/EOI frame boundary extraction
//! - A bounded per-stream byte accumulator

pub mod buffer;
pub mod jpeg;

pub use buffer::{FrameBuffer, DEFAULT_MAX_BUFFER};
pub use jpeg::{extract, next_frame, FrameCursor, EOI, SOI};
