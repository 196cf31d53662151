//! LAN screen-stream relay
//!
//! Discovers devices that push a raw JPEG byte stream over TCP, pulls each
//! stream, cuts it into frames and fans the frames out to live subscribers.
//!
//! # Architecture
//!
//! ```text
//!   NetworkScanner ──probe──► device :9801/getscreensize
//!         │
//!         ▼ upsert
//!   DeviceRegistry ──ensure_ingest──► StreamIngestor ──TCP──► device :9802
//!         │                                │
//!         │ device_status                  │ FrameBuffer + jpeg::next_frame
//!         ▼                                ▼
//!   BroadcastHub ◄───────────────── publish_frame
//!         │
//!         ├──► subscriber (WebSocket session)
//!         └──► subscriber ...
//! ```
//!
//! The [`Relay`] owns all of the above; [`RelayServer`] exposes the hub to
//! WebSocket clients.

pub mod error;
pub mod hub;
pub mod ingest;
pub mod media;
pub mod registry;
pub mod relay;
pub mod scanner;
pub mod server;
pub mod stats;

pub use error::{ConfigError, Error, Result};
pub use hub::BroadcastHub;
pub use registry::{ConnectionState, DeviceId, DeviceRecord, DeviceRegistry};
pub use relay::{Relay, RelayConfig};
pub use scanner::{HttpProber, NetworkScanner, ScanConfig};
pub use server::{RelayServer, ServerConfig};
