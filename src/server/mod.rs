//! WebSocket transport for subscribers
//!
//! ```text
//!   client ──GET /ws/screen──► RelayServer ──spawn──► session::serve
//!                                                       │
//!                       hub.subscribe(ChannelSink) ◄────┤
//!                                                       │
//!   client ◄──text frames── outbound.recv() ◄── hub ────┤
//!   client ──ping / request_device_list──► relay.handle_client_message()
//! ```
//!
//! Any other path is refused with 404 during the upgrade.

pub mod config;
pub mod listener;
mod session;

pub use config::{ServerConfig, DEFAULT_ENDPOINT};
pub use listener::RelayServer;
