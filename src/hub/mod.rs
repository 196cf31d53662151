//! Broadcast hub for live subscribers
//!
//! The hub fans frames and device events out to every attached subscriber.
//!
//! # Architecture
//!
//! ```text
//!   StreamIngestor ──publish_frame──┐
//!   DeviceRegistry ──device_status──┤
//!   Relay ──────────device_list─────┤
//!                                   ▼
//!                       BroadcastHub { DashMap<SessionId, Weak<dyn Subscriber>> }
//!                                   │  encode once, try_deliver to each
//!               ┌───────────────────┼───────────────────┐
//!               ▼                   ▼                   ▼
//!          ChannelSink         ChannelSink         ChannelSink
//!               │                   │                   │
//!          WebSocket           WebSocket           WebSocket
//! ```
//!
//! Delivery is at-most-once and live-only: a sink that cannot take a message
//! right away is dropped, and late joiners get no replay.

pub mod broadcast;
pub mod message;
pub mod subscriber;

pub use broadcast::BroadcastHub;
pub use message::{decode, encode, ClientMessage, CodecError, EncodedMessage, ServerMessage};
pub use subscriber::{ChannelSink, DeliveryError, SessionId, Subscriber};
