//! Subscriber wire messages
//!
//! Everything the hub sends is one of the [`ServerMessage`] variants, encoded
//! as a JSON text frame with a `type` tag and a protocol version:
//!
//! ```text
//! {"v":1,"type":"frame","deviceId":3,"image":"data:image/jpeg;base64,...","timestamp":...}
//! {"v":1,"type":"device_status","deviceId":3,"status":"online","connected":true,"timestamp":...}
//! {"v":1,"type":"device_list","devices":[...],"timestamp":...}
//! ```
//!
//! Clients may send `{"type":"ping"}` and `{"type":"request_device_list"}`.

use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use crate::registry::{ConnectionState, DeviceId, DeviceRecord, DeviceView};
use crate::stats::unix_millis;

/// Version stamped into every outgoing message
pub const PROTOCOL_VERSION: u8 = 1;

/// Prefix that turns base64 JPEG data into a browser-ready data URL
pub const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// An encoded message, shared by every subscriber it is delivered to
pub type EncodedMessage = Arc<str>;

/// Messages sent from the relay to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once, right after a subscriber attaches
    Welcome { message: String, timestamp: u64 },

    /// One JPEG frame from a device
    #[serde(rename_all = "camelCase")]
    Frame {
        device_id: DeviceId,
        /// `data:image/jpeg;base64,...`
        image: String,
        timestamp: u64,
    },

    /// A device changed connection state
    #[serde(rename_all = "camelCase")]
    DeviceStatus {
        device_id: DeviceId,
        status: ConnectionState,
        connected: bool,
        timestamp: u64,
    },

    /// Snapshot of a set of devices
    DeviceList {
        devices: Vec<DeviceView>,
        timestamp: u64,
    },

    /// Reply to a client ping
    Pong { timestamp: u64 },
}

impl ServerMessage {
    /// Greeting for a new subscriber
    pub fn welcome() -> Self {
        ServerMessage::Welcome {
            message: "connected".into(),
            timestamp: unix_millis(),
        }
    }

    /// Frame event; the JPEG bytes are base64-encoded into a data URL
    pub fn frame(device_id: DeviceId, jpeg: &[u8]) -> Self {
        let mut image = String::with_capacity(JPEG_DATA_URL_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
        image.push_str(JPEG_DATA_URL_PREFIX);
        BASE64.encode_string(jpeg, &mut image);

        ServerMessage::Frame {
            device_id,
            image,
            timestamp: unix_millis(),
        }
    }

    /// Connection state change for one device
    pub fn device_status(device_id: DeviceId, status: ConnectionState) -> Self {
        ServerMessage::DeviceStatus {
            device_id,
            status,
            connected: status.is_connected(),
            timestamp: unix_millis(),
        }
    }

    /// Device list snapshot
    pub fn device_list(devices: &[DeviceRecord]) -> Self {
        ServerMessage::DeviceList {
            devices: devices.iter().map(DeviceView::from).collect(),
            timestamp: unix_millis(),
        }
    }

    /// Heartbeat reply
    pub fn pong() -> Self {
        ServerMessage::Pong {
            timestamp: unix_millis(),
        }
    }

    /// Wire name of this message type
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Welcome { .. } => "welcome",
            ServerMessage::Frame { .. } => "frame",
            ServerMessage::DeviceStatus { .. } => "device_status",
            ServerMessage::DeviceList { .. } => "device_list",
            ServerMessage::Pong { .. } => "pong",
        }
    }
}

/// Messages sent from subscribers to the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Heartbeat
    Ping,
    /// Ask for the full device list
    RequestDeviceList,
}

#[derive(Serialize)]
struct Envelope<'a> {
    v: u8,
    #[serde(flatten)]
    message: &'a ServerMessage,
}

/// Encode a server message as versioned JSON text
pub fn encode(message: &ServerMessage) -> Result<EncodedMessage, CodecError> {
    let envelope = Envelope {
        v: PROTOCOL_VERSION,
        message,
    };
    serde_json::to_string(&envelope)
        .map(Arc::from)
        .map_err(CodecError::Encode)
}

/// Decode a client text frame
pub fn decode(text: &str) -> Result<ClientMessage, CodecError> {
    serde_json::from_str(text).map_err(CodecError::Decode)
}

/// Message encoding/decoding failure
#[derive(Debug)]
pub enum CodecError {
    /// Outgoing message could not be serialized
    Encode(serde_json::Error),
    /// Incoming text is not a known client message
    Decode(serde_json::Error),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Encode(e) => write!(f, "failed to encode message: {}", e),
            CodecError::Decode(e) => write!(f, "failed to decode client message: {}", e),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Encode(e) | CodecError::Decode(e) => Some(e),
        }
    }
}
