//! Device record and state types
//!
//! This module defines the per-device state stored in the registry.

use std::fmt;
use std::net::SocketAddr;

use serde::Serialize;

use crate::ingest::IngestHandle;

/// Registry-assigned device identifier (always positive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DeviceId(u32);

impl DeviceId {
    /// Wrap a raw ID
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw numeric value
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not streaming
    Offline,
    /// Ingest started, TCP connect in flight
    Connecting,
    /// Probe answered or stream running
    Online,
}

impl ConnectionState {
    /// Whether the device counts as connected
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Online
    }

    /// Lowercase wire name
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Offline => "offline",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Online => "online",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Screen resolution reported by a device probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A discovered device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    /// Stable ID, unique among live records
    pub id: DeviceId,
    /// Stream endpoint (device IP + stream port)
    pub addr: SocketAddr,
    /// Current connection state
    pub state: ConnectionState,
    /// Last probe answer or frame, epoch millis
    pub last_seen: u64,
    /// Human-readable name derived from the probe
    pub display_name: Option<String>,
    /// Screen resolution, if the probe body parsed
    pub resolution: Option<Resolution>,
}

impl DeviceRecord {
    pub(super) fn new(id: DeviceId, addr: SocketAddr, now: u64) -> Self {
        Self {
            id,
            addr,
            state: ConnectionState::Offline,
            last_seen: now,
            display_name: None,
            resolution: None,
        }
    }
}

/// JSON view of a device, as sent to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceView {
    pub id: DeviceId,
    pub ip: String,
    pub port: u16,
    pub status: ConnectionState,
    pub connected: bool,
    pub last_update: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_height: Option<u32>,
}

impl From<&DeviceRecord> for DeviceView {
    fn from(record: &DeviceRecord) -> Self {
        Self {
            id: record.id,
            ip: record.addr.ip().to_string(),
            port: record.addr.port(),
            status: record.state,
            connected: record.state.is_connected(),
            last_update: record.last_seen,
            device_name: record.display_name.clone(),
            screen_width: record.resolution.map(|r| r.width),
            screen_height: record.resolution.map(|r| r.height),
        }
    }
}

/// Registry slot: the record plus its running ingestor, if any
pub(super) struct DeviceEntry {
    pub record: DeviceRecord,
    pub ingest: Option<IngestHandle>,
}

impl DeviceEntry {
    pub fn new(record: DeviceRecord) -> Self {
        Self {
            record,
            ingest: None,
        }
    }

    /// Whether an ingestor for this device is still running
    pub fn ingest_running(&self) -> bool {
        self.ingest.as_ref().is_some_and(|h| h.is_running())
    }

    /// Check a write against the current ingest session
    pub fn owns_session(&self, session: u64) -> bool {
        self.ingest.as_ref().is_some_and(|h| h.session() == session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_view_json() {
        let mut record = DeviceRecord::new(DeviceId::new(3), "192.168.31.2:9802".parse().unwrap(), 1000);
        record.state = ConnectionState::Online;
        record.display_name = Some("Device 1920 1080".into());
        record.resolution = Some(Resolution::new(1920, 1080));

        let json = serde_json::to_value(DeviceView::from(&record)).unwrap();

        assert_eq!(json["id"], 3);
        assert_eq!(json["ip"], "192.168.31.2");
        assert_eq!(json["port"], 9802);
        assert_eq!(json["status"], "online");
        assert_eq!(json["connected"], true);
        assert_eq!(json["lastUpdate"], 1000);
        assert_eq!(json["deviceName"], "Device 1920 1080");
        assert_eq!(json["screenWidth"], 1920);
        assert_eq!(json["screenHeight"], 1080);
    }

    #[test]
    fn test_device_view_omits_unknown_metadata() {
        let record = DeviceRecord::new(DeviceId::new(1), "10.0.0.5:9802".parse().unwrap(), 0);
        let json = serde_json::to_value(DeviceView::from(&record)).unwrap();

        assert_eq!(json["status"], "offline");
        assert_eq!(json["connected"], false);
        assert!(json.get("screenWidth").is_none());
        assert!(json.get("deviceName").is_none());
    }

    #[test]
    fn test_connection_state() {
        assert!(ConnectionState::Online.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(Resolution::new(720, 1280).to_string(), "720x1280");
    }
}
