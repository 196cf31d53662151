//! Device registry
//!
//! The registry is the single source of truth for discovered devices. Every
//! record carries a stable ID, its stream address and a connection state;
//! each slot may also own the handle of that device's running ingestor.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<DeviceRegistry>
//!                     ┌──────────────────────────────┐
//!                     │ RwLock<DeviceTable {         │
//!                     │   devices: BTreeMap<Id,      │
//!                     │     DeviceEntry {            │
//!                     │       record,                │
//!                     │       ingest: IngestHandle,  │
//!                     │     }>,                      │
//!                     │   by_addr, ids,              │
//!                     │ }>                           │
//!                     └──────────────┬───────────────┘
//!                                    │
//!         ┌──────────────────────────┼──────────────────────────┐
//!         │                          │                          │
//!         ▼                          ▼                          ▼
//!    [Scanner]                 [Ingestor]                  [Relay]
//!    upsert_probed()           set_state() / touch()       remove()
//!    ensure_ingest()           finish_ingest()             list()
//!                                    │
//!                                    └──► hub.publish_device_status()
//! ```
//!
//! # Ingest Sessions
//!
//! Each ingestor run gets a session number from the registry. State writes
//! carry that number and are dropped unless it matches the handle currently
//! stored for the device, so an ingestor outliving its record can never
//! touch a newer device that reused the ID.

pub mod config;
pub mod entry;
pub mod error;
pub mod ids;
pub mod store;

pub use config::{RegistryConfig, DEFAULT_ID_SEARCH_WINDOW};
pub use entry::{ConnectionState, DeviceId, DeviceRecord, DeviceView, Resolution};
pub use error::RegistryError;
pub use ids::IdAllocator;
pub use store::DeviceRegistry;
