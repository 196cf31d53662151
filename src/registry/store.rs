//! Device registry implementation
//!
//! The single source of truth for which devices exist and how they are
//! connected. The scanner creates and refreshes records, each device's
//! ingestor owns its connection-state writes, and removal tears the
//! ingestor down.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::hub::BroadcastHub;
use crate::ingest::{IngestHandle, IngestTicket};
use crate::stats::unix_millis;

use super::config::RegistryConfig;
use super::entry::{ConnectionState, DeviceEntry, DeviceId, DeviceRecord, Resolution};
use super::error::RegistryError;
use super::ids::IdAllocator;

/// Lock-protected registry state
///
/// The address index and the ID allocator live under the same lock as the
/// records, so lookup-or-allocate is a single critical section.
struct DeviceTable {
    devices: BTreeMap<DeviceId, DeviceEntry>,
    by_addr: HashMap<SocketAddr, DeviceId>,
    ids: IdAllocator,
}

impl DeviceTable {
    /// Entry for an address, allocating one if the address is new
    fn entry_for(&mut self, addr: SocketAddr) -> (&mut DeviceEntry, bool) {
        let (id, created) = match self.by_addr.get(&addr) {
            Some(id) => (*id, false),
            None => {
                let devices = &self.devices;
                let id = self.ids.allocate(|id| devices.contains_key(&id));
                self.by_addr.insert(addr, id);
                (id, true)
            }
        };

        let entry = self
            .devices
            .entry(id)
            .or_insert_with(|| DeviceEntry::new(DeviceRecord::new(id, addr, unix_millis())));
        (entry, created)
    }
}

/// Central registry for all known devices
///
/// Thread-safe via a `std::sync::RwLock`; the lock is never held across an
/// await point, so it is safe to use from async tasks.
pub struct DeviceRegistry {
    /// Records, address index and ID allocator
    table: RwLock<DeviceTable>,

    /// Receives device status and device list events
    hub: Arc<BroadcastHub>,

    /// Next ingest session number
    next_session: AtomicU64,

    /// Configuration
    config: RegistryConfig,
}

impl DeviceRegistry {
    /// Create a registry with default configuration
    pub fn new(hub: Arc<BroadcastHub>) -> Self {
        Self::with_config(RegistryConfig::default(), hub)
    }

    /// Create a registry with custom configuration
    pub fn with_config(config: RegistryConfig, hub: Arc<BroadcastHub>) -> Self {
        Self {
            table: RwLock::new(DeviceTable {
                devices: BTreeMap::new(),
                by_addr: HashMap::new(),
                ids: IdAllocator::new(config.id_search_window),
            }),
            hub,
            next_session: AtomicU64::new(1),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Hub that receives this registry's events
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    fn read(&self) -> RwLockReadGuard<'_, DeviceTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DeviceTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve or allocate the ID for an address
    ///
    /// Idempotent: the same address keeps its ID for as long as its record
    /// exists. New records start Offline.
    pub fn register(&self, addr: SocketAddr) -> DeviceId {
        let (id, created) = {
            let mut table = self.write();
            let (entry, created) = table.entry_for(addr);
            (entry.record.id, created)
        };

        if created {
            tracing::info!(device_id = %id, addr = %addr, "Device registered");
        }
        id
    }

    /// Register (if needed) and mark a device as answering its probe
    ///
    /// Metadata is only overwritten by values the probe actually provided.
    pub fn upsert_probed(
        &self,
        addr: SocketAddr,
        display_name: Option<String>,
        resolution: Option<Resolution>,
    ) -> DeviceRecord {
        let (record, created, previous) = {
            let mut table = self.write();
            let (entry, created) = table.entry_for(addr);
            let previous = entry.record.state;

            entry.record.state = ConnectionState::Online;
            entry.record.last_seen = unix_millis();
            if display_name.is_some() {
                entry.record.display_name = display_name;
            }
            if resolution.is_some() {
                entry.record.resolution = resolution;
            }
            (entry.record.clone(), created, previous)
        };

        tracing::info!(
            device_id = %record.id,
            addr = %addr,
            new = created,
            resolution = ?record.resolution,
            "Device online"
        );

        if previous != ConnectionState::Online {
            self.hub.publish_device_status(record.id, ConnectionState::Online);
        }
        record
    }

    /// Get a device by ID
    pub fn get(&self, id: DeviceId) -> Option<DeviceRecord> {
        self.read().devices.get(&id).map(|e| e.record.clone())
    }

    /// Find the device registered for an address
    pub fn find_by_addr(&self, addr: &SocketAddr) -> Option<DeviceId> {
        self.read().by_addr.get(addr).copied()
    }

    /// All devices, ordered by ID
    pub fn list(&self) -> Vec<DeviceRecord> {
        self.read()
            .devices
            .values()
            .map(|e| e.record.clone())
            .collect()
    }

    /// Number of devices
    pub fn len(&self) -> usize {
        self.read().devices.len()
    }

    /// Check if the registry has no devices
    pub fn is_empty(&self) -> bool {
        self.read().devices.is_empty()
    }

    /// Remove a device
    ///
    /// Stops its ingestor and publishes the remaining device list. The ID
    /// becomes available for reuse.
    pub fn remove(&self, id: DeviceId) -> Result<DeviceRecord, RegistryError> {
        let (mut entry, remaining) = {
            let mut table = self.write();
            let entry = table
                .devices
                .remove(&id)
                .ok_or(RegistryError::DeviceNotFound(id))?;
            table.by_addr.remove(&entry.record.addr);

            let remaining: Vec<DeviceRecord> =
                table.devices.values().map(|e| e.record.clone()).collect();
            (entry, remaining)
        };

        let stopped = entry.ingest.as_mut().is_some_and(|h| h.stop());

        tracing::info!(
            device_id = %id,
            addr = %entry.record.addr,
            ingest_stopped = stopped,
            "Device removed"
        );

        self.hub.publish_device_list(&remaining);
        Ok(entry.record)
    }

    /// Start an ingestor for a device unless one is already running
    ///
    /// `spawn` is called under the registry lock with a fresh ticket and must
    /// only start the task, not wait on it. Returns `Ok(true)` if a new
    /// ingestor was started.
    pub fn ensure_ingest<F>(&self, id: DeviceId, spawn: F) -> Result<bool, RegistryError>
    where
        F: FnOnce(IngestTicket) -> IngestHandle,
    {
        let mut table = self.write();
        let entry = table
            .devices
            .get_mut(&id)
            .ok_or(RegistryError::DeviceNotFound(id))?;

        if entry.ingest_running() {
            tracing::debug!(device_id = %id, "Ingest already running");
            return Ok(false);
        }

        let ticket = IngestTicket {
            device_id: id,
            addr: entry.record.addr,
            session: self.next_session.fetch_add(1, Ordering::Relaxed),
        };
        entry.ingest = Some(spawn(ticket));

        tracing::debug!(device_id = %id, session = ticket.session, "Ingest started");
        Ok(true)
    }

    /// Update a device's connection state on behalf of an ingest session
    ///
    /// Ignored (returns false) if the device is gone or the session is no
    /// longer the device's current ingestor. A change is published to the hub.
    pub fn set_state(&self, id: DeviceId, session: u64, state: ConnectionState) -> bool {
        let changed = {
            let mut table = self.write();
            let Some(entry) = table.devices.get_mut(&id) else {
                return false;
            };
            if !entry.owns_session(session) {
                tracing::debug!(
                    device_id = %id,
                    session = session,
                    "Ignoring state write from stale ingest session"
                );
                return false;
            }

            let changed = entry.record.state != state;
            entry.record.state = state;
            if state == ConnectionState::Online {
                entry.record.last_seen = unix_millis();
            }
            changed
        };

        if changed {
            self.hub.publish_device_status(id, state);
        }
        true
    }

    /// Refresh `last_seen` on behalf of an ingest session
    pub fn touch(&self, id: DeviceId, session: u64) -> bool {
        let mut table = self.write();
        match table.devices.get_mut(&id) {
            Some(entry) if entry.owns_session(session) => {
                entry.record.last_seen = unix_millis();
                true
            }
            _ => false,
        }
    }

    /// Mark an ingest session as finished: device goes Offline and the slot
    /// is freed for the next ingestor
    ///
    /// Both happen under one write lock, so a scan that sees the device
    /// Offline can always start a fresh ingestor.
    pub fn finish_ingest(&self, id: DeviceId, session: u64) {
        let (changed, handle) = {
            let mut table = self.write();
            let Some(entry) = table
                .devices
                .get_mut(&id)
                .filter(|e| e.owns_session(session))
            else {
                tracing::debug!(
                    device_id = %id,
                    session = session,
                    "Ignoring finish from stale ingest session"
                );
                return;
            };

            let changed = entry.record.state != ConnectionState::Offline;
            entry.record.state = ConnectionState::Offline;
            (changed, entry.ingest.take())
        };

        // Dropped outside the lock; its task is the caller
        drop(handle);

        if changed {
            self.hub.publish_device_status(id, ConnectionState::Offline);
        }
    }

    /// Number of running ingestors
    pub fn active_ingests(&self) -> usize {
        self.read()
            .devices
            .values()
            .filter(|e| e.ingest_running())
            .count()
    }

    /// Stop every ingestor
    ///
    /// Records stay in place. Every device that had an ingestor is marked
    /// Offline here, since the stopped sessions no longer own their slots.
    /// Returns the number of ingestors signalled.
    pub fn shutdown(&self) -> usize {
        let (handles, went_offline) = {
            let mut table = self.write();
            let mut handles = Vec::new();
            let mut went_offline = Vec::new();
            for entry in table.devices.values_mut() {
                let Some(handle) = entry.ingest.take() else {
                    continue;
                };
                if entry.record.state != ConnectionState::Offline {
                    entry.record.state = ConnectionState::Offline;
                    went_offline.push(entry.record.id);
                }
                handles.push(handle);
            }
            (handles, went_offline)
        };

        let mut stopped = 0;
        for mut handle in handles {
            if handle.stop() {
                stopped += 1;
            }
        }

        for id in went_offline {
            self.hub.publish_device_status(id, ConnectionState::Offline);
        }

        tracing::info!(stopped = stopped, "Registry shut down");
        stopped
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.len())
            .field("config", &self.config)
            .finish()
    }
}
