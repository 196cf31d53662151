//! Registry error types

use super::entry::DeviceId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No device with this ID
    DeviceNotFound(DeviceId),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DeviceNotFound(id) => write!(f, "Device not found: {}", id),
        }
    }
}

impl std::error::Error for RegistryError {}
