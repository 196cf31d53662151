//! Crate-wide error types
//!
//! Each component has its own error enum; [`Error`] wraps them for callers
//! that cross component boundaries (the relay facade, the server, the binary).

use std::fmt;

use crate::hub::CodecError;
use crate::registry::RegistryError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Socket or listener I/O failure
    Io(std::io::Error),
    /// HTTP client construction failure
    Http(reqwest::Error),
    /// Invalid scan range or network configuration
    Config(ConfigError),
    /// Device registry operation failed
    Registry(RegistryError),
    /// Message could not be encoded or decoded
    Codec(CodecError),
    /// WebSocket handshake or transport failure
    WebSocket(tokio_tungstenite::tungstenite::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Http(e) => write!(f, "HTTP client error: {}", e),
            Error::Config(e) => write!(f, "Invalid configuration: {}", e),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
            Error::Codec(e) => write!(f, "Codec error: {}", e),
            Error::WebSocket(e) => write!(f, "WebSocket error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Http(e) => Some(e),
            Error::Config(e) => Some(e),
            Error::Registry(e) => Some(e),
            Error::Codec(e) => Some(e),
            Error::WebSocket(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Error::Codec(e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(e)
    }
}

/// Rejected scan-range or network configuration
///
/// Raised before any probing starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Base address is not three dot-separated octets (e.g. "192.168.31")
    InvalidBaseAddress(String),
    /// Host suffix outside 0..=255
    SuffixOutOfRange(u32),
    /// Start suffix greater than end suffix
    EmptyRange {
        /// Requested start suffix
        start: u32,
        /// Requested end suffix
        end: u32,
    },
    /// Batch size of zero
    ZeroBatchSize,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidBaseAddress(base) => {
                write!(f, "base address must look like \"192.168.31\", got {:?}", base)
            }
            ConfigError::SuffixOutOfRange(suffix) => {
                write!(f, "host suffix {} is outside 0-255", suffix)
            }
            ConfigError::EmptyRange { start, end } => {
                write!(f, "start suffix {} is greater than end suffix {}", start, end)
            }
            ConfigError::ZeroBatchSize => write!(f, "batch size must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::EmptyRange { start: 9, end: 3 };
        assert_eq!(err.to_string(), "start suffix 9 is greater than end suffix 3");

        let err = ConfigError::InvalidBaseAddress("10.0".into());
        assert!(err.to_string().contains("\"10.0\""));
    }

    #[test]
    fn test_error_from_config() {
        let err: Error = ConfigError::ZeroBatchSize.into();
        assert!(matches!(err, Error::Config(ConfigError::ZeroBatchSize)));
        assert_eq!(
            err.to_string(),
            "Invalid configuration: batch size must be at least 1"
        );
    }
}
