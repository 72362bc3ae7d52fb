//! Unified error handling for the map-clusters library.
//!
//! Bad records are never errors: they are filtered out by the validator.
//! This type covers contract violations only (malformed argument lists,
//! invalid configuration, unknown window names).

use std::fmt;

/// Unified error type for map-clusters operations.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum ClusterError {
    /// The caller passed something that is not a record list at all
    InvalidInput { message: String },
    /// Configuration error
    ConfigError { message: String },
    /// JSON encoding/decoding failed
    Serialization { message: String },
    /// Requested a time window that does not exist
    UnknownWindow { name: String },
}

impl fmt::Display for ClusterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterError::InvalidInput { message } => {
                write!(f, "Invalid input: {}", message)
            }
            ClusterError::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            ClusterError::Serialization { message } => {
                write!(f, "Serialization error: {}", message)
            }
            ClusterError::UnknownWindow { name } => {
                write!(
                    f,
                    "Unknown time window '{}' (expected all, locations, now, today or weekend)",
                    name
                )
            }
        }
    }
}

impl std::error::Error for ClusterError {}

impl From<serde_json::Error> for ClusterError {
    fn from(err: serde_json::Error) -> Self {
        ClusterError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type alias for map-clusters operations.
pub type Result<T> = std::result::Result<T, ClusterError>;
