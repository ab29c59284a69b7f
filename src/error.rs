//! Error types for thingstore

use std::fmt;

/// Result type alias for datastore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for datastore operations
#[derive(Debug)]
pub enum Error {
    /// Invalid caller input (empty scope/id, pagination over the result window)
    Validation(String),
    /// The datastore feature flag is off
    Disabled,
    /// Permission check denied the operation
    Unauthorized(String),
    /// Index schema or field mapping could not be built or pushed
    Schema(String),
    /// A metric value could not be converted to its declared kind
    Convert { kind: &'static str, value: String },
    /// Search backend failure (network, rejected request)
    Client(String),
    /// Serialization errors
    Serialization(String),
    /// Configuration errors
    Config(String),
    /// Internal error
    Internal(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(msg) => write!(f, "Validation error: {}", msg),
            Error::Disabled => write!(f, "Datastore is disabled by configuration"),
            Error::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            Error::Schema(msg) => write!(f, "Schema error: {}", msg),
            Error::Convert { kind, value } => {
                write!(f, "Cannot convert value '{}' to metric kind {}", value, kind)
            }
            Error::Client(msg) => write!(f, "Search client error: {}", msg),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
