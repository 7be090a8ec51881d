//! Error types for Parlor.
//!
//! The acquisition pipeline never raises these to its consumer: `FileSyncEngine`
//! folds them into a terminal `DownloadProgress::Error`. They surface directly
//! from manifest listing, engine loading, settings I/O and the `Assistant` API.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Parlor library.
#[derive(Debug, Error)]
pub enum ParlorError {
    // Transport errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Incomplete transfer for {path:?}: expected {expected} bytes, wrote {written}")]
    IncompleteTransfer {
        path: PathBuf,
        expected: u64,
        written: u64,
    },

    // Engine errors
    #[error("Failed to load model from {path:?}: {message}")]
    Load { path: PathBuf, message: String },

    #[error("Generation failed: {message}")]
    Generation { message: String },

    #[error("No inference engine is loaded")]
    NoActiveEngine,

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },
}

/// Result type alias for Parlor operations.
pub type Result<T> = std::result::Result<T, ParlorError>;

impl From<std::io::Error> for ParlorError {
    fn from(err: std::io::Error) -> Self {
        ParlorError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for ParlorError {
    fn from(err: serde_json::Error) -> Self {
        ParlorError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for ParlorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ParlorError::Protocol {
                message: err.to_string(),
            }
        } else {
            ParlorError::Network {
                message: err.to_string(),
                cause: err.url().map(|u| u.to_string()),
            }
        }
    }
}

impl ParlorError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ParlorError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }
}

/// A backend failure in the middle of a token stream.
///
/// Returned by the native capability traits. Adapters never propagate it as an
/// error; it is rendered into a visible fragment instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct GenerationFault(pub String);

impl GenerationFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<GenerationFault> for ParlorError {
    fn from(fault: GenerationFault) -> Self {
        ParlorError::Generation { message: fault.0 }
    }
}
