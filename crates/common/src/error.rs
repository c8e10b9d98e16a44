//! Error types for the common crate
//!
//! This module defines the error taxonomy shared by the model lifecycle manager
//! and the curation engine.

use std::fmt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for Photo Curator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Photo Curator operations
///
/// Payloads are plain strings so the same failure can be handed to every
/// waiter of a shared model load.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Network error while fetching a model artifact
    #[error("Network error: {0}")]
    Network(String),

    /// Storage error (disk full, unreadable cache entry, I/O failure)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Memory error (model does not fit in the resident budget)
    #[error("Memory error: {0}")]
    Memory(String),

    /// Invalid or corrupt model artifact; never retried
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Model runtime failed to initialise an artifact
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Two embeddings of different length were compared
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Length of the left-hand vector
        expected: usize,
        /// Length of the right-hand vector
        actual: usize,
    },

    /// Operation conflicts with another in-flight operation on the same key
    #[error("Concurrent operation: {0}")]
    ConcurrentOperation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid argument error
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => Error::Timeout(err.to_string()),
            std::io::ErrorKind::OutOfMemory => Error::Memory(err.to_string()),
            _ => Error::Storage(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Error classification used by retry policy and user messaging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Connectivity problems
    Network,
    /// Disk problems
    Storage,
    /// Not enough memory
    Memory,
    /// Corrupt, unknown or mismatched model
    InvalidModel,
    /// Runtime initialisation failure
    Initialization,
    /// Operation took too long
    Timeout,
    /// Embedding length mismatch
    DimensionMismatch,
    /// Conflicting in-flight operation
    ConcurrentOperation,
    /// Anything that could not be classified
    Unknown,
}

impl ErrorKind {
    /// Returns true if an operation failing with this kind may succeed on retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network
                | ErrorKind::Storage
                | ErrorKind::Memory
                | ErrorKind::Initialization
                | ErrorKind::Timeout
                | ErrorKind::ConcurrentOperation
                | ErrorKind::Unknown
        )
    }

    /// Classifies free-form error text by keyword
    pub fn from_message(message: &str) -> Self {
        let message = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

        if has(&["timed out", "timeout", "deadline"]) {
            ErrorKind::Timeout
        } else if has(&["network", "connection", "dns", "unreachable", "offline", "http", "fetch"]) {
            ErrorKind::Network
        } else if has(&["out of memory", "memory", "oom", "allocation"]) {
            ErrorKind::Memory
        } else if has(&["no space", "disk", "storage", "quota", "permission denied", "i/o"]) {
            ErrorKind::Storage
        } else if has(&["corrupt", "checksum", "invalid model", "unsupported format", "malformed"]) {
            ErrorKind::InvalidModel
        } else if has(&["initializ", "initialis", "runtime"]) {
            ErrorKind::Initialization
        } else {
            ErrorKind::Unknown
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Network => "network",
            ErrorKind::Storage => "storage",
            ErrorKind::Memory => "memory",
            ErrorKind::InvalidModel => "invalid-model",
            ErrorKind::Initialization => "initialization",
            ErrorKind::Timeout => "timeout",
            ErrorKind::DimensionMismatch => "dimension-mismatch",
            ErrorKind::ConcurrentOperation => "concurrent-operation",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Classifies this error into the fixed taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(_) => ErrorKind::Network,
            Error::Storage(_) => ErrorKind::Storage,
            Error::Memory(_) => ErrorKind::Memory,
            Error::InvalidModel(_) | Error::NotFound(_) => ErrorKind::InvalidModel,
            Error::Initialization(_) => ErrorKind::Initialization,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Error::ConcurrentOperation(_) => ErrorKind::ConcurrentOperation,
            Error::Serialization(_) => ErrorKind::InvalidModel,
            Error::Config(msg) | Error::InvalidArgument(msg) | Error::Internal(msg) => {
                ErrorKind::from_message(msg)
            }
        }
    }

    /// Returns true if the error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Returns true if the error is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}
