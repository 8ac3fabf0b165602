//! Error types for the analytics cache

use std::fmt;
use thiserror::Error;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Error, Debug)]
pub enum CacheError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Cache backend could not be opened or reached
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Stored entry is malformed
    #[error("Corrupt entry {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl CacheError {
    pub fn serialization<E: fmt::Display>(err: E) -> Self {
        Self::Serialization(err.to_string())
    }

    pub fn unavailable<E: fmt::Display>(msg: E) -> Self {
        Self::Unavailable(msg.to_string())
    }

    pub fn corrupt<K: fmt::Display, E: fmt::Display>(key: K, reason: E) -> Self {
        Self::Corrupt {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err)
    }
}
