use thiserror::Error;

use crate::cache::CacheError;
use crate::pipeline::merger::MergeError;
use crate::pipeline::pool::PoolError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Every chunk of a request failed, so there is nothing to merge.
    #[error("Aggregation failed: {failed} of {total} chunks failed (last error: {last_error})")]
    AggregateFailed {
        failed: usize,
        total: usize,
        last_error: String,
    },
}

impl Error {
    /// Create a validation error
    pub fn validation<E: std::fmt::Display>(msg: E) -> Self {
        Self::Validation(msg.to_string())
    }

    /// Create a configuration error
    pub fn config<E: std::fmt::Display>(msg: E) -> Self {
        Self::Config(msg.to_string())
    }

    /// Whether the caller supplied bad input, as opposed to a pipeline failure
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
