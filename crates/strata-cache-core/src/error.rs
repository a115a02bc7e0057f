//! Error types for cache strategy operations

use thiserror::Error;

/// Main error type for all cache strategy operations
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// The cache store rejected or failed an operation
    #[error("store error: {0}")]
    Store(String),

    /// The system of record failed an operation
    #[error("system of record error: {0}")]
    Source(String),

    /// A key pattern could not be compiled
    #[error("invalid key pattern: {0}")]
    InvalidPattern(String),

    /// Every retry attempt failed
    #[error("operation failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// The strategy has been shut down
    #[error("strategy is shut down")]
    ShutDown,

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),

    /// Timeout
    #[error("operation timed out")]
    Timeout,
}

impl CacheError {
    /// Shorthand for a store failure
    pub fn store(message: impl Into<String>) -> Self {
        CacheError::Store(message.into())
    }

    /// Shorthand for a system-of-record failure
    pub fn source(message: impl Into<String>) -> Self {
        CacheError::Source(message.into())
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
