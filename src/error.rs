//! Typed errors for the engine.
//!
//! The processor never lets any of these escape across its own loop
//! boundary (see `processor.rs`); they are converted into a failed-order
//! record instead. `StoreError` is the store adapter's own error surface;
//! `EngineError` wraps it alongside the validation/not-found/internal
//! cases the rest of the crate produces.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("operation failed: {0}")]
    Operation(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<deadpool_redis::PoolError> for StoreError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        StoreError::Connection(e.to_string())
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Operation(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Errors surfaced by the matching core and the processing pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("misrouted order for symbol {0}")]
    Misroute(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// The taxonomy label persisted alongside a failed-order entry.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::Misroute(_) => "misroute",
            EngineError::NotFound(_) => "not_found",
            EngineError::Store(_) => "store_failure",
            EngineError::Internal(_) => "internal",
        }
    }
}
