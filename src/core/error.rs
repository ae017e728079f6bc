//! Error types for scheduler operations.

use thiserror::Error;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A pool with this key is already registered.
    #[error("pool already registered: {0}")]
    DuplicatePool(String),
    /// No pool is registered under this key.
    #[error("unknown pool: {0}")]
    UnknownPool(String),
    /// The pool exists but stores a different item type.
    #[error("pool `{key}` does not hold items of type {expected}")]
    PoolTypeMismatch {
        /// Pool key that was looked up.
        key: String,
        /// Type name the caller asked for.
        expected: &'static str,
    },
    /// A trigger with this id is already bound.
    #[error("trigger already bound: {0}")]
    DuplicateTrigger(String),
    /// A pool factory failed to produce an instance.
    #[error("factory failed for pool `{key}`: {reason}")]
    Factory {
        /// Pool key whose factory failed.
        key: String,
        /// Rendered factory error.
        reason: String,
    },
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
