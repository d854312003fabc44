//! Common error types for Empire services

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Common result type for Empire operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across Empire services
#[derive(Error, Debug)]
pub enum Error {
    /// Retry queue is at its configured capacity
    #[error("Queue full: capacity {capacity} reached")]
    QueueFull { capacity: usize },

    /// Processor failed for a work item
    #[error("Dispatch of item {id} failed: {reason}")]
    Dispatch { id: Uuid, reason: String },

    /// Processor did not finish within the configured timeout
    #[error("Processing of item {id} timed out after {timeout:?}")]
    ProcessingTimeout { id: Uuid, timeout: Duration },

    /// Retry budget exhausted; item moved to the dead-letter box
    #[error("Item {id} dead-lettered after {attempts} attempts")]
    DeadLetter { id: Uuid, attempts: u32 },

    /// Service used before `initialize()` succeeded
    #[error("Service not initialized")]
    NotInitialized,

    /// Processor setup failed during `initialize()`
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
