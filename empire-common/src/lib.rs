//! # Empire Common Library
//!
//! Shared code for the Empire engine services including:
//! - Error types
//! - TOML configuration loading
//! - Event types (SyncEvent) and the EventBus
//! - The deferred dispatch core (ReadyGate, RetryQueue, DeferredService)

pub mod config;
pub mod deferred;
pub mod error;
pub mod events;

pub use deferred::{DeferredService, Processor, ReadyGate, RetryQueue, WorkItem};
pub use error::{Error, Result};
