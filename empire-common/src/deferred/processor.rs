//! Injected per-item work function

use std::future::Future;

/// Performs the externally visible effect for one payload
///
/// Implementations may suspend (network calls, database writes); the
/// deferred service never holds its own locks while a call is in flight.
pub trait Processor<T>: Send + Sync + 'static {
    /// One-time setup, run by `DeferredService::initialize`
    fn initialize(&self) -> impl Future<Output = anyhow::Result<()>> + Send {
        async { Ok(()) }
    }

    /// Process a single payload; an `Err` counts as a failed attempt
    fn process(&self, payload: &T) -> impl Future<Output = anyhow::Result<()>> + Send;
}
