//! empire-sync library - Offline sync engine
//!
//! Queues sync items while the upstream is unreachable and replays them in
//! submission order when connectivity returns.

use empire_common::DeferredService;
use std::sync::Arc;

pub mod api;
pub mod error;
pub mod probe;
pub mod processor;

pub use api::build_router;
use processor::SyncProcessor;

/// The offline sync engine: JSON payloads over the deferred dispatch core
pub type SyncService = DeferredService<serde_json::Value, SyncProcessor>;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SyncService>,
    /// Server port (reported by /health)
    pub port: u16,
}

impl AppState {
    pub fn new(service: Arc<SyncService>, port: u16) -> Self {
        Self { service, port }
    }
}
