//! Work item envelope

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A payload waiting for (or undergoing) dispatch
#[derive(Debug, Clone, Serialize)]
pub struct WorkItem<T> {
    /// Identity used for cancellation and event correlation
    pub id: Uuid,
    pub payload: T,
    /// When the caller submitted the payload
    pub enqueued_at: DateTime<Utc>,
    /// Dispatch attempts made so far
    pub attempts: u32,
}

impl<T> WorkItem<T> {
    pub fn new(payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            enqueued_at: Utc::now(),
            attempts: 0,
        }
    }
}
