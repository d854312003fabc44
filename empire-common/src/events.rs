//! Event types for the Empire event system
//!
//! Provides the SyncEvent enum and the EventBus used by deferred services to
//! report readiness changes and the lifecycle of each work item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Deferred dispatch events
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// Readiness flipped (not-ready ↔ ready)
    ReadinessChanged {
        ready: bool,
        timestamp: DateTime<Utc>,
    },

    /// Item stored for later dispatch
    ItemQueued {
        item_id: Uuid,
        /// Queue length after the enqueue
        pending: usize,
        timestamp: DateTime<Utc>,
    },

    /// Processor finished an item successfully
    ItemDispatched {
        item_id: Uuid,
        /// Total attempts including this one
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// Dispatch failed during a drain; item goes back to the tail
    ItemRetryScheduled {
        item_id: Uuid,
        attempts: u32,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Retry budget exhausted
    ItemDeadLettered {
        item_id: Uuid,
        attempts: u32,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Queued item removed by the caller before dispatch
    ItemCancelled {
        item_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Drain episode started
    DrainStarted {
        batch_size: usize,
        timestamp: DateTime<Utc>,
    },

    /// Drain episode finished
    DrainCompleted {
        dispatched: usize,
        retried: usize,
        dead_lettered: usize,
        timestamp: DateTime<Utc>,
    },
}

impl SyncEvent {
    /// Event type name, as used for the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::ReadinessChanged { .. } => "ReadinessChanged",
            SyncEvent::ItemQueued { .. } => "ItemQueued",
            SyncEvent::ItemDispatched { .. } => "ItemDispatched",
            SyncEvent::ItemRetryScheduled { .. } => "ItemRetryScheduled",
            SyncEvent::ItemDeadLettered { .. } => "ItemDeadLettered",
            SyncEvent::ItemCancelled { .. } => "ItemCancelled",
            SyncEvent::DrainStarted { .. } => "DrainStarted",
            SyncEvent::DrainCompleted { .. } => "DrainCompleted",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use empire_common::events::{EventBus, SyncEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(SyncEvent::ReadinessChanged {
///     ready: true,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert_eq!(rx.try_recv().unwrap().event_type(), "ReadinessChanged");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SyncEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<SyncEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
