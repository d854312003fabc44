//! Deferred dispatch core
//!
//! The "initialize once, dispatch now or queue, drain on ready" shape shared
//! by the Empire engine services. Each service constructs its own
//! [`DeferredService`] and hands it to its HTTP layer; there are no
//! process-wide instances.

mod dead_letter;
mod processor;
mod ready_gate;
mod retry_queue;
mod service;
mod work_item;

pub use dead_letter::{DeadLetter, DeadLetterBox};
pub use processor::Processor;
pub use ready_gate::{ReadyGate, Transition};
pub use retry_queue::RetryQueue;
pub use service::{DeferredService, DrainReport, QueueStatus, Submitted};
pub use work_item::WorkItem;
