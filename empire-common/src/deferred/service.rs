//! "Dispatch now or queue for later" service
//!
//! Composes a [`ReadyGate`], a [`RetryQueue`] and a [`DeadLetterBox`] around
//! an injected [`Processor`]:
//!
//! - Ready and idle: `submit` runs the processor immediately and reports
//!   failures to the caller.
//! - Not ready, or a drain is running: `submit` queues the item.
//! - Rising edge: one drain episode dispatches the queue head first, one
//!   item at a time. Failures go back to the tail when the episode ends,
//!   and move to the dead-letter box once `max_attempts` is spent.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{DeadLetter, DeadLetterBox, Processor, ReadyGate, RetryQueue, Transition, WorkItem};
use crate::config::QueueConfig;
use crate::events::{EventBus, SyncEvent};
use crate::{Error, Result};

/// Outcome of a successful `submit`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    /// Processor already ran successfully
    Dispatched(Uuid),
    /// Stored for the next drain
    Queued(Uuid),
}

impl Submitted {
    pub fn id(&self) -> Uuid {
        match self {
            Submitted::Dispatched(id) | Submitted::Queued(id) => *id,
        }
    }
}

/// Counters for one drain episode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub batches: usize,
    pub dispatched: usize,
    pub retried: usize,
    pub dead_lettered: usize,
    /// Items put back at the head because readiness dropped mid-pass
    pub restored: usize,
}

/// Snapshot for status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub is_ready: bool,
    pub initialized: bool,
    pub draining: bool,
    pub pending_items: usize,
    pub dead_letters: usize,
    pub capacity: Option<usize>,
    pub max_attempts: u32,
}

/// Deferred dispatch service over payloads of type `T`
pub struct DeferredService<T, P> {
    processor: P,
    gate: ReadyGate,
    queue: RetryQueue<T>,
    dead_letters: DeadLetterBox<T>,
    events: EventBus,
    max_attempts: u32,
    processing_timeout: Duration,
    initialized: OnceCell<()>,
    /// Serialises drain episodes
    drain_guard: tokio::sync::Mutex<()>,
    /// Set while an episode owns dispatch; guards the submit/drain race
    draining: Mutex<bool>,
}

impl<T, P> DeferredService<T, P>
where
    T: Send + Sync + 'static,
    P: Processor<T>,
{
    /// Create a service that starts not-ready and uninitialized
    pub fn new(processor: P, config: &QueueConfig, events: EventBus) -> Self {
        Self {
            processor,
            gate: ReadyGate::new(false),
            queue: RetryQueue::new(config.capacity),
            dead_letters: DeadLetterBox::new(),
            events,
            max_attempts: config.max_attempts.max(1),
            processing_timeout: config.processing_timeout(),
            initialized: OnceCell::new(),
            drain_guard: tokio::sync::Mutex::new(()),
            draining: Mutex::new(false),
        }
    }

    fn lock_draining(&self) -> MutexGuard<'_, bool> {
        self.draining.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Run processor setup at most once
    ///
    /// Concurrent callers wait for the same attempt. A failed attempt leaves
    /// the service uninitialized so a later call can try again.
    pub async fn initialize(&self) -> Result<()> {
        self.initialized
            .get_or_try_init(|| async {
                info!("Initializing deferred service...");
                self.processor
                    .initialize()
                    .await
                    .map_err(|e| Error::Initialization(format!("{:#}", e)))?;
                info!("Deferred service initialized");
                Ok::<(), Error>(())
            })
            .await?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    /// Lazily initialize; succeeds once the service is usable
    pub async fn health_check(&self) -> Result<()> {
        if !self.is_initialized() {
            self.initialize().await?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Readiness
    // ---------------------------------------------------------------------

    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    /// Watch readiness edges
    pub fn subscribe_ready(&self) -> watch::Receiver<bool> {
        self.gate.subscribe()
    }

    /// Update readiness; a rising edge runs one drain episode
    ///
    /// Returns the drain report when a drain ran.
    pub async fn set_ready(&self, ready: bool) -> Option<DrainReport> {
        let transition = {
            let mut draining = self.lock_draining();
            let transition = self.gate.set_ready(ready);
            if transition == Transition::BecameReady {
                // Reserve dispatch so no submit overtakes the queued items
                *draining = true;
            }
            transition
        };

        match transition {
            Transition::Unchanged => None,
            Transition::BecameNotReady => {
                info!("Deferred service not ready; new work will be queued");
                self.events.emit_lossy(SyncEvent::ReadinessChanged {
                    ready: false,
                    timestamp: chrono::Utc::now(),
                });
                None
            }
            Transition::BecameReady => {
                info!("Deferred service ready; draining {} pending items", self.queue.len());
                self.events.emit_lossy(SyncEvent::ReadinessChanged {
                    ready: true,
                    timestamp: chrono::Utc::now(),
                });
                Some(self.drain().await)
            }
        }
    }

    // ---------------------------------------------------------------------
    // Submission
    // ---------------------------------------------------------------------

    /// Dispatch now if ready, otherwise queue
    ///
    /// Immediate dispatch failures (`Dispatch`, `ProcessingTimeout`) are
    /// returned to the caller and the item is not kept. `QueueFull` is
    /// returned when the item cannot be queued.
    pub async fn submit(&self, payload: T) -> Result<Submitted> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }

        let mut item = WorkItem::new(payload);
        let id = item.id;

        {
            let draining = self.lock_draining();
            if !self.gate.is_ready() || *draining {
                let pending = self.queue.enqueue(item)?;
                drop(draining);
                debug!("Queued item {} ({} pending)", id, pending);
                self.events.emit_lossy(SyncEvent::ItemQueued {
                    item_id: id,
                    pending,
                    timestamp: chrono::Utc::now(),
                });
                return Ok(Submitted::Queued(id));
            }
        }

        item.attempts = 1;
        self.attempt(&item).await?;
        debug!("Dispatched item {} immediately", id);
        self.events.emit_lossy(SyncEvent::ItemDispatched {
            item_id: id,
            attempts: item.attempts,
            timestamp: chrono::Utc::now(),
        });
        Ok(Submitted::Dispatched(id))
    }

    /// Remove a queued (not yet dispatched) item
    pub fn cancel(&self, id: Uuid) -> Result<WorkItem<T>> {
        let item = self
            .queue
            .cancel(id)
            .ok_or_else(|| Error::NotFound(format!("queued item {}", id)))?;
        debug!("Cancelled item {}", id);
        self.events.emit_lossy(SyncEvent::ItemCancelled {
            item_id: id,
            timestamp: chrono::Utc::now(),
        });
        Ok(item)
    }

    // ---------------------------------------------------------------------
    // Drain
    // ---------------------------------------------------------------------

    /// Take the next batch, or release dispatch ownership if there is none
    fn next_batch(&self) -> Option<Vec<WorkItem<T>>> {
        let mut draining = self.lock_draining();
        if self.gate.is_ready() {
            let batch = self.queue.drain_all();
            if !batch.is_empty() {
                *draining = true;
                return Some(batch);
            }
        }
        *draining = false;
        None
    }

    /// Run one drain episode
    ///
    /// Never fails: dispatch errors are logged and turned into a retry or a
    /// dead letter. Items submitted during the episode run in follow-up
    /// batches; failed items rejoin the tail only after the episode ends.
    /// If the episode is cancelled or a processor panics, untried items go
    /// back to the head of the queue and dispatch ownership is released.
    pub async fn drain(&self) -> DrainReport {
        let _guard = self.drain_guard.lock().await;
        let mut report = DrainReport::default();
        let mut episode = Episode::new(self);

        while let Some(batch) = self.next_batch() {
            report.batches += 1;
            debug!("Drain batch {} with {} items", report.batches, batch.len());
            self.events.emit_lossy(SyncEvent::DrainStarted {
                batch_size: batch.len(),
                timestamp: chrono::Utc::now(),
            });
            episode.untried.extend(batch);

            // The head item stays in `untried` while its attempt runs
            while let Some(item) = episode.untried.front_mut() {
                if !self.gate.is_ready() {
                    let rest: Vec<_> = episode.untried.drain(..).collect();
                    report.restored += rest.len();
                    info!("Readiness lost mid-drain; restoring {} items", rest.len());
                    self.queue.restore(rest);
                    break;
                }

                if item.attempts >= self.max_attempts {
                    // Budget spent by an attempt that never finished
                    if let Some(item) = episode.untried.pop_front() {
                        report.dead_lettered += 1;
                        self.dead_letter(item, "last attempt was interrupted".to_string());
                    }
                    continue;
                }

                item.attempts += 1;
                let outcome = self.attempt(item).await;
                let Some(item) = episode.untried.pop_front() else {
                    break;
                };

                match outcome {
                    Ok(()) => {
                        report.dispatched += 1;
                        debug!("Dispatched item {} (attempt {})", item.id, item.attempts);
                        self.events.emit_lossy(SyncEvent::ItemDispatched {
                            item_id: item.id,
                            attempts: item.attempts,
                            timestamp: chrono::Utc::now(),
                        });
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        if item.attempts >= self.max_attempts {
                            report.dead_lettered += 1;
                            self.dead_letter(item, reason);
                        } else {
                            report.retried += 1;
                            warn!(
                                "Sync item {} failed (attempt {}/{}): {}",
                                item.id, item.attempts, self.max_attempts, reason
                            );
                            self.events.emit_lossy(SyncEvent::ItemRetryScheduled {
                                item_id: item.id,
                                attempts: item.attempts,
                                reason,
                                timestamp: chrono::Utc::now(),
                            });
                            episode.retry_later.push(item);
                        }
                    }
                }
            }
        }

        for item in std::mem::take(&mut episode.retry_later) {
            if let Err(item) = self.queue.try_enqueue(item) {
                report.retried -= 1;
                report.dead_lettered += 1;
                self.dead_letter(item, "queue full on retry".to_string());
            }
        }
        episode.finished = true;

        if report.batches > 0 {
            info!(
                "Drain complete: {} dispatched, {} retrying, {} dead-lettered",
                report.dispatched, report.retried, report.dead_lettered
            );
            self.events.emit_lossy(SyncEvent::DrainCompleted {
                dispatched: report.dispatched,
                retried: report.retried,
                dead_lettered: report.dead_lettered,
                timestamp: chrono::Utc::now(),
            });
        }

        report
    }

    /// One processor call bounded by the processing timeout
    async fn attempt(&self, item: &WorkItem<T>) -> Result<()> {
        match tokio::time::timeout(self.processing_timeout, self.processor.process(&item.payload))
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::Dispatch {
                id: item.id,
                reason: format!("{:#}", e),
            }),
            Err(_) => Err(Error::ProcessingTimeout {
                id: item.id,
                timeout: self.processing_timeout,
            }),
        }
    }

    fn dead_letter(&self, item: WorkItem<T>, reason: String) {
        let err = Error::DeadLetter {
            id: item.id,
            attempts: item.attempts,
        };
        error!("{}: {}", err, reason);
        self.events.emit_lossy(SyncEvent::ItemDeadLettered {
            item_id: item.id,
            attempts: item.attempts,
            reason: reason.clone(),
            timestamp: chrono::Utc::now(),
        });
        self.dead_letters.push(item, reason);
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            is_ready: self.gate.is_ready(),
            initialized: self.is_initialized(),
            draining: *self.lock_draining(),
            pending_items: self.queue.len(),
            dead_letters: self.dead_letters.len(),
            capacity: self.queue.capacity(),
            max_attempts: self.max_attempts,
        }
    }

    pub fn pending_ids(&self) -> Vec<Uuid> {
        self.queue.pending_ids()
    }

    /// Remove and return all dead letters
    pub fn take_dead_letters(&self) -> Vec<DeadLetter<T>> {
        self.dead_letters.take_all()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Periodically drain pending retries while ready
    pub fn spawn_retry_timer(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if service.is_ready() && !service.queue.is_empty() {
                    debug!("Retry timer draining {} items", service.queue.len());
                    service.drain().await;
                }
            }
        })
    }
}

impl<T, P> DeferredService<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Processor<T>,
{
    pub fn dead_letters(&self) -> Vec<DeadLetter<T>> {
        self.dead_letters.snapshot()
    }
}

/// Items owned by a running drain episode
///
/// Dropped before `finished` is set (cancellation or a processor panic), it
/// puts untried items back at the head, re-queues pending retries and
/// releases dispatch ownership. An item whose attempt was cut short keeps
/// the attempt on its count.
struct Episode<'a, T, P>
where
    T: Send + Sync + 'static,
    P: Processor<T>,
{
    service: &'a DeferredService<T, P>,
    untried: VecDeque<WorkItem<T>>,
    retry_later: Vec<WorkItem<T>>,
    finished: bool,
}

impl<'a, T, P> Episode<'a, T, P>
where
    T: Send + Sync + 'static,
    P: Processor<T>,
{
    fn new(service: &'a DeferredService<T, P>) -> Self {
        Self {
            service,
            untried: VecDeque::new(),
            retry_later: Vec::new(),
            finished: false,
        }
    }
}

impl<T, P> Drop for Episode<'_, T, P>
where
    T: Send + Sync + 'static,
    P: Processor<T>,
{
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let untried: Vec<_> = self.untried.drain(..).collect();
        warn!(
            "Drain interrupted; restoring {} untried items and {} retries",
            untried.len(),
            self.retry_later.len()
        );
        self.service.queue.restore(untried);
        for item in self.retry_later.drain(..) {
            if let Err(item) = self.service.queue.try_enqueue(item) {
                self.service.dead_letter(item, "queue full on retry".to_string());
            }
        }
        *self.service.lock_draining() = false;
    }
}
