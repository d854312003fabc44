//! Integration tests for the deferred dispatch service
//!
//! Covers:
//! - FIFO ordering of items queued while not ready
//! - Capacity rejection without loss or reordering
//! - Idempotent ready transitions (one drain per rising edge)
//! - Retry after a single failure, dead-lettering after the retry budget
//! - Submissions during a drain landing in the next batch
//! - Lazy one-time initialization, cancellation, processing timeouts

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use empire_common::config::QueueConfig;
use empire_common::deferred::{DeferredService, Processor, Submitted};
use empire_common::events::{EventBus, SyncEvent};
use empire_common::Error;
use tokio::sync::Notify;

/// Test processor: records calls, fails or panics on demand, can block on one payload
#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
    /// Remaining failures per payload
    failures: Mutex<HashMap<String, u32>>,
    /// Remaining panics per payload
    panics: Mutex<HashMap<String, u32>>,
    init_calls: AtomicUsize,
    init_failures: AtomicUsize,
    block_on: Option<String>,
    entered: Notify,
    release: Notify,
    slow: Option<(String, Duration)>,
}

impl Recorder {
    fn failing(payload: &str, times: u32) -> Self {
        let recorder = Self::default();
        recorder.failures.lock().unwrap().insert(payload.to_string(), times);
        recorder
    }

    fn panicking(payload: &str, times: u32) -> Self {
        let recorder = Self::default();
        recorder.panics.lock().unwrap().insert(payload.to_string(), times);
        recorder
    }

    fn blocking_on(payload: &str) -> Self {
        Self {
            block_on: Some(payload.to_string()),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

/// Consume one remaining count for `payload`
fn take_one(counts: &Mutex<HashMap<String, u32>>, payload: &str) -> bool {
    let mut counts = counts.lock().unwrap();
    match counts.get_mut(payload) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

impl Processor<String> for Recorder {
    async fn initialize(&self) -> anyhow::Result<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        if self.init_failures.load(Ordering::SeqCst) > 0 {
            self.init_failures.fetch_sub(1, Ordering::SeqCst);
            anyhow::bail!("upstream unavailable");
        }
        Ok(())
    }

    async fn process(&self, payload: &String) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(payload.clone());

        if self.block_on.as_ref() == Some(payload) {
            self.entered.notify_one();
            self.release.notified().await;
        }

        if let Some((slow, delay)) = &self.slow {
            if slow == payload {
                tokio::time::sleep(*delay).await;
            }
        }

        if take_one(&self.panics, payload) {
            panic!("{} crashed the processor", payload);
        }
        if take_one(&self.failures, payload) {
            anyhow::bail!("{} rejected", payload);
        }
        Ok(())
    }
}

fn queue_config(capacity: Option<usize>, max_attempts: u32) -> QueueConfig {
    QueueConfig {
        capacity,
        max_attempts,
        processing_timeout_ms: 1_000,
        retry_interval_ms: None,
    }
}

async fn ready_service(
    recorder: Recorder,
    config: QueueConfig,
) -> Arc<DeferredService<String, Recorder>> {
    let service = Arc::new(DeferredService::new(recorder, &config, EventBus::new(64)));
    service.initialize().await.expect("initialize should succeed");
    service
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test]
async fn test_fifo_order_after_ready() {
    let service = ready_service(Recorder::default(), queue_config(None, 3)).await;

    for payload in ["a", "b", "c", "d", "e"] {
        let outcome = service.submit(payload.to_string()).await.unwrap();
        assert!(matches!(outcome, Submitted::Queued(_)));
    }
    assert!(service.processor().calls().is_empty());

    let report = service.set_ready(true).await.expect("rising edge drains");
    assert_eq!(report.dispatched, 5);
    assert_eq!(service.processor().calls(), vec!["a", "b", "c", "d", "e"]);
    assert_eq!(service.status().pending_items, 0);
}

#[tokio::test]
async fn test_submit_during_drain_lands_in_next_batch() {
    let service = ready_service(Recorder::blocking_on("A"), queue_config(None, 3)).await;

    for payload in ["A", "B", "C"] {
        service.submit(payload.to_string()).await.unwrap();
    }

    let drainer = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.set_ready(true).await })
    };

    // Wait until A is in flight, then submit D
    service.processor().entered.notified().await;
    let outcome = service.submit("D".to_string()).await.unwrap();
    assert!(matches!(outcome, Submitted::Queued(_)), "D must not overtake the drain");

    service.processor().release.notify_one();
    let report = drainer.await.unwrap().expect("drain ran");

    assert_eq!(service.processor().calls(), vec!["A", "B", "C", "D"]);
    assert_eq!(report.batches, 2);
    assert_eq!(report.dispatched, 4);
}

#[tokio::test]
async fn test_readiness_lost_mid_drain_restores_rest() {
    let service = ready_service(Recorder::blocking_on("A"), queue_config(None, 3)).await;

    let mut ids = Vec::new();
    for payload in ["A", "B", "C"] {
        ids.push(service.submit(payload.to_string()).await.unwrap().id());
    }

    let drainer = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.set_ready(true).await })
    };

    service.processor().entered.notified().await;
    assert!(service.set_ready(false).await.is_none());
    service.processor().release.notify_one();

    let report = drainer.await.unwrap().expect("drain ran");
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.restored, 2);
    assert_eq!(service.pending_ids(), ids[1..].to_vec());

    service.set_ready(true).await;
    assert_eq!(service.processor().calls(), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_panicking_processor_keeps_untried_items() {
    let service = ready_service(Recorder::panicking("B", 1), queue_config(None, 3)).await;

    let mut ids = Vec::new();
    for payload in ["A", "B", "C"] {
        ids.push(service.submit(payload.to_string()).await.unwrap().id());
    }

    let drainer = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.set_ready(true).await })
    };
    assert!(drainer.await.unwrap_err().is_panic());

    // B keeps its interrupted attempt; B and C wait at the head
    let status = service.status();
    assert!(!status.draining);
    assert_eq!(service.pending_ids(), ids[1..].to_vec());

    // Dispatch ownership was released, so new work goes straight through
    let outcome = service.submit("D".to_string()).await.unwrap();
    assert!(matches!(outcome, Submitted::Dispatched(_)));

    let report = service.drain().await;
    assert_eq!(report.dispatched, 2);
    assert_eq!(service.processor().calls(), vec!["A", "B", "D", "B", "C"]);
    assert_eq!(service.status().pending_items, 0);
}

#[tokio::test]
async fn test_interrupted_final_attempt_is_dead_lettered() {
    let service = ready_service(Recorder::panicking("A", 1), queue_config(None, 1)).await;
    let id = service.submit("A".to_string()).await.unwrap().id();

    let drainer = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.set_ready(true).await })
    };
    assert!(drainer.await.unwrap_err().is_panic());
    assert_eq!(service.pending_ids(), vec![id]);

    let report = service.drain().await;
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(service.processor().calls(), vec!["A"]);
    assert_eq!(service.dead_letters()[0].item.id, id);
}

// =============================================================================
// Capacity
// =============================================================================

#[tokio::test]
async fn test_queue_full_rejects_and_keeps_order() {
    let service = ready_service(Recorder::default(), queue_config(Some(2), 3)).await;

    let a = service.submit("a".to_string()).await.unwrap().id();
    let b = service.submit("b".to_string()).await.unwrap().id();

    let result = service.submit("c".to_string()).await;
    assert!(matches!(result, Err(Error::QueueFull { capacity: 2 })));
    assert_eq!(service.pending_ids(), vec![a, b]);

    service.set_ready(true).await;
    assert_eq!(service.processor().calls(), vec!["a", "b"]);
}

// =============================================================================
// Ready transitions
// =============================================================================

#[tokio::test]
async fn test_repeated_ready_drains_once() {
    let service = ready_service(Recorder::failing("x", 1), queue_config(None, 3)).await;
    service.submit("x".to_string()).await.unwrap();

    assert!(service.set_ready(true).await.is_some());
    // x failed and is pending again, but no edge means no drain
    assert!(service.set_ready(true).await.is_none());

    assert_eq!(service.processor().calls(), vec!["x"]);
    assert_eq!(service.status().pending_items, 1);
}

#[tokio::test]
async fn test_ready_service_dispatches_immediately() {
    let service = ready_service(Recorder::default(), queue_config(None, 3)).await;
    service.set_ready(true).await;

    let outcome = service.submit("now".to_string()).await.unwrap();
    assert!(matches!(outcome, Submitted::Dispatched(_)));
    assert_eq!(service.processor().calls(), vec!["now"]);
}

#[tokio::test]
async fn test_immediate_failure_propagates_and_is_not_queued() {
    let service = ready_service(Recorder::failing("bad", 1), queue_config(None, 3)).await;
    service.set_ready(true).await;

    let result = service.submit("bad".to_string()).await;
    match result {
        Err(Error::Dispatch { reason, .. }) => assert!(reason.contains("bad rejected")),
        other => panic!("expected Dispatch error, got {:?}", other),
    }
    assert_eq!(service.status().pending_items, 0);
    assert_eq!(service.status().dead_letters, 0);
}

// =============================================================================
// Retry policy
// =============================================================================

#[tokio::test]
async fn test_fail_once_then_succeed_dispatches_twice() {
    let service = ready_service(Recorder::failing("x", 1), queue_config(None, 3)).await;
    service.submit("x".to_string()).await.unwrap();

    let first = service.set_ready(true).await.unwrap();
    assert_eq!(first.retried, 1);
    assert_eq!(service.status().pending_items, 1);

    let second = service.drain().await;
    assert_eq!(second.dispatched, 1);

    assert_eq!(service.processor().calls(), vec!["x", "x"]);
    let status = service.status();
    assert_eq!(status.pending_items, 0);
    assert_eq!(status.dead_letters, 0);
}

#[tokio::test]
async fn test_always_failing_item_is_dead_lettered() {
    let service = ready_service(Recorder::failing("x", u32::MAX), queue_config(None, 3)).await;
    let id = service.submit("x".to_string()).await.unwrap().id();

    // Three rising edges exhaust the budget
    for _ in 0..3 {
        service.set_ready(true).await;
        service.set_ready(false).await;
    }

    let dead = service.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].item.id, id);
    assert_eq!(dead[0].item.attempts, 3);
    assert!(dead[0].reason.contains("x rejected"));
    assert_eq!(service.status().pending_items, 0);

    // Excluded from further passes
    service.set_ready(true).await;
    service.drain().await;
    assert_eq!(service.processor().calls().len(), 3);

    assert_eq!(service.take_dead_letters().len(), 1);
    assert_eq!(service.status().dead_letters, 0);
}

#[tokio::test]
async fn test_processing_timeout() {
    let recorder = Recorder {
        slow: Some(("slow".to_string(), Duration::from_secs(5))),
        ..Recorder::default()
    };
    let mut config = queue_config(None, 3);
    config.processing_timeout_ms = 20;
    let service = ready_service(recorder, config).await;
    service.set_ready(true).await;

    let result = service.submit("slow".to_string()).await;
    assert!(matches!(
        result,
        Err(Error::ProcessingTimeout { timeout, .. }) if timeout == Duration::from_millis(20)
    ));
}

#[tokio::test]
async fn test_retry_timer_drains_pending_retries() {
    let service = ready_service(Recorder::failing("x", 1), queue_config(None, 3)).await;
    service.submit("x".to_string()).await.unwrap();
    service.set_ready(true).await;
    assert_eq!(service.status().pending_items, 1);

    let timer = service.spawn_retry_timer(Duration::from_millis(10));
    for _ in 0..100 {
        if service.processor().calls().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    timer.abort();

    assert_eq!(service.processor().calls(), vec!["x", "x"]);
    assert_eq!(service.status().pending_items, 0);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_submit_before_initialize_is_rejected() {
    let service = DeferredService::new(Recorder::default(), &queue_config(None, 3), EventBus::new(8));

    let result = service.submit("early".to_string()).await;
    assert!(matches!(result, Err(Error::NotInitialized)));
    assert!(!service.status().initialized);
}

#[tokio::test]
async fn test_initialize_runs_at_most_once() {
    let service = Arc::new(DeferredService::new(
        Recorder::default(),
        &queue_config(None, 3),
        EventBus::new(8),
    ));

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.initialize().await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    service.health_check().await.unwrap();

    assert_eq!(service.processor().init_calls.load(Ordering::SeqCst), 1);
    assert!(service.is_initialized());
}

#[tokio::test]
async fn test_failed_initialize_can_be_retried() {
    let recorder = Recorder::default();
    recorder.init_failures.store(1, Ordering::SeqCst);
    let service = DeferredService::new(recorder, &queue_config(None, 3), EventBus::new(8));

    assert!(matches!(service.initialize().await, Err(Error::Initialization(_))));
    assert!(!service.is_initialized());

    service.health_check().await.unwrap();
    assert!(service.is_initialized());
    assert_eq!(service.processor().init_calls.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Cancellation and events
// =============================================================================

#[tokio::test]
async fn test_cancel_queued_item() {
    let service = ready_service(Recorder::default(), queue_config(None, 3)).await;
    service.submit("a".to_string()).await.unwrap();
    let b = service.submit("b".to_string()).await.unwrap().id();

    let cancelled = service.cancel(b).unwrap();
    assert_eq!(cancelled.payload, "b");
    assert!(matches!(service.cancel(b), Err(Error::NotFound(_))));

    service.set_ready(true).await;
    assert_eq!(service.processor().calls(), vec!["a"]);
}

#[tokio::test]
async fn test_event_sequence() {
    let service = ready_service(Recorder::default(), queue_config(None, 3)).await;
    let mut rx = service.subscribe_events();

    service.submit("a".to_string()).await.unwrap();
    service.set_ready(true).await;

    let mut types = Vec::new();
    while let Ok(event) = rx.try_recv() {
        types.push(event.event_type());
        if let SyncEvent::ItemQueued { pending, .. } = event {
            assert_eq!(pending, 1);
        }
    }

    assert_eq!(
        types,
        vec![
            "ItemQueued",
            "ReadinessChanged",
            "DrainStarted",
            "ItemDispatched",
            "DrainCompleted",
        ]
    );
}
