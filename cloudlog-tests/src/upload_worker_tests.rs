//! Background upload worker tests against `SimulatedStore`.
//!
//! # Test Categories
//!
//! 1. **Failure Isolation**: A failed delivery is logged and skipped; later items still land
//! 2. **Ordering**: Per-producer FIFO under concurrent producers
//! 3. **Fire-and-Forget**: No retries, no redelivery, losses only counted
//! 4. **Shutdown**: Stop races with enqueue without losing track of any item

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use cloudlog_store::{ObjectKey, StoreFaultConfig};
use cloudlog_upload::{StopPolicy, UploadContent, WorkerConfig, WorkerState};

use tracing::Level;

use crate::scenarios::{wait_for, EventCapture, Pipeline, SETTLE_TIMEOUT};

// ============================================================================
// Helper Functions
// ============================================================================

fn content(data: &str, name: &str) -> UploadContent {
    UploadContent::new(data.to_string(), name).unwrap()
}

fn key(name: &str) -> ObjectKey {
    ObjectKey::new(format!("test/{name}"))
}

// ============================================================================
// Failure Isolation
// ============================================================================

#[test]
fn test_worker_rejected_item_does_not_block_later_items() {
    let pipeline = Pipeline::start(
        42,
        StoreFaultConfig::none().with_rejected_key(key("b")),
        WorkerConfig::for_testing(),
    );

    pipeline.worker.enqueue(content("x", "a"));
    pipeline.worker.enqueue(content("y", "b"));
    pipeline.worker.enqueue(content("z", "c"));

    let stats = pipeline.settle(3);
    assert_eq!(stats.delivered, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(
        pipeline.store.snapshot(),
        vec![(key("a"), Bytes::from("x")), (key("c"), Bytes::from("z"))]
    );
    assert_eq!(pipeline.worker.state(), WorkerState::Running);

    pipeline.shutdown();
}

#[test]
fn test_worker_rejected_item_logs_exactly_one_failure() {
    let capture = EventCapture::new();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    let pipeline = Pipeline::start(
        42,
        StoreFaultConfig::none().with_rejected_key(key("b")),
        WorkerConfig::for_testing(),
    );
    pipeline.worker.enqueue(content("x", "a"));
    pipeline.worker.enqueue(content("y", "b"));
    pipeline.worker.enqueue(content("z", "c"));
    pipeline.settle(3);
    pipeline.shutdown();

    let events = capture.events();
    assert_eq!(events.len(), 1, "unexpected events: {events:?}");
    assert_eq!(events[0].level, Level::ERROR);
    assert_eq!(events[0].name.as_deref(), Some("b"));
    assert!(events[0].message.contains("content lost"));
}

#[test]
fn test_worker_failure_at_any_position_skips_only_that_item() {
    for failing in 0u32..5 {
        let pipeline = Pipeline::start(
            u64::from(failing),
            StoreFaultConfig::none().with_rejected_key(key(&format!("item-{failing}"))),
            WorkerConfig::for_testing(),
        );

        for i in 0..5 {
            pipeline.worker.enqueue(content("data", &format!("item-{i}")));
        }

        let stats = pipeline.settle(5);
        assert_eq!(stats.failed, 1, "failing position {failing}");
        assert_eq!(stats.delivered, 4, "failing position {failing}");
        assert!(pipeline
            .store
            .get_raw_content(&key(&format!("item-{failing}")))
            .is_none());
        pipeline.shutdown();
    }
}

#[test]
fn test_worker_interrupted_wait_counts_as_failure() {
    let pipeline = Pipeline::start(
        42,
        StoreFaultConfig::none().with_force_put_interrupt(),
        WorkerConfig::for_testing(),
    );

    pipeline.worker.enqueue(content("x", "a"));
    assert_eq!(pipeline.settle(1).failed, 1);

    // The forced interrupt is one-shot.
    pipeline.worker.enqueue(content("y", "b"));

    let stats = pipeline.settle(2);
    assert_eq!(stats.delivered, 1);
    assert_eq!(pipeline.store.get_raw_content(&key("b")), Some(Bytes::from("y")));

    pipeline.shutdown();
}

#[test]
fn test_worker_flaky_store_never_retries() {
    let pipeline = Pipeline::start(
        7,
        StoreFaultConfig::none().with_put_fail_rate(0.3),
        WorkerConfig::for_testing(),
    );

    for i in 0..100 {
        pipeline.worker.enqueue(content("data", &format!("item-{i:03}")));
    }

    let stats = pipeline.settle(100);
    assert_eq!(stats.delivered + stats.failed, 100);
    assert!(stats.failed > 0, "expected some injected failures");
    assert_eq!(pipeline.store.put_attempts().len(), 100);
    assert_eq!(pipeline.store.object_count() as u64, stats.delivered);

    pipeline.shutdown();
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_worker_single_producer_fifo() {
    let pipeline = Pipeline::start(42, StoreFaultConfig::none(), WorkerConfig::for_testing());

    let names: Vec<String> = (0..200).map(|i| format!("seq-{i:04}")).collect();
    for name in &names {
        pipeline.worker.enqueue(content("data", name));
    }

    pipeline.settle(200);
    let expected: Vec<ObjectKey> = names.iter().map(|n| key(n)).collect();
    assert_eq!(pipeline.store.put_attempts(), expected);

    pipeline.shutdown();
}

#[test]
fn test_worker_concurrent_producers_each_item_once() {
    const PRODUCERS: usize = 8;
    const ITEMS: usize = 50;

    let pipeline = Pipeline::start(42, StoreFaultConfig::none(), WorkerConfig::for_testing());

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let worker = Arc::clone(&pipeline.worker);
            std::thread::spawn(move || {
                for i in 0..ITEMS {
                    worker.enqueue(content("data", &format!("p{p}/{i:03}")));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let total = (PRODUCERS * ITEMS) as u64;
    let stats = pipeline.settle(total);
    assert_eq!(stats.enqueued, total);
    assert_eq!(stats.delivered, total);

    let attempts = pipeline.store.put_attempts();
    assert_eq!(attempts.len() as u64, total);
    let unique: HashSet<_> = attempts.iter().collect();
    assert_eq!(unique.len() as u64, total, "no item delivered twice");

    // Each producer's items arrive in the order it enqueued them.
    for p in 0..PRODUCERS {
        let prefix = format!("test/p{p}/");
        let mine: Vec<&str> = attempts
            .iter()
            .map(ObjectKey::as_str)
            .filter(|k| k.starts_with(&prefix))
            .collect();
        let mut sorted = mine.clone();
        sorted.sort_unstable();
        assert_eq!(mine, sorted, "producer {p} out of order");
        assert_eq!(mine.len(), ITEMS);
    }

    pipeline.shutdown();
}

#[test]
fn test_worker_slow_store_stalls_queue_in_order() {
    let delay = Duration::from_millis(50);
    let pipeline = Pipeline::start(
        42,
        StoreFaultConfig::none().with_put_delay(delay),
        WorkerConfig::for_testing(),
    );

    let started = Instant::now();
    for name in ["a", "b", "c", "d", "e"] {
        pipeline.worker.enqueue(content("data", name));
    }
    assert!(
        started.elapsed() < delay,
        "enqueue must not wait on the store"
    );

    pipeline.settle(5);
    assert!(started.elapsed() >= delay * 5, "deliveries are sequential");
    assert_eq!(
        pipeline.store.put_attempts(),
        vec![key("a"), key("b"), key("c"), key("d"), key("e")]
    );

    pipeline.shutdown();
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn test_worker_stop_with_concurrent_enqueue_accounts_for_every_item() {
    const PRODUCERS: usize = 4;
    const ITEMS: usize = 200;

    let pipeline = Pipeline::start(
        42,
        StoreFaultConfig::none().with_put_delay(Duration::from_millis(1)),
        WorkerConfig::for_testing(),
    );

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let worker = Arc::clone(&pipeline.worker);
            std::thread::spawn(move || {
                for i in 0..ITEMS {
                    worker.enqueue(content("data", &format!("p{p}/{i}")));
                }
            })
        })
        .collect();

    std::thread::sleep(Duration::from_millis(20));
    pipeline.worker.stop();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = pipeline.shutdown();
    assert_eq!(pipeline.worker.state(), WorkerState::Stopped);
    assert_eq!(
        stats.delivered + stats.failed + stats.abandoned,
        (PRODUCERS * ITEMS) as u64
    );
    assert_eq!(stats.queue_depth, 0);
    assert_eq!(pipeline.store.object_count() as u64, stats.delivered);
}

#[test]
fn test_worker_idle_stop_is_prompt() {
    let pipeline = Pipeline::start(
        42,
        StoreFaultConfig::none(),
        WorkerConfig::for_testing().with_poll_interval(Duration::from_millis(100)),
    );

    std::thread::sleep(Duration::from_millis(50));
    let stopping = Instant::now();
    pipeline.shutdown();

    assert!(stopping.elapsed() < Duration::from_secs(2));
    assert_eq!(pipeline.worker.stats().abandoned, 0);
}

#[test]
fn test_worker_drain_policy_delivers_backlog() {
    let pipeline = Pipeline::start(
        42,
        StoreFaultConfig::none()
            .with_put_delay(Duration::from_millis(5))
            .with_rejected_key(key("item-3")),
        WorkerConfig::for_testing().with_stop_policy(StopPolicy::Drain),
    );

    for i in 0..10 {
        pipeline.worker.enqueue(content("data", &format!("item-{i}")));
    }
    let stats = pipeline.shutdown();

    assert_eq!(stats.delivered, 9);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.abandoned, 0);
    assert_eq!(pipeline.store.object_count(), 9);
}

#[test]
fn test_worker_drop_releases_thread() {
    let pipeline = Pipeline::start(42, StoreFaultConfig::none(), WorkerConfig::for_testing());
    pipeline.worker.enqueue(content("x", "a"));
    pipeline.settle(1);

    let Pipeline { store, worker } = pipeline;
    let weak = Arc::downgrade(&worker);
    drop(worker);

    assert!(weak.upgrade().is_none());
    assert!(wait_for(SETTLE_TIMEOUT, || store.object_count() == 1));
}
