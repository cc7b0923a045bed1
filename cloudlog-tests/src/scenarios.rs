//! Reusable setup for upload pipeline tests.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cloudlog_store::{Namespace, SimulatedStore, StoreFaultConfig};
use cloudlog_upload::{AsyncUploadWorker, StoreUploader, WorkerConfig, WorkerStats};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{Layer, Registry};

/// Environment used by every scenario.
pub const TEST_ENVIRONMENT: &str = "test";

/// How long a scenario waits for the worker to settle before giving up.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Installs a test-writer tracing subscriber. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// A started worker wired to a shared simulated store.
pub struct Pipeline {
    /// The store the worker delivers into. Clones share state.
    pub store: SimulatedStore,
    /// The running worker.
    pub worker: Arc<AsyncUploadWorker>,
}

impl Pipeline {
    /// Starts a worker over a fresh simulated store with `faults`.
    ///
    /// # Panics
    ///
    /// Panics if the worker cannot be started.
    #[must_use]
    pub fn start(seed: u64, faults: StoreFaultConfig, config: WorkerConfig) -> Self {
        init_tracing();
        let store = SimulatedStore::with_faults(seed, faults);
        let uploader = StoreUploader::new(store.clone(), Namespace::new(TEST_ENVIRONMENT));
        let worker = Arc::new(AsyncUploadWorker::new(Arc::new(uploader), config));
        worker.start().expect("worker should start");
        Self { store, worker }
    }

    /// Blocks until `attempts` deliveries have been attempted, or
    /// [`SETTLE_TIMEOUT`] passes. Returns the final stats.
    #[must_use]
    pub fn settle(&self, attempts: u64) -> WorkerStats {
        wait_for(SETTLE_TIMEOUT, || {
            let stats = self.worker.stats();
            stats.delivered + stats.failed >= attempts
        });
        self.worker.stats()
    }

    /// Stops the worker and waits for its thread to exit.
    pub fn shutdown(&self) -> WorkerStats {
        self.worker.stop();
        self.worker.join();
        self.worker.stats()
    }
}

/// Polls `cond` until it holds or `timeout` passes. Returns the last result.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

// ============================================================================
// Event Capture
// ============================================================================

/// A warning or error event recorded by [`EventCapture`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedEvent {
    /// Event level (`WARN` or `ERROR`).
    pub level: Level,
    /// Formatted message.
    pub message: String,
    /// The `name` field, if the event carried one.
    pub name: Option<String>,
}

/// Tracing layer that records every warning and error event.
///
/// Install with `tracing::subscriber::set_default(capture.subscriber())`
/// before starting a worker; the worker thread inherits it.
#[derive(Debug, Clone, Default)]
pub struct EventCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl EventCapture {
    /// Creates an empty capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a subscriber that feeds this capture.
    #[must_use]
    pub fn subscriber(&self) -> impl Subscriber + Send + Sync {
        Registry::default().with(self.clone())
    }

    /// Returns the events recorded so far.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().expect("events lock poisoned").clone()
    }
}

impl<S: Subscriber> Layer<S> for EventCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level != Level::WARN && level != Level::ERROR {
            return;
        }

        let mut fields = EventFields::default();
        event.record(&mut fields);
        self.events
            .lock()
            .expect("events lock poisoned")
            .push(CapturedEvent {
                level,
                message: fields.message,
                name: fields.name,
            });
    }
}

#[derive(Default)]
struct EventFields {
    message: String,
    name: Option<String>,
}

impl Visit for EventFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "name" {
            self.name = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{value:?}"),
            "name" => self.name = Some(format!("{value:?}")),
            _ => {}
        }
    }
}
