//! Asynchronous, queued, single-worker upload pipeline.
//!
//! Producers hand [`UploadContent`] to [`AsyncUploadWorker::enqueue`], which
//! never blocks and never fails. A dedicated background thread drains the
//! queue one item at a time into an [`Uploader`].
//!
//! # Architecture
//!
//! ```text
//!  producer ─┐
//!  producer ─┼─ enqueue ─▶ unbounded FIFO ─▶ drain loop ─▶ Uploader ─▶ Store
//!  producer ─┘            (mpsc channel)   (worker thread,
//!                                           current-thread runtime)
//! ```
//!
//! # Fire-and-forget
//!
//! Delivery failures end at the worker: they are logged and the item is
//! lost. There is no retry and no signal back to the producer. A slow store
//! stalls every item queued behind the one in flight.
//!
//! # Lifecycle
//!
//! `Created → Running → Terminating → Stopped`. [`stop`](AsyncUploadWorker::stop)
//! only sets a flag that the loop checks before each item; the item in
//! flight is allowed to finish. Under the default [`StopPolicy::Abandon`]
//! whatever is still queued when the loop exits is dropped.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use cloudlog_store::Namespace;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn, Instrument};

use crate::content::UploadContent;
use crate::error::{UploadError, UploadResult};
use crate::limits;
use crate::uploader::{attempt_upload, UploadAttempt, Uploader};

// -----------------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------------

/// What the worker does with queued items once it has been asked to stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopPolicy {
    /// Exit immediately; queued items are lost.
    #[default]
    Abandon,
    /// Deliver the items still queued, then exit.
    Drain,
}

/// Configuration for [`AsyncUploadWorker`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How long the loop waits on an empty queue before re-checking the
    /// stop flag. Bounds the delay between `stop()` and exit when idle.
    pub poll_interval: Duration,
    /// Name of the worker thread.
    pub thread_name: String,
    /// Behavior for items still queued at stop.
    pub stop_policy: StopPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(limits::POLL_INTERVAL_MS_DEFAULT),
            thread_name: limits::THREAD_NAME_DEFAULT.to_string(),
            stop_policy: StopPolicy::Abandon,
        }
    }
}

impl WorkerConfig {
    /// Creates a config with a short poll interval (for testing).
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            poll_interval: Duration::from_millis(limits::POLL_INTERVAL_MS_TESTING),
            ..Self::default()
        }
    }

    /// Creates a default config whose thread is named after the bucket and
    /// environment it uploads to.
    #[must_use]
    pub fn named_for(bucket: &str, namespace: &Namespace) -> Self {
        Self {
            thread_name: format!("{}-{bucket}-{namespace}", limits::THREAD_NAME_DEFAULT),
            ..Self::default()
        }
    }

    /// Sets the poll interval.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        assert!(!interval.is_zero(), "poll interval must be non-zero");
        self.poll_interval = interval;
        self
    }

    /// Sets the thread name.
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Sets the stop policy.
    #[must_use]
    pub const fn with_stop_policy(mut self, policy: StopPolicy) -> Self {
        self.stop_policy = policy;
        self
    }
}

// -----------------------------------------------------------------------------
// State
// -----------------------------------------------------------------------------

/// Lifecycle state of an [`AsyncUploadWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Constructed, loop not started. Enqueued items wait.
    Created = 0,
    /// Loop draining the queue.
    Running = 1,
    /// Stop requested; loop has not yet observed it.
    Terminating = 2,
    /// Loop exited.
    Stopped = 3,
}

impl WorkerState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Terminating,
            _ => Self::Stopped,
        }
    }
}

/// Point-in-time counters for an [`AsyncUploadWorker`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Items accepted into the queue.
    pub enqueued: u64,
    /// Items the store confirmed.
    pub delivered: u64,
    /// Items whose delivery was attempted and failed.
    pub failed: u64,
    /// Items dropped without a delivery attempt because the worker stopped.
    pub abandoned: u64,
    /// Poll intervals that elapsed with an empty queue.
    pub idle_polls: u64,
    /// Items currently queued.
    pub queue_depth: u64,
}

/// State shared between the producer-facing handle and the drain loop.
#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
    idle_polls: AtomicU64,
    queue_depth: AtomicU64,
}

impl Shared {
    const fn new() -> Self {
        Self {
            state: AtomicU8::new(WorkerState::Created as u8),
            enqueued: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            abandoned: AtomicU64::new(0),
            idle_polls: AtomicU64::new(0),
            queue_depth: AtomicU64::new(0),
        }
    }

    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Records one item leaving the queue and returns the depth behind it.
    fn dequeued(&self) -> u64 {
        self.queue_depth
            .fetch_sub(1, Ordering::AcqRel)
            .saturating_sub(1)
    }

    fn stats(&self) -> WorkerStats {
        WorkerStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            idle_polls: self.idle_polls.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
        }
    }
}

// -----------------------------------------------------------------------------
// AsyncUploadWorker
// -----------------------------------------------------------------------------

/// Fire-and-forget uploader backed by a single background thread.
///
/// `enqueue` is safe to call from any number of threads through a shared
/// reference (wrap the worker in an `Arc`). Items from one producer are
/// delivered in the order that producer enqueued them.
///
/// Producers get no signal when an upload is lost: failures are only
/// logged. Use [`Uploader::upload`] directly when the caller needs to know.
///
/// The worker thread is detached and never keeps the process alive. Dropping
/// the worker requests a stop.
pub struct AsyncUploadWorker {
    uploader: Arc<dyn Uploader>,
    config: WorkerConfig,
    shared: Arc<Shared>,
    queue_tx: mpsc::UnboundedSender<UploadContent>,
    /// Taken by the drain loop at start.
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<UploadContent>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncUploadWorker {
    /// Creates a worker in the `Created` state. Call [`start`](Self::start)
    /// to begin draining.
    #[must_use]
    pub fn new(uploader: Arc<dyn Uploader>, config: WorkerConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            uploader,
            config,
            shared: Arc::new(Shared::new()),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            thread: Mutex::new(None),
        }
    }

    /// Starts the drain loop on a dedicated background thread.
    ///
    /// Calling `start` on a worker that is already running or has been
    /// stopped logs a warning and does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::WorkerSpawn`] if the runtime or thread cannot
    /// be created. The worker is `Stopped` afterwards.
    ///
    /// # Panics
    ///
    /// Panics if an internal mutex is poisoned.
    pub fn start(&self) -> UploadResult<()> {
        if let Err(current) = self.shared.state.compare_exchange(
            WorkerState::Created as u8,
            WorkerState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            warn!(
                thread = %self.config.thread_name,
                state = ?WorkerState::from_u8(current),
                "Upload worker already started, ignoring start"
            );
            return Ok(());
        }

        let Some(queue_rx) = self
            .queue_rx
            .lock()
            .expect("queue receiver lock poisoned")
            .take()
        else {
            self.shared.set_state(WorkerState::Stopped);
            return Err(UploadError::WorkerSpawn {
                message: "queue receiver already taken".to_string(),
            });
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| {
                self.shared.set_state(WorkerState::Stopped);
                UploadError::WorkerSpawn {
                    message: format!("failed to build runtime: {e}"),
                }
            })?;

        let drain = DrainLoop {
            uploader: Arc::clone(&self.uploader),
            shared: Arc::clone(&self.shared),
            queue_rx,
            poll_interval: self.config.poll_interval,
            stop_policy: self.config.stop_policy,
        };
        let span = tracing::info_span!("upload_worker", thread = %self.config.thread_name);
        // The worker logs to whichever subscriber was current at start.
        let dispatch = tracing::dispatcher::get_default(Clone::clone);

        let handle = std::thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || {
                tracing::dispatcher::with_default(&dispatch, || {
                    runtime.block_on(drain.run().instrument(span));
                });
            })
            .map_err(|e| {
                self.shared.set_state(WorkerState::Stopped);
                UploadError::WorkerSpawn {
                    message: format!("failed to spawn thread: {e}"),
                }
            })?;

        *self.thread.lock().expect("thread handle lock poisoned") = Some(handle);

        let poll_interval_ms =
            u64::try_from(self.config.poll_interval.as_millis()).unwrap_or(u64::MAX);
        info!(
            thread = %self.config.thread_name,
            poll_interval_ms,
            queue_depth = self.shared.queue_depth.load(Ordering::Relaxed),
            "Upload worker started"
        );
        Ok(())
    }

    /// Requests the drain loop to stop. Does not wait for it.
    ///
    /// Idempotent. Stopping a worker that was never started moves it straight
    /// to `Stopped` and abandons everything queued so far.
    pub fn stop(&self) {
        let transition = self.shared.state.fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |current| match WorkerState::from_u8(current) {
                WorkerState::Created => Some(WorkerState::Stopped as u8),
                WorkerState::Running => Some(WorkerState::Terminating as u8),
                WorkerState::Terminating | WorkerState::Stopped => None,
            },
        );

        if let Ok(previous) = transition {
            let previous = WorkerState::from_u8(previous);
            info!(
                thread = %self.config.thread_name,
                ?previous,
                queue_depth = self.shared.queue_depth.load(Ordering::Relaxed),
                "Upload worker stop requested"
            );
            if previous == WorkerState::Created {
                self.abandon_unstarted();
            }
        }
    }

    /// Closes the queue of a worker stopped before it ever started and drops
    /// whatever was enqueued while it waited.
    fn abandon_unstarted(&self) {
        let queue_rx = self.queue_rx.lock().ok().and_then(|mut rx| rx.take());
        let Some(mut queue_rx) = queue_rx else {
            return;
        };

        queue_rx.close();
        let mut abandoned = 0u64;
        while queue_rx.try_recv().is_ok() {
            self.shared.dequeued();
            abandoned += 1;
        }

        if abandoned > 0 {
            self.shared.abandoned.fetch_add(abandoned, Ordering::Relaxed);
            warn!(
                thread = %self.config.thread_name,
                abandoned,
                "Upload worker stopped before start, content lost"
            );
        }
    }

    /// Appends `item` to the queue and returns immediately.
    ///
    /// Never blocks and never fails. Once the worker has stopped, the item is
    /// dropped and counted as abandoned.
    pub fn enqueue(&self, item: UploadContent) {
        // Count before sending so the loop never sees a depth below zero.
        let queue_depth = self.shared.queue_depth.fetch_add(1, Ordering::AcqRel) + 1;

        match self.queue_tx.send(item) {
            Ok(()) => {
                self.shared.enqueued.fetch_add(1, Ordering::Relaxed);
                debug!(queue_depth, "Queued content for upload");
            }
            Err(mpsc::error::SendError(item)) => {
                self.shared.queue_depth.fetch_sub(1, Ordering::AcqRel);
                self.shared.abandoned.fetch_add(1, Ordering::Relaxed);
                debug!(name = item.name(), "Upload worker stopped, dropping content");
            }
        }
    }

    /// Waits for the worker thread to exit.
    ///
    /// Returns immediately if the worker was never started or has already
    /// been joined. Call [`stop`](Self::stop) first, or this waits forever.
    ///
    /// # Panics
    ///
    /// Panics if called from the worker thread itself or if an internal
    /// mutex is poisoned.
    pub fn join(&self) {
        let handle = self
            .thread
            .lock()
            .expect("thread handle lock poisoned")
            .take();

        if let Some(handle) = handle {
            assert!(
                handle.thread().id() != std::thread::current().id(),
                "upload worker cannot join itself"
            );
            if handle.join().is_err() {
                error!(thread = %self.config.thread_name, "Upload worker thread panicked");
                self.shared.set_state(WorkerState::Stopped);
            }
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    /// Returns a snapshot of the worker's counters.
    #[must_use]
    pub fn stats(&self) -> WorkerStats {
        self.shared.stats()
    }

    /// Returns the number of items currently queued.
    #[must_use]
    pub fn queue_depth(&self) -> u64 {
        self.shared.queue_depth.load(Ordering::Relaxed)
    }

    /// Returns the worker's configuration.
    #[must_use]
    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }
}

impl Drop for AsyncUploadWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for AsyncUploadWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncUploadWorker")
            .field("thread_name", &self.config.thread_name)
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// Drain Loop
// -----------------------------------------------------------------------------

/// The consumer side, owned by the worker thread.
struct DrainLoop {
    uploader: Arc<dyn Uploader>,
    shared: Arc<Shared>,
    queue_rx: mpsc::UnboundedReceiver<UploadContent>,
    poll_interval: Duration,
    stop_policy: StopPolicy,
}

impl DrainLoop {
    async fn run(mut self) {
        debug!("Upload worker loop running");

        let mut pending = None;
        while self.shared.state() == WorkerState::Running {
            let item = match tokio::time::timeout(self.poll_interval, self.queue_rx.recv()).await {
                Ok(Some(item)) => item,
                Ok(None) => {
                    info!("Upload queue closed");
                    break;
                }
                Err(_) => {
                    self.shared.idle_polls.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };

            let queue_depth = self.shared.dequeued();

            // A stop that lands while we were waiting wins over the new item.
            if self.shared.state() != WorkerState::Running {
                pending = Some(item);
                break;
            }

            self.deliver(item, queue_depth).await;
        }

        self.finish(pending).await;
    }

    /// Closes the queue and applies the stop policy to what is left in it.
    async fn finish(&mut self, pending: Option<UploadContent>) {
        self.queue_rx.close();

        let mut remaining: Vec<UploadContent> = pending.into_iter().collect();
        // Closed: recv yields what is buffered or in flight, then None.
        while let Some(item) = self.queue_rx.recv().await {
            self.shared.dequeued();
            remaining.push(item);
        }

        let remaining_count = remaining.len() as u64;
        match self.stop_policy {
            StopPolicy::Abandon => {
                if remaining_count > 0 {
                    self.shared
                        .abandoned
                        .fetch_add(remaining_count, Ordering::Relaxed);
                    warn!(
                        abandoned = remaining_count,
                        "Upload worker stopped with content still queued, content lost"
                    );
                }
            }
            StopPolicy::Drain => {
                info!(remaining = remaining_count, "Draining upload queue before stopping");
                for (delivered, item) in (1..).zip(remaining) {
                    self.deliver(item, remaining_count - delivered).await;
                }
            }
        }

        self.shared.set_state(WorkerState::Stopped);
        let stats = self.shared.stats();
        info!(
            delivered = stats.delivered,
            failed = stats.failed,
            abandoned = stats.abandoned,
            "Upload worker stopped"
        );
    }

    /// Attempts one delivery. Every failure ends here.
    async fn deliver(&self, item: UploadContent, queue_depth: u64) {
        debug!(name = item.name(), queue_depth, "Uploading queued content");

        // Log before counting so a settled count implies the event was emitted.
        match attempt_upload(self.uploader.as_ref(), &item).await {
            UploadAttempt::Delivered => {
                self.shared.delivered.fetch_add(1, Ordering::Relaxed);
            }
            UploadAttempt::Failed(e @ UploadError::InterruptedWait { .. }) => {
                warn!(
                    name = item.name(),
                    queue_depth,
                    error = %e,
                    "Interrupted waiting for upload, delivery unconfirmed"
                );
                self.shared.failed.fetch_add(1, Ordering::Relaxed);
            }
            UploadAttempt::Failed(e) => {
                error!(
                    name = item.name(),
                    queue_depth,
                    error = %e,
                    "Upload failed, content lost"
                );
                self.shared.failed.fetch_add(1, Ordering::Relaxed);
            }
            UploadAttempt::Panicked(panic) => {
                error!(
                    name = item.name(),
                    queue_depth,
                    panic = %panic,
                    "Upload panicked, content lost"
                );
                self.shared.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
