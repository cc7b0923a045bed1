//! Object store abstraction.
//!
//! This module provides a trait-based abstraction allowing different
//! backends (S3, local filesystem, simulated in-memory for tests).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{StoreError, StoreResult};

// -----------------------------------------------------------------------------
// ObjectKey
// -----------------------------------------------------------------------------

/// Fully-qualified object key in the storage backend.
///
/// Keys produced by [`Namespace`](crate::Namespace) follow the format
/// `{environment}/{path}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Creates a new object key from a string.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the key is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// -----------------------------------------------------------------------------
// Store Trait
// -----------------------------------------------------------------------------

/// Object store backend trait.
///
/// Implementations must be `Send + Sync` for use across threads and tasks.
/// Transfer mechanics (multipart, retries, backoff) are the backend's concern.
#[async_trait]
pub trait Store: Send + Sync {
    /// Uploads an object, replacing any existing object under the same key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the upload or cannot be reached.
    async fn put(&self, key: &ObjectKey, data: Bytes) -> StoreResult<()>;

    /// Downloads an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the object doesn't exist or the download fails.
    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn put(&self, key: &ObjectKey, data: Bytes) -> StoreResult<()> {
        (**self).put(key, data).await
    }

    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes> {
        (**self).get(key).await
    }
}

// -----------------------------------------------------------------------------
// Fault Configuration
// -----------------------------------------------------------------------------

/// Configuration for fault injection in [`SimulatedStore`].
#[derive(Debug, Clone, Default)]
pub struct StoreFaultConfig {
    /// Probability of put failing with a transport error. Range: 0.0 - 1.0.
    pub put_fail_rate: f64,
    /// Probability of get failing with a transport error. Range: 0.0 - 1.0.
    pub get_fail_rate: f64,
    /// If true, next put will fail with a transport error (one-shot).
    pub force_put_fail: bool,
    /// If true, next put will be interrupted (one-shot).
    pub force_put_interrupt: bool,
    /// If true, next get will fail with a transport error (one-shot).
    pub force_get_fail: bool,
    /// Keys the store always refuses on put.
    pub rejected_keys: HashSet<ObjectKey>,
    /// Latency added to every put before it completes.
    pub put_delay: Option<Duration>,
}

impl StoreFaultConfig {
    /// Creates a fault config with no faults.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Creates a fault config that simulates a flaky store.
    #[must_use]
    pub fn flaky() -> Self {
        Self {
            put_fail_rate: 0.01,
            get_fail_rate: 0.01,
            ..Self::default()
        }
    }

    /// Sets the put failure rate.
    ///
    /// # Panics
    ///
    /// Panics if rate is not in range 0.0..=1.0.
    #[must_use]
    pub fn with_put_fail_rate(mut self, rate: f64) -> Self {
        assert!((0.0..=1.0).contains(&rate), "rate must be in 0.0..=1.0");
        self.put_fail_rate = rate;
        self
    }

    /// Sets the get failure rate.
    ///
    /// # Panics
    ///
    /// Panics if rate is not in range 0.0..=1.0.
    #[must_use]
    pub fn with_get_fail_rate(mut self, rate: f64) -> Self {
        assert!((0.0..=1.0).contains(&rate), "rate must be in 0.0..=1.0");
        self.get_fail_rate = rate;
        self
    }

    /// Forces the next put to fail (one-shot).
    #[must_use]
    pub const fn with_force_put_fail(mut self) -> Self {
        self.force_put_fail = true;
        self
    }

    /// Forces the next put to be interrupted (one-shot).
    #[must_use]
    pub const fn with_force_put_interrupt(mut self) -> Self {
        self.force_put_interrupt = true;
        self
    }

    /// Forces the next get to fail (one-shot).
    #[must_use]
    pub const fn with_force_get_fail(mut self) -> Self {
        self.force_get_fail = true;
        self
    }

    /// Makes every put to `key` fail with a rejection.
    #[must_use]
    pub fn with_rejected_key(mut self, key: ObjectKey) -> Self {
        self.rejected_keys.insert(key);
        self
    }

    /// Delays every put by `delay`.
    #[must_use]
    pub const fn with_put_delay(mut self, delay: Duration) -> Self {
        self.put_delay = Some(delay);
        self
    }
}

// -----------------------------------------------------------------------------
// SimulatedStore
// -----------------------------------------------------------------------------

/// In-memory simulated store for deterministic testing.
///
/// Keeps all objects in memory and supports configurable fault injection.
/// Every put attempt is recorded in order, including failed ones, so tests
/// can assert on delivery order and attempt counts.
///
/// # Determinism
///
/// Probabilistic faults use a hash of the seed and an operation counter, so
/// the same seed produces the same fault pattern across runs.
///
/// # Cloning
///
/// Clones share the same underlying state (via `Arc`).
#[derive(Debug, Clone)]
pub struct SimulatedStore {
    objects: Arc<Mutex<HashMap<ObjectKey, Bytes>>>,
    /// Every put attempt, in arrival order.
    attempts: Arc<Mutex<Vec<ObjectKey>>>,
    fault_config: Arc<Mutex<StoreFaultConfig>>,
    seed: u64,
    counter: Arc<AtomicU64>,
}

impl SimulatedStore {
    /// Creates a new simulated store with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_faults(seed, StoreFaultConfig::default())
    }

    /// Creates a new simulated store with fault injection enabled.
    #[must_use]
    pub fn with_faults(seed: u64, config: StoreFaultConfig) -> Self {
        Self {
            objects: Arc::new(Mutex::new(HashMap::new())),
            attempts: Arc::new(Mutex::new(Vec::new())),
            fault_config: Arc::new(Mutex::new(config)),
            seed,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the fault configuration for modification.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn fault_config(&self) -> std::sync::MutexGuard<'_, StoreFaultConfig> {
        self.fault_config.lock().expect("fault config lock poisoned")
    }

    /// Returns the stored content for `key`, if any.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn get_raw_content(&self, key: &ObjectKey) -> Option<Bytes> {
        let objects = self.objects.lock().expect("objects lock poisoned");
        objects.get(key).cloned()
    }

    /// Returns a snapshot of all stored objects, sorted by key.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(ObjectKey, Bytes)> {
        let objects = self.objects.lock().expect("objects lock poisoned");
        let mut entries: Vec<_> = objects
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Returns every put attempt in arrival order, including failed ones.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn put_attempts(&self) -> Vec<ObjectKey> {
        self.attempts.lock().expect("attempts lock poisoned").clone()
    }

    /// Returns the number of objects stored.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.lock().expect("objects lock poisoned").len()
    }

    /// Applies forced and per-key put faults, returning the injected delay and
    /// random failure rate for the rest of the put.
    fn check_put_faults(&self, key: &ObjectKey) -> StoreResult<(Option<Duration>, f64)> {
        let mut config = self.fault_config.lock().expect("fault config lock poisoned");
        if config.force_put_fail {
            config.force_put_fail = false;
            return Err(StoreError::Transport {
                key: key.to_string(),
                message: "simulated upload failure (forced)".to_string(),
            });
        }
        if config.force_put_interrupt {
            config.force_put_interrupt = false;
            return Err(StoreError::Interrupted {
                key: key.to_string(),
                message: "simulated interrupted wait (forced)".to_string(),
            });
        }
        if config.rejected_keys.contains(key) {
            return Err(StoreError::Rejected {
                key: key.to_string(),
                code: "AccessDenied".to_string(),
                message: "simulated rejection".to_string(),
            });
        }
        Ok((config.put_delay, config.put_fail_rate))
    }

    /// Deterministic RNG based on seed and counter.
    fn should_inject_fault(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let hash = self
            .seed
            .wrapping_add(counter)
            .wrapping_mul(0x5851_f42d_4c95_7f2d);
        // Precision loss is fine for a probability.
        #[allow(clippy::cast_precision_loss)]
        let normalized = (hash as f64) / (u64::MAX as f64);
        normalized < rate
    }
}

#[allow(clippy::significant_drop_tightening)]
#[async_trait]
impl Store for SimulatedStore {
    async fn put(&self, key: &ObjectKey, data: Bytes) -> StoreResult<()> {
        assert!(!key.is_empty(), "object key must not be empty");

        self.attempts
            .lock()
            .expect("attempts lock poisoned")
            .push(key.clone());

        let (delay, put_fail_rate) = self.check_put_faults(key)?;

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.should_inject_fault(put_fail_rate) {
            return Err(StoreError::Transport {
                key: key.to_string(),
                message: "simulated upload failure (random)".to_string(),
            });
        }

        let mut objects = self.objects.lock().expect("objects lock poisoned");
        objects.insert(key.clone(), data);
        Ok(())
    }

    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes> {
        assert!(!key.is_empty(), "object key must not be empty");

        let mut config = self.fault_config.lock().expect("fault config lock poisoned");
        if config.force_get_fail {
            config.force_get_fail = false;
            drop(config);
            return Err(StoreError::Transport {
                key: key.to_string(),
                message: "simulated download failure (forced)".to_string(),
            });
        }
        let get_fail_rate = config.get_fail_rate;
        drop(config);

        if self.should_inject_fault(get_fail_rate) {
            return Err(StoreError::Transport {
                key: key.to_string(),
                message: "simulated download failure (random)".to_string(),
            });
        }

        let objects = self.objects.lock().expect("objects lock poisoned");
        objects.get(key).cloned().ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_store_put_get() {
        let store = SimulatedStore::new(42);
        let key = ObjectKey::new("test/a.log");

        store.put(&key, Bytes::from("payload")).await.unwrap();

        assert_eq!(store.object_count(), 1);
        assert_eq!(store.get(&key).await.unwrap(), Bytes::from("payload"));
        assert_eq!(store.put_attempts(), vec![key]);
    }

    #[tokio::test]
    async fn test_simulated_store_not_found() {
        let store = SimulatedStore::new(42);
        let result = store.get(&ObjectKey::new("test/missing")).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_simulated_store_forced_put_failure_is_one_shot() {
        let store = SimulatedStore::with_faults(42, StoreFaultConfig::none().with_force_put_fail());
        let key = ObjectKey::new("test/a.log");

        let result = store.put(&key, Bytes::from("data")).await;
        assert!(matches!(result, Err(StoreError::Transport { .. })));

        store.put(&key, Bytes::from("data")).await.unwrap();
        assert_eq!(store.put_attempts().len(), 2);
        assert_eq!(store.object_count(), 1);
    }

    #[tokio::test]
    async fn test_simulated_store_forced_interrupt() {
        let store =
            SimulatedStore::with_faults(42, StoreFaultConfig::none().with_force_put_interrupt());
        let result = store.put(&ObjectKey::new("test/a"), Bytes::from("x")).await;
        assert!(matches!(result, Err(StoreError::Interrupted { .. })));
    }

    #[tokio::test]
    async fn test_simulated_store_rejected_key() {
        let rejected = ObjectKey::new("test/b");
        let store = SimulatedStore::with_faults(
            42,
            StoreFaultConfig::none().with_rejected_key(rejected.clone()),
        );

        let result = store.put(&rejected, Bytes::from("y")).await;
        assert!(matches!(result, Err(StoreError::Rejected { .. })));

        // Rejection is sticky, unlike forced failures.
        let result = store.put(&rejected, Bytes::from("y")).await;
        assert!(matches!(result, Err(StoreError::Rejected { .. })));

        store.put(&ObjectKey::new("test/c"), Bytes::from("z")).await.unwrap();
        assert_eq!(store.object_count(), 1);
    }

    #[tokio::test]
    async fn test_simulated_store_forced_get_failure() {
        let store = SimulatedStore::new(42);
        let key = ObjectKey::new("test/a");
        store.put(&key, Bytes::from("x")).await.unwrap();

        store.fault_config().force_get_fail = true;
        assert!(store.get(&key).await.is_err());
        assert!(store.get(&key).await.is_ok());
    }

    #[tokio::test]
    async fn test_simulated_store_clone_shares_state() {
        let store = SimulatedStore::new(42);
        let clone = store.clone();
        let key = ObjectKey::new("test/shared");

        clone.put(&key, Bytes::from("x")).await.unwrap();
        assert_eq!(store.get_raw_content(&key), Some(Bytes::from("x")));
    }

    #[tokio::test]
    async fn test_simulated_store_deterministic_faults() {
        let config = StoreFaultConfig::none().with_put_fail_rate(0.5);
        let store1 = SimulatedStore::with_faults(12345, config.clone());
        let store2 = SimulatedStore::with_faults(12345, config);
        let key = ObjectKey::new("test/a");

        let mut results1 = Vec::new();
        let mut results2 = Vec::new();
        for _ in 0..10 {
            results1.push(store1.put(&key, Bytes::from("x")).await.is_ok());
            results2.push(store2.put(&key, Bytes::from("x")).await.is_ok());
        }

        assert_eq!(results1, results2);
    }

    #[tokio::test]
    async fn test_arc_store_delegates() {
        let inner = SimulatedStore::new(7);
        let shared: Arc<dyn Store> = Arc::new(inner.clone());
        let key = ObjectKey::new("test/arc");

        shared.put(&key, Bytes::from("x")).await.unwrap();
        assert_eq!(inner.object_count(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_sorted_by_key() {
        let store = SimulatedStore::new(1);
        store.put(&ObjectKey::new("t/c"), Bytes::from("3")).await.unwrap();
        store.put(&ObjectKey::new("t/a"), Bytes::from("1")).await.unwrap();

        let keys: Vec<_> = store
            .snapshot()
            .into_iter()
            .map(|(k, _)| k.as_str().to_string())
            .collect();
        assert_eq!(keys, vec!["t/a", "t/c"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_delayed_put_runs_on_spawned_tasks() {
        let store = SimulatedStore::with_faults(
            1,
            StoreFaultConfig::none().with_put_delay(Duration::from_millis(10)),
        );

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .put(&ObjectKey::new(format!("t/{i}")), Bytes::from("x"))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.object_count(), 4);
        assert_eq!(store.put_attempts().len(), 4);
    }
}
