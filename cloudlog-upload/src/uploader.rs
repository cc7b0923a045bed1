//! Synchronous upload capability.
//!
//! [`Uploader::upload`] completes only once the store has confirmed the
//! object, and surfaces every failure to its caller. [`Uploader::upload_suppressed`]
//! performs the same operation for callers with no recovery action: failures,
//! including panics inside the uploader, are logged and swallowed.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use bytes::Bytes;
use cloudlog_store::{Namespace, ObjectKey, Store};
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::content::UploadContent;
use crate::error::{UploadError, UploadResult};

// -----------------------------------------------------------------------------
// Uploader Trait
// -----------------------------------------------------------------------------

/// Upload capability used directly by callers and by the background worker.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Uploads `item` and waits for the store to confirm it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the upload, cannot be reached,
    /// or the wait for confirmation is cut short.
    async fn upload(&self, item: &UploadContent) -> UploadResult<()>;

    /// Uploads `item`, logging instead of returning any failure.
    ///
    /// Returns `true` if the upload was confirmed. Never panics because of
    /// the upload itself.
    async fn upload_suppressed(&self, item: &UploadContent) -> bool {
        match attempt_upload(self, item).await {
            UploadAttempt::Delivered => true,
            UploadAttempt::Failed(e) => {
                warn!(name = item.name(), error = %e, "Upload failed, error suppressed");
                false
            }
            UploadAttempt::Panicked(panic) => {
                warn!(name = item.name(), panic = %panic, "Upload panicked, error suppressed");
                false
            }
        }
    }
}

/// Outcome of a single upload attempt.
#[derive(Debug)]
pub(crate) enum UploadAttempt {
    /// The store confirmed the object.
    Delivered,
    /// The upload returned an error.
    Failed(UploadError),
    /// The uploader panicked; holds the panic message.
    Panicked(String),
}

/// Runs one upload, catching a panic inside the uploader. Logs nothing;
/// the caller owns the failure event.
pub(crate) async fn attempt_upload<U: Uploader + ?Sized>(
    uploader: &U,
    item: &UploadContent,
) -> UploadAttempt {
    match AssertUnwindSafe(uploader.upload(item)).catch_unwind().await {
        Ok(Ok(())) => UploadAttempt::Delivered,
        Ok(Err(e)) => UploadAttempt::Failed(e),
        Err(payload) => UploadAttempt::Panicked(panic_message(payload.as_ref()).to_string()),
    }
}

/// Extracts a printable message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

// -----------------------------------------------------------------------------
// StoreUploader
// -----------------------------------------------------------------------------

/// [`Uploader`] that writes to a [`Store`] under an environment [`Namespace`].
#[derive(Debug, Clone)]
pub struct StoreUploader<S: Store> {
    store: S,
    namespace: Namespace,
}

impl<S: Store> StoreUploader<S> {
    /// Creates a new uploader.
    #[must_use]
    pub fn new(store: S, namespace: Namespace) -> Self {
        info!(environment = %namespace, "Created store uploader");
        Self { store, namespace }
    }

    /// Returns the store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns the namespace.
    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Uploads raw bytes under a logical path.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::InvalidArgument`] if `path` is empty, otherwise
    /// the same errors as [`Uploader::upload`].
    pub async fn upload_path(&self, path: &str, data: Bytes) -> UploadResult<()> {
        if path.is_empty() {
            return Err(UploadError::invalid("no path to upload to"));
        }
        let key = self.namespace.key_for(path);
        self.upload_object(&key, data).await
    }

    /// Uploads raw bytes under a logical path, logging instead of returning
    /// any failure. Returns `true` if the upload was confirmed.
    pub async fn upload_path_suppressed(&self, path: &str, data: Bytes) -> bool {
        match self.upload_path(path, data).await {
            Ok(()) => true,
            Err(e) => {
                warn!(path, error = %e, "Upload failed, error suppressed");
                false
            }
        }
    }

    /// Uploads bytes under a fully-qualified key.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::InvalidArgument`] if `key` is not under this
    /// uploader's namespace; otherwise the translated store error.
    pub async fn upload_object(&self, key: &ObjectKey, data: Bytes) -> UploadResult<()> {
        if !self.namespace.contains(key) {
            return Err(UploadError::invalid(format!(
                "key '{key}' is outside environment '{}'",
                self.namespace
            )));
        }

        info!(key = %key, size_bytes = data.len(), "Uploading object");

        // Failures are the caller's to log.
        match self.store.put(key, data).await.map_err(UploadError::from) {
            Ok(()) => {
                info!(key = %key, "Object uploaded");
                Ok(())
            }
            Err(e) => {
                debug!(key = %key, error = %e, "Store put failed");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl<S: Store> Uploader for StoreUploader<S> {
    async fn upload(&self, item: &UploadContent) -> UploadResult<()> {
        let key = self.namespace.key_for(item.name());
        self.upload_object(&key, item.content().clone()).await
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
