//! Namespaced downloads.

use bytes::Bytes;
use cloudlog_store::{Namespace, Store};
use tracing::{error, info};

use crate::error::{UploadError, UploadResult};

/// Reads objects from a [`Store`] under an environment [`Namespace`].
#[derive(Debug, Clone)]
pub struct StoreDownloader<S: Store> {
    store: S,
    namespace: Namespace,
}

impl<S: Store> StoreDownloader<S> {
    /// Creates a new downloader.
    #[must_use]
    pub const fn new(store: S, namespace: Namespace) -> Self {
        Self { store, namespace }
    }

    /// Downloads the object stored under the logical `path`.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::InvalidArgument`] if `path` is empty, otherwise
    /// the translated store error.
    pub async fn get_file(&self, path: &str) -> UploadResult<Bytes> {
        if path.is_empty() {
            return Err(UploadError::invalid("path to download is empty"));
        }

        let key = self.namespace.key_for(path);
        info!(key = %key, "Downloading object");

        let data = self.store.get(&key).await.map_err(|e| {
            error!(key = %key, error = %e, "Download failed");
            UploadError::from(e)
        })?;

        info!(key = %key, size_bytes = data.len(), "Object downloaded");
        Ok(data)
    }

    /// Downloads the object stored under `path` as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Same as [`get_file`](Self::get_file), plus
    /// [`UploadError::InvalidArgument`] if the object is not valid UTF-8.
    pub async fn get_file_as_string(&self, path: &str) -> UploadResult<String> {
        let data = self.get_file(path).await?;
        String::from_utf8(data.to_vec())
            .map_err(|e| UploadError::invalid(format!("object at '{path}' is not UTF-8: {e}")))
    }
}
