//! Filesystem-based store for local development and testing.
//!
//! Objects are written as files at `{base_path}/{key}`, so a namespaced key
//! such as `prod/logs/a.log` lands at `{base_path}/prod/logs/a.log`.
//!
//! # Use Cases
//!
//! - Local development without cloud credentials
//! - Integration testing without network dependencies

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::store::{ObjectKey, Store};

// -----------------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------------

/// Configuration for [`FilesystemStore`].
#[derive(Debug, Clone)]
pub struct FilesystemConfig {
    /// Base directory for all objects.
    pub base_path: PathBuf,

    /// Whether to call fsync after writes.
    ///
    /// Default: `true`. Set to `false` for faster tests.
    pub sync_on_write: bool,

    /// Create the base directory if it doesn't exist.
    ///
    /// Default: `true`.
    pub create_if_missing: bool,
}

impl FilesystemConfig {
    /// Creates a new configuration with the given base path.
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            sync_on_write: true,
            create_if_missing: true,
        }
    }

    /// Creates a configuration for tests (no fsync).
    #[must_use]
    pub fn for_testing(base_path: impl Into<PathBuf>) -> Self {
        Self {
            sync_on_write: false,
            ..Self::new(base_path)
        }
    }
}

// -----------------------------------------------------------------------------
// FilesystemStore
// -----------------------------------------------------------------------------

/// Store backed by the local filesystem.
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    config: FilesystemConfig,
}

impl FilesystemStore {
    /// Creates a new filesystem store.
    ///
    /// # Errors
    ///
    /// Returns an error if `create_if_missing` is set and the base directory
    /// cannot be created.
    ///
    /// # Panics
    ///
    /// Panics if `base_path` is empty.
    pub async fn new(config: FilesystemConfig) -> StoreResult<Self> {
        assert!(
            !config.base_path.as_os_str().is_empty(),
            "base_path must not be empty"
        );

        if config.create_if_missing {
            tokio::fs::create_dir_all(&config.base_path)
                .await
                .map_err(|e| StoreError::Io {
                    operation: "create_base_dir",
                    message: format!(
                        "failed to create base directory '{}': {e}",
                        config.base_path.display()
                    ),
                })?;
        }

        info!(base_path = %config.base_path.display(), "Created filesystem store");
        Ok(Self { config })
    }

    /// Returns the base directory.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.config.base_path
    }

    /// Returns the filesystem path for a key.
    ///
    /// Keys that would escape the base directory are refused.
    fn object_path(&self, key: &ObjectKey) -> StoreResult<PathBuf> {
        let relative = Path::new(key.as_str());
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(StoreError::Rejected {
                key: key.to_string(),
                code: "InvalidKey".to_string(),
                message: "key must be a relative path without '..'".to_string(),
            });
        }
        Ok(self.config.base_path.join(relative))
    }

    async fn write_atomically(&self, key: &ObjectKey, path: &Path, data: &[u8]) -> StoreResult<()> {
        let mut temp_name = path.file_name().map_or_else(OsString::new, OsString::from);
        temp_name.push(".upload-tmp");
        let temp_path = path.with_file_name(temp_name);

        let write_result = async {
            let mut file = tokio::fs::File::create(&temp_path)
                .await
                .map_err(|e| io_error(key, "failed to create temp file", &e))?;

            tokio::io::AsyncWriteExt::write_all(&mut file, data)
                .await
                .map_err(|e| io_error(key, "failed to write data", &e))?;

            if self.config.sync_on_write {
                file.sync_all()
                    .await
                    .map_err(|e| io_error(key, "failed to sync file", &e))?;
            }

            Ok::<(), StoreError>(())
        }
        .await;

        if let Err(e) = write_result {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }

        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| io_error(key, "failed to rename temp file", &e))
    }
}

fn io_error(key: &ObjectKey, context: &str, e: &std::io::Error) -> StoreError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        StoreError::Rejected {
            key: key.to_string(),
            code: "PermissionDenied".to_string(),
            message: format!("{context}: {e}"),
        }
    } else {
        StoreError::Transport {
            key: key.to_string(),
            message: format!("{context}: {e}"),
        }
    }
}

#[async_trait]
impl Store for FilesystemStore {
    async fn put(&self, key: &ObjectKey, data: Bytes) -> StoreResult<()> {
        assert!(!key.is_empty(), "key must not be empty");

        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(key, "failed to create parent directories", &e))?;
        }

        self.write_atomically(key, &path, &data).await
    }

    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes> {
        assert!(!key.is_empty(), "key must not be empty");

        let path = self.object_path(key)?;
        let data = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound {
                    key: key.to_string(),
                }
            } else {
                io_error(key, "failed to read file", &e)
            }
        })?;

        Ok(Bytes::from(data))
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
