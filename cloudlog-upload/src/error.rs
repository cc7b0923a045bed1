//! Upload error types.
//!
//! Every failure an upload can hit is flattened into [`UploadError`]; store
//! and SDK error types never cross this boundary.

use cloudlog_store::StoreError;
use thiserror::Error;

/// Result type for upload operations.
pub type UploadResult<T> = Result<T, UploadError>;

/// Errors that can occur while uploading or downloading content.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Malformed input: empty content or name, empty path, key outside the
    /// namespace, undecodable download.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the input.
        reason: String,
    },

    /// The store answered and refused the request.
    #[error("store rejected request for {key} [code: {code}]: {message}")]
    BackendRejected {
        /// The object key.
        key: String,
        /// Service error code.
        code: String,
        /// Error message.
        message: String,
    },

    /// The store could not be reached or the transfer broke down.
    #[error("transport fault for {key}: {message}")]
    TransportFault {
        /// The object key.
        key: String,
        /// Error message.
        message: String,
    },

    /// The wait for the store to confirm the transfer was cut short.
    #[error("interrupted waiting on {key}: {message}")]
    InterruptedWait {
        /// The object key.
        key: String,
        /// Error message.
        message: String,
    },

    /// The background worker thread or its runtime could not be created.
    #[error("failed to spawn upload worker: {message}")]
    WorkerSpawn {
        /// Error message.
        message: String,
    },
}

impl UploadError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }
}

impl From<StoreError> for UploadError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { key } => Self::BackendRejected {
                key,
                code: "NotFound".to_string(),
                message: "object does not exist".to_string(),
            },
            StoreError::Rejected { key, code, message } => {
                Self::BackendRejected { key, code, message }
            }
            StoreError::Transport { key, message } => Self::TransportFault { key, message },
            StoreError::Interrupted { key, message } => Self::InterruptedWait { key, message },
            StoreError::Io { operation, message } => Self::TransportFault {
                key: format!("({operation})"),
                message,
            },
        }
    }
}
