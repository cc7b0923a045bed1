//! Store error types.
//!
//! This module defines the error types returned by every [`Store`](crate::Store)
//! backend. Backend-specific errors (SDK errors, `std::io::Error`) are flattened
//! into these variants at the backend boundary.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object not found in storage.
    #[error("object not found: {key}")]
    NotFound {
        /// The object key that was not found.
        key: String,
    },

    /// The store refused the request (permissions, quota, bad bucket).
    #[error("store rejected request for {key} [code: {code}]: {message}")]
    Rejected {
        /// The object key.
        key: String,
        /// Service error code, or `"unknown"` if the backend gave none.
        code: String,
        /// Error message.
        message: String,
    },

    /// The request never got a response from the store.
    #[error("transport failure for {key}: {message}")]
    Transport {
        /// The object key.
        key: String,
        /// Error message.
        message: String,
    },

    /// The wait for the store to respond was cut short.
    #[error("interrupted waiting on {key}: {message}")]
    Interrupted {
        /// The object key.
        key: String,
        /// Error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {operation}: {message}")]
    Io {
        /// What operation was being performed.
        operation: &'static str,
        /// Error message.
        message: String,
    },
}

/// Error loading or validating configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnv(&'static str),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl StoreError {
    /// Returns true if the store itself answered and refused the request.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Rejected { .. })
    }
}
