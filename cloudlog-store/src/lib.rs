//! Cloudlog Store - object store abstraction for cloudlog.
//!
//! This crate defines the [`Store`] capability the upload pipeline writes to,
//! the environment [`Namespace`] that prefixes every key, and the backends.
//! Transfer mechanics (multipart, retry, backoff) belong to the backend SDK,
//! not to this crate.
//!
//! # Design Principles (`TigerStyle`)
//!
//! - **Deterministic testing**: `SimulatedStore` enables fault injection
//! - **Flat errors**: backend-specific errors never escape a backend
//! - **Assertions**: Preconditions on keys are asserted
//! - **No unsafe code**: Safety > Performance
//!
//! # Store Backends
//!
//! - [`SimulatedStore`]: In-memory store with fault injection for tests
//! - [`FilesystemStore`]: Local filesystem store for development
//! - `S3Store`: Production S3 backend (behind `s3` feature flag)
//!
//! # Example
//!
//! ```ignore
//! use bytes::Bytes;
//! use cloudlog_store::{Namespace, SimulatedStore, Store};
//!
//! let store = SimulatedStore::new(42);
//! let namespace = Namespace::new("prod");
//!
//! let key = namespace.key_for("logs/2024-01-01.log");
//! store.put(&key, Bytes::from("hello")).await?;
//! assert_eq!(store.get(&key).await?, Bytes::from("hello"));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod filesystem;
mod namespace;
#[cfg(feature = "s3")]
mod s3;
mod store;

pub use error::{ConfigError, StoreError, StoreResult};
pub use filesystem::{FilesystemConfig, FilesystemStore};
pub use namespace::{Namespace, ENVIRONMENT_VAR};
#[cfg(feature = "s3")]
pub use s3::{S3Config, S3StorageClass, S3Store};
pub use store::{ObjectKey, SimulatedStore, Store, StoreFaultConfig};
