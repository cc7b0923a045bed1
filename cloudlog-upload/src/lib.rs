//! Cloudlog Upload - synchronous and fire-and-forget uploads for cloudlog.
//!
//! This crate turns named payloads into objects in a [`Store`](cloudlog_store::Store)
//! under an environment [`Namespace`](cloudlog_store::Namespace).
//!
//! # Two Ways to Upload
//!
//! - [`Uploader::upload`]: waits for the store and returns every failure
//! - [`AsyncUploadWorker::enqueue`]: returns immediately; a single background
//!   thread delivers items one at a time
//!
//! The background path is fire-and-forget. A failed delivery is logged and the
//! item is lost; the producer is never told. Items still queued when the
//! worker stops are dropped unless [`StopPolicy::Drain`] is configured.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cloudlog_store::{Namespace, SimulatedStore};
//! use cloudlog_upload::{AsyncUploadWorker, StoreUploader, UploadContent, WorkerConfig};
//!
//! let uploader = StoreUploader::new(SimulatedStore::new(42), Namespace::new("prod"));
//! let worker = AsyncUploadWorker::new(Arc::new(uploader), WorkerConfig::default());
//! worker.start()?;
//!
//! worker.enqueue(UploadContent::new("line 1\n", "logs/app.log")?);
//!
//! worker.stop();
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod content;
mod downloader;
mod error;
mod uploader;
mod worker;

pub use content::UploadContent;
pub use downloader::StoreDownloader;
pub use error::{UploadError, UploadResult};
pub use uploader::{StoreUploader, Uploader};
pub use worker::{AsyncUploadWorker, StopPolicy, WorkerConfig, WorkerState, WorkerStats};

/// Upload worker limits.
pub mod limits {
    /// Default wait on an empty queue before the stop flag is re-checked.
    pub const POLL_INTERVAL_MS_DEFAULT: u64 = 1000;

    /// Poll interval used by `WorkerConfig::for_testing`.
    pub const POLL_INTERVAL_MS_TESTING: u64 = 10;

    /// Default name of the worker thread.
    pub const THREAD_NAME_DEFAULT: &str = "upload-worker";
}
