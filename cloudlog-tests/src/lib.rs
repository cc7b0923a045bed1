//! Cloudlog Tests - integration and fault-injection tests for cloudlog.
//!
//! Tests drive the real upload worker against `SimulatedStore` (deterministic
//! fault injection) and `FilesystemStore`.
//!
//! ## Test Organization
//!
//! **Integration Tests** (`*_tests.rs`):
//! - `upload_worker_tests`: Background worker delivery, ordering, failure isolation
//! - `filesystem_pipeline_tests`: End-to-end pipeline over the local filesystem
//!
//! **Support Modules**:
//! - `scenarios`: Worker setup, settle helpers, tracing initialization, event capture
//!
//! ## Naming Conventions
//!
//! - Integration tests: `test_<component>_<scenario>`
//! - Unit tests: Inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod scenarios;

#[cfg(test)]
mod upload_worker_tests;
