//! # pulse-storage
//!
//! The metric registry and the storage backends that persist it.
//!
//! All backends speak the same [`Storage`] contract:
//!
//! - [`MemoryStorage`] — the in-process registry, nothing survives restart
//! - [`FileStorage`] — the registry plus periodic (or synchronous) JSON
//!   snapshots with atomic file rotation and restore-on-start
//! - [`PostgresStorage`] — upsert-on-conflict rows, one transaction per
//!   batch
//!
//! Counters accumulate; gauges keep the last written value and are stored
//! as their exact source text so round-trips never lose precision.

#![forbid(unsafe_code)]

pub mod error;
pub mod file;
pub mod memory;
pub mod postgres;
pub mod registry;

use std::collections::HashMap;

use async_trait::async_trait;
use pulse_proto::Metric;

pub use error::StorageError;
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use registry::MetricRegistry;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// The capability set every backend provides.
///
/// Updates are atomic per key; a batch is *not* atomic as a whole. The
/// `all_*` calls return copies the caller may mutate freely.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Stores a gauge as its raw text after validating it parses as a
    /// finite double. Invalid text leaves the store untouched.
    async fn put_gauge_raw(&self, name: &str, raw: &str) -> Result<()>;

    /// Returns the stored gauge text, if any.
    async fn gauge_raw(&self, name: &str) -> Result<Option<String>>;

    /// Adds `delta` to the named counter, creating it at zero first.
    async fn add_counter(&self, name: &str, delta: i64) -> Result<()>;

    /// Returns the accumulated counter value, if any.
    async fn counter(&self, name: &str) -> Result<Option<i64>>;

    /// Returns a copy of every gauge.
    async fn all_gauges(&self) -> Result<HashMap<String, String>>;

    /// Returns a copy of every counter.
    async fn all_counters(&self) -> Result<HashMap<String, i64>>;

    /// Applies a batch: counter records add, gauge records overwrite.
    async fn apply_batch(&self, batch: &[Metric]) -> Result<()>;

    /// Flushes and releases whatever the backend holds.
    async fn shutdown(&self) -> Result<()>;
}
