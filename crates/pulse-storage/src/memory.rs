//! In-memory backend: the registry with a no-op shutdown.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pulse_proto::Metric;

use crate::registry::MetricRegistry;
use crate::{Result, Storage};

/// Storage backend that keeps everything in the process registry.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    registry: Arc<MetricRegistry>,
}

impl MemoryStorage {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gives access to the underlying registry; the file-backed store
    /// composes this to run its snapshot cycle.
    #[must_use]
    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put_gauge_raw(&self, name: &str, raw: &str) -> Result<()> {
        self.registry.put_gauge_raw(name, raw)
    }

    async fn gauge_raw(&self, name: &str) -> Result<Option<String>> {
        Ok(self.registry.gauge_raw(name))
    }

    async fn add_counter(&self, name: &str, delta: i64) -> Result<()> {
        self.registry.add_counter(name, delta);
        Ok(())
    }

    async fn counter(&self, name: &str) -> Result<Option<i64>> {
        Ok(self.registry.counter(name))
    }

    async fn all_gauges(&self) -> Result<HashMap<String, String>> {
        Ok(self.registry.snapshot_gauges())
    }

    async fn all_counters(&self) -> Result<HashMap<String, i64>> {
        Ok(self.registry.snapshot_counters())
    }

    async fn apply_batch(&self, batch: &[Metric]) -> Result<()> {
        self.registry.apply_batch(batch);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
