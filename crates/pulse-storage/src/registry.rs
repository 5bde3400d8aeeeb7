//! Thread-safe in-memory metric registry.

use std::collections::HashMap;

use parking_lot::RwLock;
use pulse_proto::{format_gauge, parse_gauge_text, Metric, MetricKind, MetricsSnapshot};

use crate::Result;

/// Two tables keyed by metric name: gauge text and counter totals.
///
/// Every update is atomic per key; snapshots are deep copies, so callers
/// may mutate what they get back without touching the registry.
#[derive(Debug, Default)]
pub struct MetricRegistry {
    gauges: RwLock<HashMap<String, String>>,
    counters: RwLock<HashMap<String, i64>>,
}

impl MetricRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a gauge as its exact source text.
    ///
    /// # Errors
    ///
    /// Rejects text that does not parse as a finite double; the registry
    /// is left untouched in that case.
    pub fn put_gauge_raw(&self, name: &str, raw: &str) -> Result<()> {
        parse_gauge_text(raw)?;
        self.gauges.write().insert(name.to_string(), raw.to_string());
        Ok(())
    }

    /// Returns the stored gauge text.
    #[must_use]
    pub fn gauge_raw(&self, name: &str) -> Option<String> {
        self.gauges.read().get(name).cloned()
    }

    /// Adds `delta` to the named counter (wrapping on i64 overflow).
    pub fn add_counter(&self, name: &str, delta: i64) {
        let mut counters = self.counters.write();
        let entry = counters.entry(name.to_string()).or_insert(0);
        *entry = entry.wrapping_add(delta);
    }

    /// Overwrites the named counter; used when rehydrating a snapshot so
    /// restored totals are not added on top of themselves.
    pub fn set_counter(&self, name: &str, value: i64) {
        self.counters.write().insert(name.to_string(), value);
    }

    /// Returns the accumulated counter value.
    #[must_use]
    pub fn counter(&self, name: &str) -> Option<i64> {
        self.counters.read().get(name).copied()
    }

    /// Returns a copy of every gauge.
    #[must_use]
    pub fn snapshot_gauges(&self) -> HashMap<String, String> {
        self.gauges.read().clone()
    }

    /// Returns a copy of every counter.
    #[must_use]
    pub fn snapshot_counters(&self) -> HashMap<String, i64> {
        self.counters.read().clone()
    }

    /// Takes every counter out of the registry, leaving it empty.
    ///
    /// The agent reports counters as deltas; draining at snapshot time
    /// ships each accumulated increment exactly once.
    #[must_use]
    pub fn drain_counters(&self) -> HashMap<String, i64> {
        std::mem::take(&mut *self.counters.write())
    }

    /// Applies a batch of records; counters add, gauges overwrite.
    ///
    /// Records missing the value field for their kind are skipped.
    pub fn apply_batch(&self, batch: &[Metric]) {
        for metric in batch {
            match metric.kind {
                MetricKind::Counter => {
                    if let Some(delta) = metric.delta {
                        self.add_counter(&metric.id, delta);
                    }
                }
                MetricKind::Gauge => {
                    if let Some(value) = metric.value {
                        // format_gauge always yields parseable text
                        let _ = self.put_gauge_raw(&metric.id, &format_gauge(value));
                    }
                }
            }
        }
    }

    /// Exports the registry as a snapshot document.
    #[must_use]
    pub fn export_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            gauges: self.snapshot_gauges(),
            counters: self.snapshot_counters(),
        }
    }

    /// Rehydrates the registry from a snapshot document.
    ///
    /// Counters are inserted as-is (no double accumulation); gauge text
    /// that no longer validates is dropped with a warning.
    pub fn load_snapshot(&self, snapshot: &MetricsSnapshot) {
        for (name, raw) in &snapshot.gauges {
            if self.put_gauge_raw(name, raw).is_err() {
                tracing::warn!(metric = %name, raw = %raw, "dropping unparseable gauge from snapshot");
            }
        }
        for (name, value) in &snapshot.counters {
            self.set_counter(name, *value);
        }
    }
}
