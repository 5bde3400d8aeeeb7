//! On-disk snapshot layout.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The JSON document written by the file-backed store.
///
/// Gauges keep their exact source text; counters are plain integers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Gauge name to raw value text.
    #[serde(default)]
    pub gauges: HashMap<String, String>,
    /// Counter name to accumulated total.
    #[serde(default)]
    pub counters: HashMap<String, i64>,
}

impl MetricsSnapshot {
    /// Returns true when the snapshot holds no metrics at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty() && self.counters.is_empty()
    }
}
