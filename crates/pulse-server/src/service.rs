//! Update and read semantics on top of the storage contract.

use std::sync::Arc;

use pulse_proto::{format_gauge, parse_counter_text, parse_gauge_text, Metric, MetricKind};
use pulse_storage::Storage;

use crate::error::ServiceError;

/// Validates incoming values, applies the per-kind update semantics and
/// renders stored values back to text.
///
/// Gauges are written through as their exact source text (the store
/// validates it); rendering parses the stored text and trims trailing
/// zeros so `42.0` reads back as `42`.
#[derive(Clone)]
pub struct MetricsService {
    storage: Arc<dyn Storage>,
}

impl MetricsService {
    /// Creates a service over the given backend.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Gives access to the backend, for the lifecycle controller.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Applies a single update from text, as arriving on the URL endpoint.
    ///
    /// # Errors
    ///
    /// Validation failures map to 400, storage failures to 500.
    pub async fn update(&self, kind: &str, name: &str, value: &str) -> Result<(), ServiceError> {
        if name.is_empty() {
            return Err(ServiceError::NameRequired);
        }
        let kind = MetricKind::parse(kind).map_err(|_| ServiceError::UnsupportedType)?;
        match kind {
            MetricKind::Counter => {
                let delta = parse_counter_text(value)?;
                self.storage.add_counter(name, delta).await?;
            }
            MetricKind::Gauge => {
                parse_gauge_text(value)?;
                self.storage.put_gauge_raw(name, value).await?;
            }
        }
        Ok(())
    }

    /// Renders the current value of a metric as text.
    ///
    /// # Errors
    ///
    /// `NotFound` when the metric does not exist under the given kind.
    pub async fn value(&self, kind: &str, name: &str) -> Result<String, ServiceError> {
        let kind = MetricKind::parse(kind).map_err(|_| ServiceError::UnsupportedType)?;
        match kind {
            MetricKind::Counter => {
                let value = self
                    .storage
                    .counter(name)
                    .await?
                    .ok_or(ServiceError::NotFound)?;
                Ok(value.to_string())
            }
            MetricKind::Gauge => {
                let raw = self
                    .storage
                    .gauge_raw(name)
                    .await?
                    .ok_or(ServiceError::NotFound)?;
                let value = parse_gauge_text(&raw)?;
                Ok(format_gauge(value))
            }
        }
    }

    /// Reads the current record for `(kind, name)`, for JSON echoes.
    ///
    /// # Errors
    ///
    /// `NotFound` when the metric does not exist under the given kind.
    pub async fn read_metric(&self, kind: MetricKind, name: &str) -> Result<Metric, ServiceError> {
        match kind {
            MetricKind::Counter => {
                let value = self
                    .storage
                    .counter(name)
                    .await?
                    .ok_or(ServiceError::NotFound)?;
                Ok(Metric::counter(name, value))
            }
            MetricKind::Gauge => {
                let raw = self
                    .storage
                    .gauge_raw(name)
                    .await?
                    .ok_or(ServiceError::NotFound)?;
                Ok(Metric::gauge(name, parse_gauge_text(&raw)?))
            }
        }
    }

    /// Returns every metric rendered to text, sorted by name.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn all(&self) -> Result<Vec<(String, String)>, ServiceError> {
        let mut entries: Vec<(String, String)> = Vec::new();
        for (name, raw) in self.storage.all_gauges().await? {
            let rendered = parse_gauge_text(&raw)
                .map(format_gauge)
                .unwrap_or(raw);
            entries.push((name, rendered));
        }
        for (name, value) in self.storage.all_counters().await? {
            entries.push((name, value.to_string()));
        }
        entries.sort();
        Ok(entries)
    }

    /// Applies a validated batch and echoes the post-update records.
    ///
    /// Records that vanish between write and re-read are skipped rather
    /// than failing the whole response.
    ///
    /// # Errors
    ///
    /// Propagates storage failures from the batch write.
    pub async fn apply_batch(&self, batch: &[Metric]) -> Result<Vec<Metric>, ServiceError> {
        self.storage.apply_batch(batch).await?;
        let mut echoes = Vec::with_capacity(batch.len());
        for metric in batch {
            match self.read_metric(metric.kind, &metric.id).await {
                Ok(echo) => echoes.push(echo),
                Err(ServiceError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(echoes)
    }
}
