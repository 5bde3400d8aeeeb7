//! File-backed storage: the in-memory registry plus durable JSON snapshots.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pulse_proto::{Metric, MetricsSnapshot};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::memory::MemoryStorage;
use crate::registry::MetricRegistry;
use crate::{Result, Storage};

/// Wraps [`MemoryStorage`] and snapshots it to a JSON file.
///
/// With a positive `store_interval` a background task saves on a ticker;
/// with a zero interval every update saves synchronously. Snapshot writes
/// go to `<path>.tmp` first and are renamed into place, so a crash in the
/// middle of a save never corrupts the previous snapshot.
pub struct FileStorage {
    memory: MemoryStorage,
    path: PathBuf,
    store_interval: Duration,
    save_gate: Arc<tokio::sync::Mutex<()>>,
    stop: watch::Sender<bool>,
    saver: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl FileStorage {
    /// Opens the store, optionally restoring the previous snapshot, and
    /// starts the periodic saver when the interval is positive.
    pub async fn open(
        path: impl Into<PathBuf>,
        store_interval: Duration,
        restore: bool,
    ) -> Self {
        let path = path.into();
        let memory = MemoryStorage::new();
        let save_gate = Arc::new(tokio::sync::Mutex::new(()));
        let (stop, stop_rx) = watch::channel(false);

        if restore {
            match load_snapshot(&path).await {
                Ok(snapshot) => {
                    memory.registry().load_snapshot(&snapshot);
                    info!(
                        path = %path.display(),
                        gauges = snapshot.gauges.len(),
                        counters = snapshot.counters.len(),
                        "restored metrics from snapshot"
                    );
                }
                Err(e) => warn!(path = %path.display(), error = %e, "failed to restore snapshot"),
            }
        }

        let saver = if store_interval > Duration::ZERO {
            Some(spawn_saver(
                Arc::clone(memory.registry()),
                path.clone(),
                Arc::clone(&save_gate),
                store_interval,
                stop_rx,
            ))
        } else {
            None
        };

        Self {
            memory,
            path,
            store_interval,
            save_gate,
            stop,
            saver: parking_lot::Mutex::new(saver),
        }
    }

    /// Writes a snapshot now.
    ///
    /// # Errors
    ///
    /// Returns the final error after retrying transient I/O failures.
    pub async fn save(&self) -> Result<()> {
        save_snapshot(self.memory.registry(), &self.path, &self.save_gate).await
    }

    async fn save_after_update(&self) {
        if self.store_interval == Duration::ZERO {
            if let Err(e) = self.save().await {
                error!(path = %self.path.display(), error = %e, "failed to save snapshot after update");
            }
        }
    }
}

fn spawn_saver(
    registry: Arc<MetricRegistry>,
    path: PathBuf,
    gate: Arc<tokio::sync::Mutex<()>>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = save_snapshot(&registry, &path, &gate).await {
                        error!(path = %path.display(), error = %e, "periodic snapshot failed");
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

async fn load_snapshot(path: &Path) -> Result<MetricsSnapshot> {
    pulse_retry::retry(|| async {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    })
    .await
}

async fn save_snapshot(
    registry: &MetricRegistry,
    path: &Path,
    gate: &tokio::sync::Mutex<()>,
) -> Result<()> {
    let _guard = gate.lock().await;
    pulse_retry::retry(|| async { write_snapshot_once(registry, path) }).await
}

fn write_snapshot_once(registry: &MetricRegistry, path: &Path) -> Result<()> {
    let snapshot = registry.export_snapshot();
    let data = serde_json::to_vec(&snapshot)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, &data)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl Storage for FileStorage {
    async fn put_gauge_raw(&self, name: &str, raw: &str) -> Result<()> {
        self.memory.put_gauge_raw(name, raw).await?;
        self.save_after_update().await;
        Ok(())
    }

    async fn gauge_raw(&self, name: &str) -> Result<Option<String>> {
        self.memory.gauge_raw(name).await
    }

    async fn add_counter(&self, name: &str, delta: i64) -> Result<()> {
        self.memory.add_counter(name, delta).await?;
        self.save_after_update().await;
        Ok(())
    }

    async fn counter(&self, name: &str) -> Result<Option<i64>> {
        self.memory.counter(name).await
    }

    async fn all_gauges(&self) -> Result<HashMap<String, String>> {
        self.memory.all_gauges().await
    }

    async fn all_counters(&self) -> Result<HashMap<String, i64>> {
        self.memory.all_counters().await
    }

    async fn apply_batch(&self, batch: &[Metric]) -> Result<()> {
        self.memory.apply_batch(batch).await?;
        self.save_after_update().await;
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        let _ = self.stop.send(true);
        let handle = self.saver.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.save().await
    }
}
