//! The agent run loop.
//!
//! Three producers (runtime sampler, OS sampler, reporter) feed a shared
//! registry; the reporter snapshots it every report interval into a
//! bounded queue; `rate_limit` workers drain the queue and ship batches.
//! A full queue blocks the reporter until a worker frees a slot or
//! shutdown fires — snapshots are never coalesced or silently dropped.

use std::sync::Arc;

use pulse_proto::{parse_gauge_text, Metric};
use pulse_storage::MetricRegistry;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::collector::RuntimeSampler;
use crate::error::AgentError;
use crate::sender::Sender;
use crate::system::OsSampler;

/// The collection pipeline: samplers, registry, scheduler, worker pool.
pub struct Agent {
    config: AgentConfig,
    registry: Arc<MetricRegistry>,
    sender: Arc<Sender>,
}

impl Agent {
    /// Builds the agent, loading the server's public key when configured.
    ///
    /// # Errors
    ///
    /// Fails when the configured public key file cannot be loaded.
    pub fn new(config: AgentConfig) -> Result<Self, AgentError> {
        let mut sender =
            Sender::new(config.address.clone(), config.key.clone()).with_https(config.enable_https);
        if !config.crypto_key_path.is_empty() {
            let public = pulse_codec::load_public_key(&config.crypto_key_path)?;
            sender = sender.with_public_key(public);
            info!(path = %config.crypto_key_path, "payload encryption enabled");
        }
        Ok(Self {
            config,
            registry: Arc::new(MetricRegistry::new()),
            sender: Arc::new(sender),
        })
    }

    /// Gives access to the shared registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Runs until `shutdown` flips to `true`, then drains and returns.
    ///
    /// Producers observe shutdown and exit; the reporter drops the queue
    /// sender, closing the channel; workers finish the queued snapshots
    /// and exit. Only then does this return.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        let rate_limit = self.config.rate_limit.max(1);
        let (queue_tx, queue_rx) = mpsc::channel::<Vec<Metric>>(rate_limit);
        let queue_rx = Arc::new(tokio::sync::Mutex::new(queue_rx));

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        // Producer: runtime metrics on the poll interval.
        {
            let registry = Arc::clone(&self.registry);
            let mut shutdown = shutdown.clone();
            let poll = self.config.poll_interval;
            tasks.push(tokio::spawn(async move {
                let mut sampler = RuntimeSampler::new();
                let mut ticker = interval(poll);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => sampler.sample(&registry),
                        () = shutdown_triggered(&mut shutdown) => break,
                    }
                }
                debug!("runtime sampler stopped");
            }));
        }

        // Producer: OS metrics on the poll interval.
        {
            let registry = Arc::clone(&self.registry);
            let mut shutdown = shutdown.clone();
            let poll = self.config.poll_interval;
            tasks.push(tokio::spawn(async move {
                let mut sampler = OsSampler::new();
                let mut ticker = interval(poll);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => sampler.sample(&registry),
                        () = shutdown_triggered(&mut shutdown) => break,
                    }
                }
                debug!("os sampler stopped");
            }));
        }

        // Workers: drain the queue and ship batches.
        for worker in 0..rate_limit {
            let queue_rx = Arc::clone(&queue_rx);
            let sender = Arc::clone(&self.sender);
            tasks.push(tokio::spawn(async move {
                loop {
                    let batch = { queue_rx.lock().await.recv().await };
                    let Some(batch) = batch else { break };
                    match sender.send_batch(&batch).await {
                        Ok(()) => debug!(worker, metrics = batch.len(), "snapshot shipped"),
                        Err(e) => {
                            warn!(worker, error = %e, "dropping snapshot after failed send");
                        }
                    }
                }
                debug!(worker, "worker stopped");
            }));
        }

        // Producer: snapshot on the report interval. Owns the queue
        // sender; dropping it on exit closes the queue for the workers.
        {
            let registry = Arc::clone(&self.registry);
            let mut shutdown = shutdown.clone();
            let report = self.config.report_interval;
            tasks.push(tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + report, report);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let batch = snapshot_batch(&registry);
                            if batch.is_empty() {
                                continue;
                            }
                            tokio::select! {
                                sent = queue_tx.send(batch) => {
                                    if sent.is_err() {
                                        break;
                                    }
                                }
                                () = shutdown_triggered(&mut shutdown) => break,
                            }
                        }
                        () = shutdown_triggered(&mut shutdown) => break,
                    }
                }
                debug!("reporter stopped");
            }));
        }

        for task in tasks {
            let _ = task.await;
        }
        info!("agent drained");
    }
}

/// Resolves once the shutdown flag flips to `true` (or its sender is
/// dropped, which means the process is going away anyway).
async fn shutdown_triggered(shutdown: &mut watch::Receiver<bool>) {
    if *shutdown.borrow() {
        return;
    }
    while shutdown.changed().await.is_ok() {
        if *shutdown.borrow() {
            return;
        }
    }
}

/// Turns the registry into a transient wire batch. Gauges are copied;
/// counters are drained so each accumulated delta ships exactly once.
fn snapshot_batch(registry: &MetricRegistry) -> Vec<Metric> {
    let gauges = registry.snapshot_gauges();
    let counters = registry.drain_counters();

    let mut batch = Vec::with_capacity(gauges.len() + counters.len());
    for (name, raw) in gauges {
        if let Ok(value) = parse_gauge_text(&raw) {
            batch.push(Metric::gauge(name, value));
        }
    }
    for (name, delta) in counters {
        batch.push(Metric::counter(name, delta));
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    mod snapshot_tests {
        use super::*;

        #[test]
        fn snapshot_carries_gauges_and_counter_deltas() {
            let registry = MetricRegistry::new();
            registry.put_gauge_raw("Alloc", "1024").unwrap();
            registry.add_counter("PollCount", 3);

            let batch = snapshot_batch(&registry);
            assert!(batch.contains(&Metric::gauge("Alloc", 1024.0)));
            assert!(batch.contains(&Metric::counter("PollCount", 3)));
        }

        #[test]
        fn counters_drain_between_snapshots() {
            let registry = MetricRegistry::new();
            registry.add_counter("PollCount", 2);

            let first = snapshot_batch(&registry);
            assert!(first.contains(&Metric::counter("PollCount", 2)));

            // nothing new accumulated: no counter in the second snapshot
            let second = snapshot_batch(&registry);
            assert!(second.iter().all(|m| m.id != "PollCount"));

            registry.add_counter("PollCount", 1);
            let third = snapshot_batch(&registry);
            assert!(third.contains(&Metric::counter("PollCount", 1)));
        }

        #[test]
        fn empty_registry_yields_empty_batch() {
            assert!(snapshot_batch(&MetricRegistry::new()).is_empty());
        }
    }

    mod run_tests {
        use super::*;
        use axum::routing::post;
        use parking_lot::Mutex;

        async fn spawn_batch_server() -> (std::net::SocketAddr, Arc<Mutex<Vec<Vec<Metric>>>>) {
            let received: Arc<Mutex<Vec<Vec<Metric>>>> = Arc::default();
            let captured = Arc::clone(&received);
            let app = axum::Router::new().route(
                "/updates/",
                post(move |body: axum::body::Bytes| {
                    let captured = Arc::clone(&captured);
                    async move {
                        let plain = pulse_codec::gzip::decompress(&body).unwrap();
                        let batch: Vec<Metric> = serde_json::from_slice(&plain).unwrap();
                        captured.lock().push(batch);
                        "[]"
                    }
                }),
            );
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            (addr, received)
        }

        fn fast_config(addr: std::net::SocketAddr) -> AgentConfig {
            AgentConfig {
                address: addr.to_string(),
                report_interval: Duration::from_millis(50),
                poll_interval: Duration::from_millis(10),
                key: String::new(),
                rate_limit: 2,
                enable_https: false,
                crypto_key_path: String::new(),
            }
        }

        #[tokio::test]
        async fn reports_batches_and_drains_on_shutdown() {
            let (addr, received) = spawn_batch_server().await;
            let agent = Agent::new(fast_config(addr)).unwrap();
            let (shutdown_tx, shutdown_rx) = watch::channel(false);

            let run = tokio::spawn(async move { agent.run(shutdown_rx).await });

            tokio::time::sleep(Duration::from_millis(300)).await;
            shutdown_tx.send(true).unwrap();

            // run() must return promptly once every task drained
            tokio::time::timeout(Duration::from_secs(2), run)
                .await
                .expect("agent did not drain in time")
                .unwrap();

            let batches = received.lock();
            assert!(!batches.is_empty(), "no batches arrived");
            let all: Vec<&Metric> = batches.iter().flatten().collect();
            assert!(all.iter().any(|m| m.id == "PollCount"));
            assert!(all.iter().any(|m| m.id == "Alloc"));
        }

        #[tokio::test]
        async fn poll_count_deltas_sum_to_the_number_of_polls() {
            let (addr, received) = spawn_batch_server().await;
            let agent = Agent::new(fast_config(addr)).unwrap();
            let registry = Arc::clone(agent.registry());
            let (shutdown_tx, shutdown_rx) = watch::channel(false);

            let run = tokio::spawn(async move { agent.run(shutdown_rx).await });
            tokio::time::sleep(Duration::from_millis(300)).await;
            shutdown_tx.send(true).unwrap();
            tokio::time::timeout(Duration::from_secs(2), run)
                .await
                .unwrap()
                .unwrap();

            let shipped: i64 = received
                .lock()
                .iter()
                .flatten()
                .filter(|m| m.id == "PollCount")
                .filter_map(|m| m.delta)
                .sum();
            let unshipped = registry.counter("PollCount").unwrap_or(0);
            assert!(shipped >= 1);
            // every poll is accounted for exactly once
            assert!(shipped + unshipped >= 5, "{shipped} + {unshipped}");
        }

        #[tokio::test]
        async fn shutdown_before_first_report_still_drains() {
            let (addr, _received) = spawn_batch_server().await;
            let mut config = fast_config(addr);
            config.report_interval = Duration::from_secs(3600);
            let agent = Agent::new(config).unwrap();
            let (shutdown_tx, shutdown_rx) = watch::channel(false);

            let run = tokio::spawn(async move { agent.run(shutdown_rx).await });
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown_tx.send(true).unwrap();

            tokio::time::timeout(Duration::from_secs(2), run)
                .await
                .expect("agent hung on shutdown")
                .unwrap();
        }
    }
}
