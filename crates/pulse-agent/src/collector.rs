//! Runtime metric sampling.

use pulse_storage::MetricRegistry;
use rand::Rng;
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::alloc::heap_stats;

/// Gauge names published on every runtime poll, in publication order.
pub const RUNTIME_GAUGES: [&str; 27] = [
    "Alloc",
    "BuckHashSys",
    "Frees",
    "GCCPUFraction",
    "GCSys",
    "HeapAlloc",
    "HeapIdle",
    "HeapInuse",
    "HeapObjects",
    "HeapReleased",
    "HeapSys",
    "LastGC",
    "Lookups",
    "MCacheInuse",
    "MCacheSys",
    "MSpanInuse",
    "MSpanSys",
    "Mallocs",
    "NextGC",
    "NumForcedGC",
    "NumGC",
    "OtherSys",
    "PauseTotalNs",
    "StackInuse",
    "StackSys",
    "Sys",
    "TotalAlloc",
];

/// Samples process heap and memory figures into the registry.
///
/// Allocation counters come from [`crate::alloc`]; resident and virtual
/// sizes come from the OS process table. Figures with no process-level
/// source (garbage-collection timings, arena bookkeeping) are published
/// as zero gauges so the block always carries the same set of names.
pub struct RuntimeSampler {
    sys: System,
    pid: Option<Pid>,
}

impl RuntimeSampler {
    /// Creates a sampler bound to the current process.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sys: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    /// Publishes one full sample: the runtime gauge block, `RandomValue`
    /// and a `PollCount` increment.
    pub fn sample(&mut self, registry: &MetricRegistry) {
        let heap = heap_stats();

        let mut resident: u64 = 0;
        let mut virtual_size: u64 = 0;
        if let Some(pid) = self.pid {
            self.sys
                .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            if let Some(process) = self.sys.process(pid) {
                resident = process.memory();
                virtual_size = process.virtual_memory();
            }
        }

        let live_objects = heap.allocations.saturating_sub(heap.deallocations);
        let values: [(&str, f64); 27] = [
            ("Alloc", heap.allocated as f64),
            ("BuckHashSys", 0.0),
            ("Frees", heap.deallocations as f64),
            ("GCCPUFraction", 0.0),
            ("GCSys", 0.0),
            ("HeapAlloc", heap.allocated as f64),
            ("HeapIdle", virtual_size.saturating_sub(resident) as f64),
            ("HeapInuse", resident as f64),
            ("HeapObjects", live_objects as f64),
            ("HeapReleased", 0.0),
            ("HeapSys", virtual_size as f64),
            ("LastGC", 0.0),
            ("Lookups", 0.0),
            ("MCacheInuse", 0.0),
            ("MCacheSys", 0.0),
            ("MSpanInuse", 0.0),
            ("MSpanSys", 0.0),
            ("Mallocs", heap.allocations as f64),
            ("NextGC", 0.0),
            ("NumForcedGC", 0.0),
            ("NumGC", 0.0),
            ("OtherSys", 0.0),
            ("PauseTotalNs", 0.0),
            ("StackInuse", 0.0),
            ("StackSys", 0.0),
            ("Sys", virtual_size as f64),
            ("TotalAlloc", heap.total_allocated as f64),
        ];

        for (name, value) in values {
            // canonical text always validates
            let _ = registry.put_gauge_raw(name, &pulse_proto::format_gauge(value));
        }

        let random: f64 = rand::thread_rng().gen();
        let _ = registry.put_gauge_raw("RandomValue", &pulse_proto::format_gauge(random));

        registry.add_counter("PollCount", 1);
    }
}

impl Default for RuntimeSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishes_the_full_gauge_block() {
        let registry = MetricRegistry::new();
        let mut sampler = RuntimeSampler::new();
        sampler.sample(&registry);

        let gauges = registry.snapshot_gauges();
        for name in RUNTIME_GAUGES {
            assert!(gauges.contains_key(name), "missing gauge {name}");
        }
        assert!(gauges.contains_key("RandomValue"));
    }

    #[test]
    fn poll_count_increments_per_sample() {
        let registry = MetricRegistry::new();
        let mut sampler = RuntimeSampler::new();
        sampler.sample(&registry);
        sampler.sample(&registry);
        sampler.sample(&registry);
        assert_eq!(registry.counter("PollCount").unwrap(), 3);
    }

    #[test]
    fn random_value_is_in_unit_interval() {
        let registry = MetricRegistry::new();
        let mut sampler = RuntimeSampler::new();
        for _ in 0..20 {
            sampler.sample(&registry);
            let raw = registry.gauge_raw("RandomValue").unwrap();
            let value: f64 = raw.parse().unwrap();
            assert!((0.0..1.0).contains(&value), "{value}");
        }
    }

    #[test]
    fn gauge_text_parses_back() {
        let registry = MetricRegistry::new();
        let mut sampler = RuntimeSampler::new();
        sampler.sample(&registry);
        for (name, raw) in registry.snapshot_gauges() {
            assert!(raw.parse::<f64>().is_ok(), "{name} = {raw}");
        }
    }
}
