//! OS-level metric sampling.

use pulse_storage::MetricRegistry;
use sysinfo::System;

/// Samples machine-wide memory and CPU figures.
///
/// Metrics are published only when the platform can actually produce
/// them: memory gauges require a nonzero total, and CPU utilization
/// needs two refreshes before the first meaningful reading, so nothing
/// is fabricated on the first tick.
pub struct OsSampler {
    sys: System,
    cpu_primed: bool,
}

impl OsSampler {
    /// Creates an OS sampler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sys: System::new(),
            cpu_primed: false,
        }
    }

    /// Publishes `TotalMemory`, `FreeMemory` and `CPUutilization1`
    /// when available.
    pub fn sample(&mut self, registry: &MetricRegistry) {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        if total > 0 {
            let _ = registry.put_gauge_raw("TotalMemory", &pulse_proto::format_gauge(total as f64));
            let _ = registry.put_gauge_raw(
                "FreeMemory",
                &pulse_proto::format_gauge(self.sys.free_memory() as f64),
            );
        }

        self.sys.refresh_cpu_usage();
        if self.cpu_primed {
            let usage = f64::from(self.sys.global_cpu_usage());
            if usage.is_finite() {
                let _ =
                    registry.put_gauge_raw("CPUutilization1", &pulse_proto::format_gauge(usage));
            }
        }
        self.cpu_primed = true;
    }
}

impl Default for OsSampler {
    fn default() -> Self {
        Self::new()
    }
}
