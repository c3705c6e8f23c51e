//! Optional CPU-headroom gate.

use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::config::LoadGuardConfig;

/// Source of the current system load as a percentage of total capacity.
pub trait LoadProbe: Send + Sync {
    /// `None` when the load cannot be determined; the guard then lets tasks through.
    fn cpu_percent(&self) -> Option<f64>;
}

/// Reads the 1-minute load average from `/proc/loadavg`, normalized by core count.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcLoadProbe;

impl ProcLoadProbe {
    fn parse(loadavg: &str, cores: usize) -> Option<f64> {
        let one_minute: f64 = loadavg.split_whitespace().next()?.parse().ok()?;
        Some(one_minute / cores.max(1) as f64 * 100.0)
    }
}

impl LoadProbe for ProcLoadProbe {
    fn cpu_percent(&self) -> Option<f64> {
        let loadavg = std::fs::read_to_string("/proc/loadavg").ok()?;
        let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self::parse(&loadavg, cores)
    }
}

/// Holds tasks back while system load is at or above a threshold.
pub struct LoadGuard {
    max_cpu_percent: f64,
    poll_interval: Duration,
    probe: Arc<dyn LoadProbe>,
}

impl LoadGuard {
    pub fn new(config: &LoadGuardConfig, probe: Arc<dyn LoadProbe>) -> Self {
        Self {
            max_cpu_percent: config.max_cpu_percent,
            poll_interval: config.poll_interval,
            probe,
        }
    }

    /// Poll the probe until load drops below the threshold.
    pub async fn wait_for_headroom(&self) {
        while let Some(load) = self.probe.cpu_percent() {
            if load < self.max_cpu_percent {
                return;
            }
            debug!(
                "System load {:.1}% >= {:.1}%, waiting {:?}",
                load, self.max_cpu_percent, self.poll_interval
            );
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
