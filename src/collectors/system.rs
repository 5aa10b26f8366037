use crate::collectors::{HostSample, MemoryUsage, MetricsSource, ProcessEntry};
use std::time::Duration;
use sysinfo::{CpuExt, PidExt, ProcessExt, System, SystemExt};
use tracing::debug;

/// [`MetricsSource`] backed by a long-lived `sysinfo::System`.
pub struct SysinfoSource {
    system: System,
    cpu_window: Duration,
}

impl SysinfoSource {
    pub fn new(cpu_window: Duration) -> Self {
        Self {
            system: System::new(),
            cpu_window: cpu_window.max(System::MINIMUM_CPU_UPDATE_INTERVAL),
        }
    }
}

impl MetricsSource for SysinfoSource {
    fn sample(&mut self) -> HostSample {
        let cpu_usage = sample_cpu(&mut self.system, self.cpu_window);

        self.system.refresh_memory();
        let memory = MemoryUsage::new(self.system.total_memory(), self.system.used_memory());
        if memory.is_none() {
            debug!("memory totals unavailable");
        }

        self.system.refresh_processes();
        let mut processes: Vec<ProcessEntry> = self
            .system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessEntry {
                pid: pid.as_u32(),
                name: process.name().to_string(),
            })
            .collect();
        processes.sort_by_key(|p| p.pid);

        HostSample {
            cpu_usage,
            memory,
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            processes,
        }
    }
}

// Usage is a delta between two refreshes, so this blocks for `window`.
fn sample_cpu(system: &mut System, window: Duration) -> Option<f64> {
    system.refresh_cpu();
    if system.cpus().is_empty() {
        debug!("no CPUs reported, skipping CPU sample");
        return None;
    }
    std::thread::sleep(window);
    system.refresh_cpu();

    let usage = system.global_cpu_info().cpu_usage() as f64;
    if usage.is_finite() {
        Some(usage.clamp(0.0, 100.0))
    } else {
        None
    }
}
