use crate::now_unix;
use crate::state::{RestartSource, State};
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub watchdog_cpu_usage_percent: Gauge,
    pub watchdog_memory_usage_percent: Gauge,
    pub watchdog_memory_used_bytes: Gauge,
    pub watchdog_memory_total_bytes: Gauge,
    pub watchdog_target_running: Gauge,
    pub watchdog_target_pid: Gauge,
    pub watchdog_consecutive_restarts: Gauge,
    pub watchdog_ticks_total: Counter,
    pub watchdog_triggers_total: CounterVec,
    pub watchdog_remediations_total: CounterVec,
    pub watchdog_remediation_failures_total: CounterVec,
    pub watchdog_remediations_suppressed_total: CounterVec,
    pub watchdog_uptime_seconds: Gauge,
    pub watchdog_scrape_count_total: Counter,
    pub watchdog_last_collect_timestamp_seconds: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let watchdog_cpu_usage_percent = Gauge::with_opts(opts!(
            "watchdog_cpu_usage_percent",
            "Host CPU usage in percent (NaN when unmeasured)"
        ))?;
        let watchdog_memory_usage_percent = Gauge::with_opts(opts!(
            "watchdog_memory_usage_percent",
            "Host memory usage in percent (NaN when unmeasured)"
        ))?;
        let watchdog_memory_used_bytes =
            Gauge::with_opts(opts!("watchdog_memory_used_bytes", "Used memory in bytes"))?;
        let watchdog_memory_total_bytes =
            Gauge::with_opts(opts!("watchdog_memory_total_bytes", "Total memory in bytes"))?;
        let watchdog_target_running = Gauge::with_opts(opts!(
            "watchdog_target_running",
            "1 if the supervised process was found on the last tick"
        ))?;
        let watchdog_target_pid = Gauge::with_opts(opts!(
            "watchdog_target_pid",
            "PID of the supervised process, 0 when absent"
        ))?;
        let watchdog_consecutive_restarts = Gauge::with_opts(opts!(
            "watchdog_consecutive_restarts",
            "Automatic restarts since the last healthy tick"
        ))?;
        let watchdog_ticks_total =
            Counter::with_opts(opts!("watchdog_ticks_total", "Completed watchdog ticks"))?;
        let watchdog_triggers_total = CounterVec::new(
            opts!("watchdog_triggers_total", "Fired trigger rules by trigger"),
            &["trigger"],
        )?;
        let watchdog_remediations_total = CounterVec::new(
            opts!(
                "watchdog_remediations_total",
                "Successful restarts of the supervised process by source"
            ),
            &["source"],
        )?;
        let watchdog_remediation_failures_total = CounterVec::new(
            opts!(
                "watchdog_remediation_failures_total",
                "Failed relaunch attempts by source"
            ),
            &["source"],
        )?;
        let watchdog_remediations_suppressed_total = CounterVec::new(
            opts!(
                "watchdog_remediations_suppressed_total",
                "Restarts skipped by reason (backoff, in_progress)"
            ),
            &["reason"],
        )?;
        let watchdog_uptime_seconds =
            Gauge::with_opts(opts!("watchdog_uptime_seconds", "Agent uptime in seconds"))?;
        let watchdog_scrape_count_total = Counter::with_opts(opts!(
            "watchdog_scrape_count_total",
            "Number of /metrics scrapes"
        ))?;
        let watchdog_last_collect_timestamp_seconds = Gauge::with_opts(opts!(
            "watchdog_last_collect_timestamp_seconds",
            "Unix timestamp of the last status collection"
        ))?;

        register(&registry, &watchdog_cpu_usage_percent)?;
        register(&registry, &watchdog_memory_usage_percent)?;
        register(&registry, &watchdog_memory_used_bytes)?;
        register(&registry, &watchdog_memory_total_bytes)?;
        register(&registry, &watchdog_target_running)?;
        register(&registry, &watchdog_target_pid)?;
        register(&registry, &watchdog_consecutive_restarts)?;
        register(&registry, &watchdog_ticks_total)?;
        register(&registry, &watchdog_triggers_total)?;
        register(&registry, &watchdog_remediations_total)?;
        register(&registry, &watchdog_remediation_failures_total)?;
        register(&registry, &watchdog_remediations_suppressed_total)?;
        register(&registry, &watchdog_uptime_seconds)?;
        register(&registry, &watchdog_scrape_count_total)?;
        register(&registry, &watchdog_last_collect_timestamp_seconds)?;

        Ok(Arc::new(Self {
            registry,
            watchdog_cpu_usage_percent,
            watchdog_memory_usage_percent,
            watchdog_memory_used_bytes,
            watchdog_memory_total_bytes,
            watchdog_target_running,
            watchdog_target_pid,
            watchdog_consecutive_restarts,
            watchdog_ticks_total,
            watchdog_triggers_total,
            watchdog_remediations_total,
            watchdog_remediation_failures_total,
            watchdog_remediations_suppressed_total,
            watchdog_uptime_seconds,
            watchdog_scrape_count_total,
            watchdog_last_collect_timestamp_seconds,
        }))
    }

    pub fn update_from_state(&self, state: &State) {
        if let Some(status) = &state.last_status {
            self.watchdog_cpu_usage_percent
                .set(status.cpu_usage.unwrap_or(f64::NAN));
            self.watchdog_memory_usage_percent
                .set(status.mem_usage().unwrap_or(f64::NAN));
            let (used, total) = status
                .memory
                .map_or((0, 0), |m| (m.used_bytes, m.total_bytes));
            self.watchdog_memory_used_bytes.set(used as f64);
            self.watchdog_memory_total_bytes.set(total as f64);
            self.watchdog_target_running
                .set(if status.is_running() { 1.0 } else { 0.0 });
            self.watchdog_target_pid.set(status.sunshine_pid() as f64);
            self.watchdog_last_collect_timestamp_seconds
                .set(status.collected_at_unix as f64);
        }

        self.watchdog_consecutive_restarts
            .set(state.history.consecutive as f64);

        let uptime = now_unix().saturating_sub(state.started_at_unix) as f64;
        self.watchdog_uptime_seconds.set(uptime);
    }

    pub fn inc_tick(&self) {
        self.watchdog_ticks_total.inc();
    }

    pub fn inc_trigger(&self, trigger: &str) {
        self.watchdog_triggers_total
            .with_label_values(&[trigger])
            .inc();
    }

    pub fn inc_remediation(&self, source: RestartSource, ok: bool) {
        let counter = if ok {
            &self.watchdog_remediations_total
        } else {
            &self.watchdog_remediation_failures_total
        };
        counter.with_label_values(&[source.label()]).inc();
    }

    pub fn inc_suppressed(&self, reason: &str) {
        self.watchdog_remediations_suppressed_total
            .with_label_values(&[reason])
            .inc();
    }

    pub fn inc_scrape_count(&self) {
        self.watchdog_scrape_count_total.inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::{MemoryUsage, SystemStatus, TargetProcess};

    #[test]
    fn reflects_last_status() {
        let metrics = Metrics::new().expect("metrics init");
        let mut state = State::new(0);
        let mut status = SystemStatus::unavailable(100);
        status.memory = MemoryUsage::new(2000, 500);
        status.target = TargetProcess::new(4821, "sunshine");
        state.last_status = Some(status);

        metrics.update_from_state(&state);

        assert_eq!(metrics.watchdog_target_running.get(), 1.0);
        assert_eq!(metrics.watchdog_target_pid.get(), 4821.0);
        assert_eq!(metrics.watchdog_memory_usage_percent.get(), 25.0);
        assert!(metrics.watchdog_cpu_usage_percent.get().is_nan());
    }

    #[test]
    fn remediation_counters_by_source() {
        let metrics = Metrics::new().expect("metrics init");
        metrics.inc_remediation(RestartSource::Manual, true);
        metrics.inc_remediation(RestartSource::Watchdog, false);
        metrics.inc_remediation(RestartSource::Watchdog, false);

        let text = String::from_utf8(metrics.encode_metrics().unwrap()).unwrap();
        assert!(text.contains("watchdog_remediations_total{source=\"manual\"} 1"));
        assert!(text.contains("watchdog_remediation_failures_total{source=\"watchdog\"} 2"));
    }
}
