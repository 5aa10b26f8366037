//! Trigger rules applied to each status snapshot, plus the restart-storm gate.

use crate::collectors::SystemStatus;
use crate::config::{BackoffConfig, HealthConfig};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    NotRunning,
    MemoryPressure { mem_usage: f64 },
}

impl Trigger {
    pub fn label(&self) -> &'static str {
        match self {
            Trigger::NotRunning => "not_running",
            Trigger::MemoryPressure { .. } => "memory_pressure",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::NotRunning => write!(f, "target process is not running"),
            Trigger::MemoryPressure { mem_usage } => {
                write!(f, "memory usage critical ({mem_usage:.2}%)")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemediationDecision {
    None,
    Restart(Vec<Trigger>),
}

/// Liveness first, then memory pressure. Both may fire; the caller restarts once.
pub fn evaluate(status: &SystemStatus, cfg: &HealthConfig) -> RemediationDecision {
    let mut triggers = Vec::new();

    if !status.is_running() {
        triggers.push(Trigger::NotRunning);
    }

    if let Some(mem_usage) = status.mem_usage() {
        if mem_usage > cfg.memory_critical_percent {
            triggers.push(Trigger::MemoryPressure { mem_usage });
        }
    }

    if triggers.is_empty() {
        RemediationDecision::None
    } else {
        RemediationDecision::Restart(triggers)
    }
}

/// Automatic restarts since the last healthy tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RestartHistory {
    pub consecutive: u32,
    /// Ticks deferred by backoff since the last attempt.
    pub deferred_ticks: u32,
    pub last_attempt_unix: Option<i64>,
}

impl RestartHistory {
    pub fn record_attempt(&mut self, now_unix: i64) {
        self.consecutive = self.consecutive.saturating_add(1);
        self.deferred_ticks = 0;
        self.last_attempt_unix = Some(now_unix);
    }

    pub fn record_deferred(&mut self) {
        self.deferred_ticks = self.deferred_ticks.saturating_add(1);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Counts ticks rather than wall time, so settle and sampling latency
/// never stretch the spacing between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RestartBackoff {
    enabled: bool,
    interval: Duration,
    max_deferred: u32,
}

impl RestartBackoff {
    pub fn new(cfg: &BackoffConfig, interval: Duration) -> Self {
        let interval_secs = interval.as_secs().max(1);
        let max_ticks = (cfg.max_delay_secs / interval_secs).max(1);
        Self {
            enabled: cfg.enabled,
            interval,
            max_deferred: u32::try_from(max_ticks - 1).unwrap_or(u32::MAX),
        }
    }

    /// Ticks to skip after `consecutive` attempts: 2^(n-1) - 1, capped.
    pub fn deferred_after(&self, consecutive: u32) -> u32 {
        if !self.enabled || consecutive == 0 {
            return 0;
        }
        let shift = (consecutive - 1).min(31);
        let skip = (1_u64 << shift) - 1;
        u32::try_from(skip)
            .unwrap_or(u32::MAX)
            .min(self.max_deferred)
    }

    /// Spacing between attempt `consecutive` and the next one.
    pub fn delay_after(&self, consecutive: u32) -> Duration {
        self.interval
            .saturating_mul(self.deferred_after(consecutive).saturating_add(1))
    }

    /// `Err` carries the remaining wait.
    pub fn permits(&self, history: &RestartHistory) -> Result<(), Duration> {
        let required = self.deferred_after(history.consecutive);
        if history.deferred_ticks >= required {
            Ok(())
        } else {
            Err(self.interval.saturating_mul(required - history.deferred_ticks))
        }
    }
}
