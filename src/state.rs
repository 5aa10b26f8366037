use crate::collectors::SystemStatus;
use crate::health::{RestartHistory, Trigger};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchdogPhase {
    #[default]
    Idle,
    Checking,
    Evaluating,
    Remediating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartSource {
    Watchdog,
    Manual,
}

impl RestartSource {
    pub fn label(&self) -> &'static str {
        match self {
            RestartSource::Watchdog => "watchdog",
            RestartSource::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct State {
    pub started_at_unix: i64,
    pub phase: WatchdogPhase,
    pub ticks_total: u64,
    pub last_tick_unix: Option<i64>,
    pub last_status: Option<SystemStatus>,
    pub last_triggers: Vec<Trigger>,
    pub history: RestartHistory,
    pub restarts_total: u64,
    pub restart_failures_total: u64,
    pub last_restart_unix: Option<i64>,
    pub last_restart_error: Option<String>,
}

impl State {
    pub fn new(now_unix: i64) -> Self {
        Self {
            started_at_unix: now_unix,
            ..Self::default()
        }
    }

    pub fn set_phase(&mut self, phase: WatchdogPhase) {
        self.phase = phase;
    }

    pub fn record_tick(&mut self, status: SystemStatus, triggers: &[Trigger]) {
        self.ticks_total = self.ticks_total.saturating_add(1);
        self.last_tick_unix = Some(status.collected_at_unix);
        self.last_status = Some(status);
        self.last_triggers = triggers.to_vec();
        if triggers.is_empty() {
            self.history.reset();
        }
    }

    /// Manual restarts are counted but do not advance the backoff history.
    pub fn record_restart(
        &mut self,
        source: RestartSource,
        result: Result<(), String>,
        now_unix: i64,
    ) {
        if source == RestartSource::Watchdog {
            self.history.record_attempt(now_unix);
        }
        self.last_restart_unix = Some(now_unix);
        match result {
            Ok(()) => {
                self.restarts_total = self.restarts_total.saturating_add(1);
                self.last_restart_error = None;
            }
            Err(message) => {
                self.restart_failures_total = self.restart_failures_total.saturating_add(1);
                self.last_restart_error = Some(message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_tick_resets_history() {
        let mut state = State::new(0);
        state.record_restart(RestartSource::Watchdog, Err("boom".to_string()), 10);
        state.record_restart(RestartSource::Watchdog, Ok(()), 20);
        assert_eq!(state.history.consecutive, 2);
        assert_eq!(state.restarts_total, 1);
        assert_eq!(state.restart_failures_total, 1);
        assert_eq!(state.last_restart_error, None);

        state.record_tick(SystemStatus::unavailable(30), &[Trigger::NotRunning]);
        assert_eq!(state.history.consecutive, 2);

        state.record_tick(SystemStatus::unavailable(40), &[]);
        assert_eq!(state.history, RestartHistory::default());
        assert_eq!(state.ticks_total, 2);
        assert_eq!(state.last_tick_unix, Some(40));
    }

    #[test]
    fn manual_restart_leaves_backoff_alone() {
        let mut state = State::new(0);
        state.record_restart(RestartSource::Manual, Err("missing".to_string()), 5);
        assert_eq!(state.history.consecutive, 0);
        assert_eq!(state.last_restart_error.as_deref(), Some("missing"));
    }
}
