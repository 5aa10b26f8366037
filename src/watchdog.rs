use crate::collectors::status::StatusCollector;
use crate::config::HealthConfig;
use crate::health::{evaluate, RemediationDecision, RestartBackoff};
use crate::metrics::Metrics;
use crate::now_unix;
use crate::remediation::{Actuator, RemediationError, RestartOutcome};
use crate::state::{RestartSource, State, WatchdogPhase};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Handles shared by the watchdog loop and the control surface.
#[derive(Clone)]
pub struct Agent {
    pub collector: StatusCollector,
    pub actuator: Arc<Actuator>,
    pub state: Arc<RwLock<State>>,
    pub metrics: Arc<Metrics>,
}

impl Agent {
    /// Runs the actuator and records the outcome. A rejected concurrent
    /// call is counted as suppressed and leaves the state untouched.
    pub async fn restart(&self, source: RestartSource) -> Result<RestartOutcome, RemediationError> {
        let result = self.actuator.restart().await;
        match &result {
            Err(RemediationError::InProgress) => {
                warn!(source = source.label(), "restart already in progress, skipping");
                self.metrics.inc_suppressed("in_progress");
            }
            other => {
                let recorded = other.as_ref().map(|_| ()).map_err(|e| e.to_string());
                self.metrics.inc_remediation(source, recorded.is_ok());
                let mut guard = self.state.write().await;
                guard.record_restart(source, recorded, now_unix());
                self.metrics.update_from_state(&guard);
            }
        }
        result
    }

    async fn set_phase(&self, phase: WatchdogPhase) {
        self.state.write().await.set_phase(phase);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Healthy,
    Restarted,
    RestartFailed,
    Suppressed,
}

pub struct Watchdog {
    agent: Agent,
    health: HealthConfig,
    backoff: RestartBackoff,
}

impl Watchdog {
    pub fn new(agent: Agent, health: HealthConfig, interval: Duration) -> Self {
        let backoff = RestartBackoff::new(&health.backoff, interval);
        Self {
            agent,
            health,
            backoff,
        }
    }

    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval = %humantime::format_duration(interval),
            strategy = self.agent.actuator.strategy_name(),
            "watchdog started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("shutdown signal received, stopping watchdog");
                    break;
                }
                _ = ticker.tick() => {
                    let outcome = self.tick().await;
                    debug!(?outcome, "tick finished");
                }
            }
        }
    }

    pub async fn tick(&self) -> TickOutcome {
        self.agent.set_phase(WatchdogPhase::Checking).await;
        let status = self.agent.collector.collect().await;

        self.agent.set_phase(WatchdogPhase::Evaluating).await;
        let decision = evaluate(&status, &self.health);
        let triggers = match &decision {
            RemediationDecision::None => Vec::new(),
            RemediationDecision::Restart(triggers) => triggers.clone(),
        };

        if let Some(target) = &status.target {
            debug!(
                pid = target.pid,
                name = %target.name,
                mem_usage = ?status.mem_usage(),
                "target alive"
            );
        }

        let history = {
            let mut guard = self.agent.state.write().await;
            guard.record_tick(status, &triggers);
            self.agent.metrics.inc_tick();
            self.agent.metrics.update_from_state(&guard);
            if triggers.is_empty() {
                guard.set_phase(WatchdogPhase::Idle);
                return TickOutcome::Healthy;
            }
            guard.history
        };

        for trigger in &triggers {
            warn!(trigger = trigger.label(), "{trigger}, restart required");
            self.agent.metrics.inc_trigger(trigger.label());
        }

        if let Err(wait) = self.backoff.permits(&history) {
            info!(
                consecutive = history.consecutive,
                retry_in = %humantime::format_duration(wait),
                "restart deferred by backoff"
            );
            self.agent.metrics.inc_suppressed("backoff");
            let mut guard = self.agent.state.write().await;
            guard.history.record_deferred();
            guard.set_phase(WatchdogPhase::Idle);
            return TickOutcome::Suppressed;
        }

        self.agent.set_phase(WatchdogPhase::Remediating).await;
        let outcome = match self.agent.restart(RestartSource::Watchdog).await {
            Ok(_) => TickOutcome::Restarted,
            Err(RemediationError::InProgress) => TickOutcome::Suppressed,
            Err(_) => TickOutcome::RestartFailed,
        };
        self.agent.set_phase(WatchdogPhase::Idle).await;
        outcome
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::collectors::status::tests::{host, target_names, ScriptedSource};
    use crate::collectors::HostSample;
    use crate::config::BackoffConfig;
    use crate::health::RestartHistory;
    use crate::remediation::tests::actuator;

    fn agent(samples: Vec<HostSample>, launch: &str) -> Agent {
        agent_with_settle(samples, launch, 0)
    }

    fn agent_with_settle(samples: Vec<HostSample>, launch: &str, settle_ms: u64) -> Agent {
        Agent {
            collector: StatusCollector::new(
                Box::new(ScriptedSource::new(samples)),
                target_names(),
            ),
            actuator: Arc::new(actuator(launch, settle_ms)),
            state: Arc::new(RwLock::new(State::new(0))),
            metrics: Metrics::new().expect("metrics init"),
        }
    }

    fn watchdog(agent: Agent, backoff_enabled: bool) -> Watchdog {
        let health = HealthConfig {
            backoff: BackoffConfig {
                enabled: backoff_enabled,
                max_delay_secs: 300,
            },
            ..HealthConfig::default()
        };
        Watchdog::new(agent, health, Duration::from_secs(10))
    }

    #[tokio::test]
    async fn missing_process_is_restarted() {
        let agent = agent(vec![host(40, &[(1, "init")])], "true");
        let wd = watchdog(agent.clone(), true);

        assert_eq!(wd.tick().await, TickOutcome::Restarted);

        let state = agent.state.read().await;
        assert_eq!(state.phase, WatchdogPhase::Idle);
        assert_eq!(state.restarts_total, 1);
        assert_eq!(state.history.consecutive, 1);
        let last = state.last_status.as_ref().unwrap();
        assert!(!last.is_running());
        assert_eq!(last.sunshine_pid(), 0);
        assert_eq!(last.mem_usage(), Some(40.0));
    }

    #[tokio::test]
    async fn memory_pressure_restarts_running_process() {
        let agent = agent(vec![host(96, &[(4821, "sunshine")])], "true");
        let wd = watchdog(agent.clone(), true);
        assert_eq!(wd.tick().await, TickOutcome::Restarted);
        assert_eq!(agent.metrics.watchdog_target_pid.get(), 4821.0);
    }

    #[tokio::test]
    async fn healthy_tick_does_nothing_and_resets_history() {
        let agent = agent(vec![host(40, &[(4821, "sunshine")])], "true");
        agent
            .state
            .write()
            .await
            .history
            .record_attempt(now_unix());
        let wd = watchdog(agent.clone(), true);

        assert_eq!(wd.tick().await, TickOutcome::Healthy);
        let state = agent.state.read().await;
        assert_eq!(state.history.consecutive, 0);
        assert_eq!(state.restarts_total, 0);
    }

    #[tokio::test]
    async fn failed_launch_is_retried_on_next_tick() {
        let agent = agent(vec![host(40, &[])], "/nonexistent/sunshine");
        let wd = watchdog(agent.clone(), false);

        assert_eq!(wd.tick().await, TickOutcome::RestartFailed);
        assert_eq!(wd.tick().await, TickOutcome::RestartFailed);

        let state = agent.state.read().await;
        assert_eq!(state.restart_failures_total, 2);
        assert!(state
            .last_restart_error
            .as_deref()
            .unwrap()
            .contains("/nonexistent/sunshine"));
    }

    #[tokio::test]
    async fn backoff_allows_next_tick_then_spaces_retries() {
        let agent = agent_with_settle(vec![host(40, &[])], "/nonexistent/sunshine", 300);
        let wd = watchdog(agent.clone(), true);

        let outcomes = [
            wd.tick().await,
            wd.tick().await,
            wd.tick().await,
            wd.tick().await,
        ];
        assert_eq!(
            outcomes,
            [
                TickOutcome::RestartFailed,
                TickOutcome::RestartFailed,
                TickOutcome::Suppressed,
                TickOutcome::RestartFailed,
            ]
        );

        let state = agent.state.read().await;
        assert_eq!(state.restart_failures_total, 3);
        assert_eq!(state.history.consecutive, 3);
        assert_eq!(state.history.deferred_ticks, 0);
    }

    #[tokio::test]
    async fn relaunched_process_counts_as_healthy_next_tick() {
        let agent = agent(
            vec![host(40, &[(1, "init")]), host(40, &[(1, "init"), (4900, "sunshine")])],
            "true",
        );
        let wd = watchdog(agent.clone(), true);

        assert_eq!(wd.tick().await, TickOutcome::Restarted);
        assert_eq!(agent.state.read().await.history.consecutive, 1);

        assert_eq!(wd.tick().await, TickOutcome::Healthy);
        let state = agent.state.read().await;
        assert_eq!(state.history, RestartHistory::default());
        assert_eq!(state.restarts_total, 1);
        assert_eq!(state.last_status.as_ref().unwrap().sunshine_pid(), 4900);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let agent = agent(vec![host(40, &[(4821, "sunshine")])], "true");
        let wd = watchdog(agent.clone(), true);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(wd.run(Duration::from_secs(10), rx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).expect("receiver alive");
        handle.await.expect("watchdog task joins");

        assert!(agent.state.read().await.ticks_total >= 1);
    }
}
