//! Terminate, settle, relaunch. One sequence in flight at a time.

pub mod platform;

use platform::PlatformStrategy;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum RemediationError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        source: std::io::Error,
    },
    #[error("a restart is already in progress")]
    InProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartOutcome {
    pub pid: Option<u32>,
}

#[derive(Debug)]
pub struct Actuator {
    strategy: Box<dyn PlatformStrategy>,
    settle: Duration,
    in_flight: Mutex<()>,
}

impl Actuator {
    pub fn new(strategy: Box<dyn PlatformStrategy>, settle: Duration) -> Self {
        Self {
            strategy,
            settle,
            in_flight: Mutex::new(()),
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub async fn restart(&self) -> Result<RestartOutcome, RemediationError> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| RemediationError::InProgress)?;

        info!(
            strategy = self.strategy.name(),
            executable = %self.strategy.executable(),
            "restarting target process"
        );

        self.terminate().await;
        tokio::time::sleep(self.settle).await;

        match self.launch() {
            Ok(outcome) => {
                info!(pid = ?outcome.pid, "target process started");
                Ok(outcome)
            }
            Err(err) => {
                error!(error = %err, "failed to start target process");
                Err(err)
            }
        }
    }

    // Nothing to kill is a normal outcome here.
    async fn terminate(&self) {
        let mut cmd = Command::from(self.strategy.terminate_command());
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match cmd.status().await {
            Ok(status) if status.success() => debug!("terminate command succeeded"),
            Ok(status) => debug!(code = ?status.code(), "terminate command reported failure"),
            Err(err) => debug!(error = %err, "terminate command could not run"),
        }
    }

    fn launch(&self) -> Result<RestartOutcome, RemediationError> {
        let mut cmd = Command::from(self.strategy.launch_command());
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);

        #[cfg(windows)]
        {
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
        }

        let child = cmd.spawn().map_err(|source| RemediationError::Launch {
            program: self.strategy.executable(),
            source,
        })?;

        // Not awaited; the runtime reaps it once it exits.
        Ok(RestartOutcome { pid: child.id() })
    }
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Instant;

    #[derive(Debug)]
    pub(crate) struct FakeStrategy {
        pub(crate) kill: &'static str,
        pub(crate) launch: PathBuf,
    }

    impl PlatformStrategy for FakeStrategy {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn terminate_command(&self) -> std::process::Command {
            std::process::Command::new(self.kill)
        }

        fn launch_command(&self) -> std::process::Command {
            std::process::Command::new(&self.launch)
        }

        fn executable(&self) -> String {
            self.launch.display().to_string()
        }
    }

    pub(crate) fn actuator(launch: &str, settle_ms: u64) -> Actuator {
        Actuator::new(
            Box::new(FakeStrategy {
                kill: "true",
                launch: PathBuf::from(launch),
            }),
            Duration::from_millis(settle_ms),
        )
    }

    #[tokio::test]
    async fn restart_launches_after_settle() {
        let actuator = actuator("true", 150);
        let started = Instant::now();
        let outcome = actuator.restart().await.expect("launch succeeds");
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert!(outcome.pid.is_some());
    }

    #[tokio::test]
    async fn missing_executable_is_launch_error() {
        let actuator = actuator("/nonexistent/sunshine", 0);
        let err = actuator.restart().await.unwrap_err();
        match &err {
            RemediationError::Launch { program, .. } => {
                assert_eq!(program, "/nonexistent/sunshine")
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("/nonexistent/sunshine"));
    }

    #[tokio::test]
    async fn kill_failure_does_not_stop_launch() {
        let actuator = Actuator::new(
            Box::new(FakeStrategy {
                kill: "/nonexistent/pkill",
                launch: PathBuf::from("true"),
            }),
            Duration::ZERO,
        );
        assert!(actuator.restart().await.is_ok());

        let actuator = Actuator::new(
            Box::new(FakeStrategy {
                kill: "false",
                launch: PathBuf::from("true"),
            }),
            Duration::ZERO,
        );
        assert!(actuator.restart().await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_restart_is_rejected() {
        let actuator = actuator("true", 200);
        let (first, second) = tokio::join!(actuator.restart(), actuator.restart());
        assert!(first.is_ok());
        assert!(matches!(second, Err(RemediationError::InProgress)));

        // Lock is released once the first sequence completes.
        assert!(actuator.restart().await.is_ok());
    }
}
