use crate::collectors::{MetricsSource, ProcessEntry, SystemStatus, TargetProcess};
use crate::now_unix;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Builds [`SystemStatus`] snapshots from a shared [`MetricsSource`].
#[derive(Clone)]
pub struct StatusCollector {
    source: Arc<Mutex<Box<dyn MetricsSource>>>,
    target_names: Arc<[String]>,
}

impl StatusCollector {
    pub fn new(source: Box<dyn MetricsSource>, target_names: Vec<String>) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            target_names: target_names.into(),
        }
    }

    /// Blocks for the source's CPU window. Never fails.
    pub fn collect_blocking(&self) -> SystemStatus {
        let sample = {
            let mut source = self
                .source
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            source.sample()
        };

        SystemStatus {
            collected_at_unix: now_unix(),
            cpu_usage: sample.cpu_usage,
            memory: sample.memory,
            os: sample.os,
            arch: sample.arch,
            target: find_target(&sample.processes, &self.target_names),
        }
    }

    pub async fn collect(&self) -> SystemStatus {
        let collector = self.clone();
        match tokio::task::spawn_blocking(move || collector.collect_blocking()).await {
            Ok(status) => status,
            Err(err) => {
                warn!(error = %err, "status collection task failed");
                SystemStatus::unavailable(now_unix())
            }
        }
    }
}

/// First process, in list order, whose name equals one of `names`.
pub fn find_target(processes: &[ProcessEntry], names: &[String]) -> Option<TargetProcess> {
    processes
        .iter()
        .find(|p| names.iter().any(|n| *n == p.name))
        .and_then(|p| TargetProcess::new(p.pid, p.name.clone()))
}
