pub mod status;
pub mod system;

/// Point-in-time host sample produced by a [`MetricsSource`].
#[derive(Debug, Clone, Default)]
pub struct HostSample {
    pub cpu_usage: Option<f64>,
    pub memory: Option<MemoryUsage>,
    pub os: String,
    pub arch: String,
    pub processes: Vec<ProcessEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

impl MemoryUsage {
    /// `None` when the total is zero, which is how a failed read shows up.
    pub fn new(total_bytes: u64, used_bytes: u64) -> Option<Self> {
        (total_bytes > 0).then_some(Self {
            total_bytes,
            used_bytes: used_bytes.min(total_bytes),
        })
    }

    pub fn usage_percent(&self) -> f64 {
        (self.used_bytes as f64 / self.total_bytes as f64) * 100.0
    }
}

/// Supplies host samples. Implementations may block for the CPU window.
pub trait MetricsSource: Send {
    fn sample(&mut self) -> HostSample;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetProcess {
    pub pid: u32,
    pub name: String,
}

impl TargetProcess {
    pub fn new(pid: u32, name: impl Into<String>) -> Option<Self> {
        (pid > 0).then(|| Self {
            pid,
            name: name.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemStatus {
    pub collected_at_unix: i64,
    pub cpu_usage: Option<f64>,
    pub memory: Option<MemoryUsage>,
    pub os: String,
    pub arch: String,
    pub target: Option<TargetProcess>,
}

impl SystemStatus {
    /// Status for when the source could not be queried at all.
    pub fn unavailable(collected_at_unix: i64) -> Self {
        Self {
            collected_at_unix,
            cpu_usage: None,
            memory: None,
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            target: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.target.is_some()
    }

    pub fn sunshine_pid(&self) -> u32 {
        self.target.as_ref().map_or(0, |t| t.pid)
    }

    pub fn mem_usage(&self) -> Option<f64> {
        self.memory.map(|m| m.usage_percent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_total_memory_is_unmeasured() {
        assert!(MemoryUsage::new(0, 0).is_none());
        let m = MemoryUsage::new(1000, 400).unwrap();
        assert!((m.usage_percent() - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn pid_zero_is_never_a_target() {
        assert!(TargetProcess::new(0, "sunshine").is_none());
        assert_eq!(TargetProcess::new(7, "sunshine").unwrap().pid, 7);
    }

    #[test]
    fn pid_is_zero_when_not_running() {
        let status = SystemStatus::unavailable(5);
        assert!(!status.is_running());
        assert_eq!(status.sunshine_pid(), 0);
        assert_eq!(status.mem_usage(), None);
    }
}
