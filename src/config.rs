use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_cpu_sample_ms")]
    pub cpu_sample_ms: u64,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetConfig {
    #[serde(default = "default_process_names")]
    pub process_names: Vec<String>,
    /// Overrides the platform's default install path.
    #[serde(default)]
    pub executable: Option<PathBuf>,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthConfig {
    #[serde(default = "default_memory_critical_percent")]
    pub memory_critical_percent: f64,
    #[serde(default)]
    pub backoff: BackoffConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            interval_secs: default_interval_secs(),
            cpu_sample_ms: default_cpu_sample_ms(),
            target: TargetConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            process_names: default_process_names(),
            executable: None,
            settle_ms: default_settle_ms(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            memory_critical_percent: default_memory_critical_percent(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            enabled: default_backoff_enabled(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation("listen is required".to_string()));
        }
        if SocketAddr::from_str(&self.listen).is_err() {
            return Err(ConfigError::Validation(
                "listen must be a valid host:port address".to_string(),
            ));
        }
        if self.interval_secs < 1 {
            return Err(ConfigError::Validation(
                "interval_secs must be >= 1".to_string(),
            ));
        }
        if self.cpu_sample_ms < 100 {
            return Err(ConfigError::Validation(
                "cpu_sample_ms must be >= 100".to_string(),
            ));
        }

        validate_target(&self.target)?;
        validate_health(&self.health, self.interval_secs)?;

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn cpu_sample_window(&self) -> Duration {
        Duration::from_millis(self.cpu_sample_ms)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

impl TargetConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

fn validate_target(cfg: &TargetConfig) -> Result<(), ConfigError> {
    if cfg.process_names.is_empty() {
        return Err(ConfigError::Validation(
            "target.process_names must not be empty".to_string(),
        ));
    }
    if cfg.process_names.iter().any(|n| n.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "target.process_names[*] must not be blank".to_string(),
        ));
    }
    if let Some(path) = &cfg.executable {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "target.executable must not be empty when set".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_health(cfg: &HealthConfig, interval_secs: u64) -> Result<(), ConfigError> {
    if !(0.0..=100.0).contains(&cfg.memory_critical_percent) {
        return Err(ConfigError::Validation(
            "health.memory_critical_percent must be in range 0..100".to_string(),
        ));
    }
    if cfg.backoff.enabled && cfg.backoff.max_delay_secs < interval_secs {
        return Err(ConfigError::Validation(format!(
            "health.backoff.max_delay_secs must be >= interval_secs ({interval_secs})"
        )));
    }
    Ok(())
}

fn default_listen() -> String {
    "0.0.0.0:19000".to_string()
}

const fn default_interval_secs() -> u64 {
    10
}

const fn default_cpu_sample_ms() -> u64 {
    1000
}

fn default_process_names() -> Vec<String> {
    vec!["sunshine".to_string(), "sunshine.exe".to_string()]
}

const fn default_settle_ms() -> u64 {
    2000
}

const fn default_memory_critical_percent() -> f64 {
    90.0
}

const fn default_backoff_enabled() -> bool {
    true
}

const fn default_max_delay_secs() -> u64 {
    300
}
