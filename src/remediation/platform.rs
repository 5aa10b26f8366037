use crate::config::TargetConfig;
use std::fmt;
use std::path::PathBuf;
use std::process::Command;

const WINDOWS_DEFAULT_EXECUTABLE: &str = r"C:\Program Files\Sunshine\sunshine.exe";
const UNIX_DEFAULT_EXECUTABLE: &str = "sunshine";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Unix,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Self {
        if os == "windows" {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }
}

/// How to kill and relaunch the target on one platform.
pub trait PlatformStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;
    /// Kills by process name, not PID.
    fn terminate_command(&self) -> Command;
    fn launch_command(&self) -> Command;
    fn executable(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct UnixStrategy {
    pub process_name: String,
    pub executable: PathBuf,
}

impl PlatformStrategy for UnixStrategy {
    fn name(&self) -> &'static str {
        "unix"
    }

    fn terminate_command(&self) -> Command {
        let mut cmd = Command::new("pkill");
        cmd.args(["-x", self.process_name.as_str()]);
        cmd
    }

    fn launch_command(&self) -> Command {
        Command::new(&self.executable)
    }

    fn executable(&self) -> String {
        self.executable.display().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct WindowsStrategy {
    pub image_name: String,
    pub executable: PathBuf,
}

impl PlatformStrategy for WindowsStrategy {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn terminate_command(&self) -> Command {
        let mut cmd = Command::new("taskkill");
        cmd.args(["/F", "/IM", self.image_name.as_str()]);
        cmd
    }

    fn launch_command(&self) -> Command {
        Command::new(&self.executable)
    }

    fn executable(&self) -> String {
        self.executable.display().to_string()
    }
}

pub fn select_strategy(platform: Platform, target: &TargetConfig) -> Box<dyn PlatformStrategy> {
    match platform {
        Platform::Windows => Box::new(WindowsStrategy {
            image_name: pick_name(&target.process_names, |n| n.ends_with(".exe"))
                .unwrap_or_else(|| "sunshine.exe".to_string()),
            executable: target
                .executable
                .clone()
                .unwrap_or_else(|| PathBuf::from(WINDOWS_DEFAULT_EXECUTABLE)),
        }),
        Platform::Unix => Box::new(UnixStrategy {
            process_name: pick_name(&target.process_names, |n| !n.ends_with(".exe"))
                .unwrap_or_else(|| "sunshine".to_string()),
            executable: target
                .executable
                .clone()
                .unwrap_or_else(|| PathBuf::from(UNIX_DEFAULT_EXECUTABLE)),
        }),
    }
}

fn pick_name(names: &[String], pred: impl Fn(&str) -> bool) -> Option<String> {
    names.iter().find(|n| pred(n.as_str())).cloned()
}
