use super::types::*;
use crate::error_handling::types::ConfigError;
use log::debug;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration loaded from a TOML file.
///
/// ```toml
/// [paths]
/// status_file = "/var/log/openvpn/status.log"
/// sessions_file = "/var/lib/ovpn-monitor/sessions.json"
/// visit_log = "/var/log/ovpn-monitor/traffic.log"
///
/// [monitor]
/// network_interface = "tun0"
/// monitored_networks = ["93.184.216.0/24"]
///
/// [logging]
/// level = "info"
/// ```
///
/// # Fields Overview
///
/// - `paths`: where the status report is read and where sessions and visits are written
/// - `monitor`: capture tool invocation and reconciliation loop tuning
/// - `logging`: operational log level and optional log file
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// OpenVPN status file (`status` directive, version 1 format).
    pub status_file: PathBuf,
    /// JSON registry of known sessions, rewritten atomically on every change.
    pub sessions_file: PathBuf,
    /// Append-only visit log.
    pub visit_log: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Interface the capture tool listens on, usually the tunnel device.
    pub network_interface: String,

    /// Destination ranges whose visits are recorded. Empty means every destination.
    #[serde(default)]
    pub monitored_networks: Vec<NetworkRange>,

    /// Name or path of the capture binary.
    #[serde(default = "default_capture_tool")]
    pub capture_tool: String,

    /// Delay between two reconciliation ticks.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a capture process gets to exit after SIGTERM before it is killed.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,

    /// Reverse-resolve destinations for the operational log.
    #[serde(default = "default_resolve_hostnames")]
    pub resolve_hostnames: bool,

    #[serde(default)]
    pub on_fatal_error: FailurePolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// When set, the operational log goes to this file instead of stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_capture_tool() -> String {
    "tcpdump".to_string()
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_stop_grace_ms() -> u64 {
    2000
}

fn default_resolve_hostnames() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Reads and validates the configuration file at `path`.
    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Config, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.network_interface.trim().is_empty() {
            return Err(ConfigError::MissingInterface);
        }
        if self.monitor.capture_tool.trim().is_empty() {
            return Err(ConfigError::NotInRange(
                "capture_tool must not be empty".to_string(),
            ));
        }
        if self.monitor.poll_interval_ms == 0 {
            return Err(ConfigError::NotInRange(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        for file in [&self.paths.sessions_file, &self.paths.visit_log] {
            check_parent_dir(file)?;
        }
        if let Some(ref file) = self.logging.file {
            check_parent_dir(file)?;
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.poll_interval_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.monitor.stop_grace_ms)
    }
}

fn check_parent_dir(file: &Path) -> Result<(), ConfigError> {
    match file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.is_dir() => Err(
            ConfigError::DirectoryDoesNotExist(format!(
                "{} (parent of {})",
                dir.display(),
                file.display()
            )),
        ),
        _ => Ok(()),
    }
}
