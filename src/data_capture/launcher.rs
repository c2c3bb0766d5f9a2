use std::process::Stdio;

use tokio::process::{Child, Command};

use super::types::CaptureTarget;
use crate::configuration::config::MonitorConfig;
use crate::configuration::types::NetworkRange;
use crate::error_handling::types::CaptureError;

/// Starts the external process that observes one session's packets.
///
/// The returned child must have a piped stdout; stderr is optional.
pub trait CaptureLauncher: Send + Sync {
    fn launch(&self, target: &CaptureTarget) -> Result<Child, CaptureError>;

    /// Human-readable command line, for the operational log.
    fn command_line(&self, target: &CaptureTarget) -> String;
}

/// Runs `tcpdump -i <iface> -n -l <filter>` for a session.
#[derive(Debug, Clone)]
pub struct TcpdumpLauncher {
    program: String,
    interface: String,
    monitored: Vec<NetworkRange>,
}

impl TcpdumpLauncher {
    pub fn new(program: &str, interface: &str, monitored: &[NetworkRange]) -> Self {
        Self {
            program: program.to_string(),
            interface: interface.to_string(),
            monitored: monitored.to_vec(),
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(
            &config.capture_tool,
            &config.network_interface,
            &config.monitored_networks,
        )
    }

    /// `src <virtual> and (net <a> or net <b>)`, or just `src <virtual>` without ranges.
    pub fn filter_expression(&self, virtual_address: &str) -> String {
        if self.monitored.is_empty() {
            return format!("src {}", virtual_address);
        }
        let nets = self
            .monitored
            .iter()
            .map(|n| format!("net {}", n))
            .collect::<Vec<_>>()
            .join(" or ");
        format!("src {} and ({})", virtual_address, nets)
    }

    fn args(&self, target: &CaptureTarget) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.interface.clone(),
            "-n".to_string(),
            // line buffered, otherwise output arrives in 4k blocks
            "-l".to_string(),
            self.filter_expression(&target.virtual_address),
        ]
    }
}

impl CaptureLauncher for TcpdumpLauncher {
    fn launch(&self, target: &CaptureTarget) -> Result<Child, CaptureError> {
        Command::new(&self.program)
            .args(self.args(target))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::LaunchFailed(format!("{}: {}", self.program, e)))
    }

    fn command_line(&self, target: &CaptureTarget) -> String {
        let mut parts = vec![self.program.clone()];
        for arg in self.args(target) {
            if arg.contains(' ') {
                parts.push(format!("'{}'", arg));
            } else {
                parts.push(arg);
            }
        }
        parts.join(" ")
    }
}
