//! Test doubles shared by the capture and controller tests.

use std::net::IpAddr;
use std::process::Stdio;
use std::sync::Mutex;

use tokio::process::{Child, Command};

use super::launcher::CaptureLauncher;
use super::resolver::HostResolver;
use super::types::{CaptureTarget, VisitRecord};
use crate::error_handling::types::{CaptureError, StorageError};
use crate::storage::storage_trait::VisitLog;

/// Runs `sh -c <script> sh <virtual_address>` as a stand-in capture tool.
pub struct ScriptLauncher {
    pub script: String,
}

impl ScriptLauncher {
    pub fn new(script: &str) -> Self {
        Self {
            script: script.to_string(),
        }
    }
}

impl CaptureLauncher for ScriptLauncher {
    fn launch(&self, target: &CaptureTarget) -> Result<Child, CaptureError> {
        Command::new("sh")
            .arg("-c")
            .arg(&self.script)
            .arg("sh")
            .arg(&target.virtual_address)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::LaunchFailed(e.to_string()))
    }

    fn command_line(&self, _target: &CaptureTarget) -> String {
        format!("sh -c {:?}", self.script)
    }
}

pub struct FailingLauncher;

impl CaptureLauncher for FailingLauncher {
    fn launch(&self, _target: &CaptureTarget) -> Result<Child, CaptureError> {
        Err(CaptureError::LaunchFailed("no such tool".into()))
    }

    fn command_line(&self, _target: &CaptureTarget) -> String {
        "missing-tool".into()
    }
}

#[derive(Default)]
pub struct MemVisitLog {
    pub records: Mutex<Vec<VisitRecord>>,
}

impl VisitLog for MemVisitLog {
    fn append(&self, record: &VisitRecord) -> Result<(), StorageError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

pub struct StaticResolver;

impl HostResolver for StaticResolver {
    fn resolve(&self, _ip: IpAddr) -> Option<String> {
        Some("example.com".into())
    }
}
