use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::classifier::Classifier;
use super::launcher::CaptureLauncher;
use super::reader::{drain_stderr, read_capture_output, ReaderContext};
use super::resolver::HostResolver;
use super::types::CaptureTarget;
use crate::configuration::types::NetworkRange;
use crate::error_handling::types::CaptureError;
use crate::session_management::session::Session;
use crate::storage::storage_trait::VisitLog;

/// A running capture process together with the tasks consuming its output.
///
/// Process and reader share a lifetime: they are only ever dropped together
/// through [`terminate`].
pub struct CaptureProcess {
    pub target: CaptureTarget,
    pub started_at: DateTime<Utc>,
    child: Child,
    reader: JoinHandle<usize>,
    stderr_drain: Option<JoinHandle<()>>,
}

/// Aggregate counters describing current and historical capture state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Number of captures currently tracked as active.
    pub active_count: usize,
    /// Total number of captures successfully started since supervisor init.
    pub total_started: u64,
    /// Number of launches that failed.
    pub failed_count: u64,
    /// Number of captures found dead and removed by a sync.
    pub reaped_count: u64,
}

/// What a [`CaptureSupervisor::sync`] call changed, by real address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub started: Vec<String>,
    pub stopped: Vec<String>,
    pub failed: Vec<String>,
    pub reaped: Vec<String>,
    /// Running captures replaced because their session's virtual address or id changed.
    pub restarted: Vec<String>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.started.is_empty()
            && self.stopped.is_empty()
            && self.failed.is_empty()
            && self.reaped.is_empty()
            && self.restarted.is_empty()
    }
}

#[derive(Default)]
struct SupervisorState {
    processes: HashMap<String, CaptureProcess>,
    stats: CaptureStats,
}

/// Owns one capture process per active real address.
///
/// The process map is only reachable through `start`, `stop`, `sync` and
/// `shutdown`; all of them serialize on the same lock, so the reconciliation
/// loop and an explicit delete can't race into duplicate or orphaned captures.
pub struct CaptureSupervisor {
    launcher: Arc<dyn CaptureLauncher>,
    visit_log: Arc<dyn VisitLog>,
    resolver: Arc<dyn HostResolver>,
    monitored: Vec<NetworkRange>,
    stop_grace: Duration,
    state: Mutex<SupervisorState>,
}

impl CaptureSupervisor {
    pub fn new(
        launcher: Arc<dyn CaptureLauncher>,
        visit_log: Arc<dyn VisitLog>,
        resolver: Arc<dyn HostResolver>,
        monitored: &[NetworkRange],
        stop_grace: Duration,
    ) -> Self {
        info!("Initializing CaptureSupervisor");
        Self {
            launcher,
            visit_log,
            resolver,
            monitored: monitored.to_vec(),
            stop_grace,
            state: Mutex::new(SupervisorState::default()),
        }
    }

    /// Starts a capture for `session` unless one already runs for its real address.
    ///
    /// Returns `Ok(false)` when a capture was already registered.
    pub async fn start(&self, session: &Session) -> Result<bool, CaptureError> {
        let mut state = self.state.lock().await;
        self.start_locked(&mut state, session)
    }

    /// Stops the capture for `real_address`. Returns `false` if there was none.
    pub async fn stop(&self, real_address: &str) -> bool {
        let mut state = self.state.lock().await;
        self.stop_locked(&mut state, real_address).await
    }

    /// Brings the running captures in line with `desired`, keyed by real address.
    ///
    /// Dead captures are reaped first so they get restarted. Calling `sync` twice
    /// with the same map changes nothing the second time.
    pub async fn sync(&self, desired: &BTreeMap<String, Session>) -> SyncReport {
        let mut state = self.state.lock().await;
        let mut report = SyncReport {
            reaped: self.reap_exited(&mut state).await,
            ..Default::default()
        };

        let stale: Vec<String> = state
            .processes
            .keys()
            .filter(|real| !desired.contains_key(*real))
            .cloned()
            .collect();
        for real in stale {
            if self.stop_locked(&mut state, &real).await {
                report.stopped.push(real);
            }
        }

        // A capture filters on the virtual address it was started with.
        let outdated: Vec<String> = state
            .processes
            .iter()
            .filter(|(real, process)| {
                desired
                    .get(*real)
                    .is_some_and(|session| CaptureTarget::from(session) != process.target)
            })
            .map(|(real, _)| real.clone())
            .collect();
        for real in &outdated {
            info!("[{}] Session changed, restarting its capture", real);
            self.stop_locked(&mut state, real).await;
        }

        for session in desired.values() {
            if state.processes.contains_key(&session.real_address) {
                continue;
            }
            let real = session.real_address.clone();
            match self.start_locked(&mut state, session) {
                Ok(true) if outdated.contains(&real) => report.restarted.push(real),
                Ok(true) => report.started.push(real),
                Ok(false) => {}
                Err(_) => report.failed.push(real),
            }
        }

        if !report.is_empty() {
            debug!(
                "Capture sync: started={:?} stopped={:?} restarted={:?} failed={:?} reaped={:?}",
                report.started, report.stopped, report.restarted, report.failed, report.reaped
            );
        }
        report
    }

    /// Stops every capture. Returns how many were running.
    pub async fn shutdown(&self) -> usize {
        let mut state = self.state.lock().await;
        let all: Vec<String> = state.processes.keys().cloned().collect();
        info!("Stopping {} active capture(s)", all.len());
        for real in &all {
            self.stop_locked(&mut state, real).await;
        }
        all.len()
    }

    pub async fn active_addresses(&self) -> BTreeSet<String> {
        self.state.lock().await.processes.keys().cloned().collect()
    }

    pub async fn is_active(&self, real_address: &str) -> bool {
        self.state.lock().await.processes.contains_key(real_address)
    }

    /// OS process id of the capture for `real_address`, while it is running.
    pub async fn process_id(&self, real_address: &str) -> Option<u32> {
        self.state
            .lock()
            .await
            .processes
            .get(real_address)
            .and_then(|p| p.child.id())
    }

    /// What the capture for `real_address` is currently filtering on.
    pub async fn target(&self, real_address: &str) -> Option<CaptureTarget> {
        self.state
            .lock()
            .await
            .processes
            .get(real_address)
            .map(|p| p.target.clone())
    }

    pub async fn stats(&self) -> CaptureStats {
        let state = self.state.lock().await;
        let mut stats = state.stats.clone();
        stats.active_count = state.processes.len();
        stats
    }

    fn start_locked(
        &self,
        state: &mut SupervisorState,
        session: &Session,
    ) -> Result<bool, CaptureError> {
        let real = session.real_address.clone();
        if state.processes.contains_key(&real) {
            debug!("[{}] Capture already running", real);
            return Ok(false);
        }

        let target = CaptureTarget::from(session);
        info!(
            "[{}] Executing a command to monitor network traffic: {}",
            real,
            self.launcher.command_line(&target)
        );

        let mut child = self.launcher.launch(&target).map_err(|e| {
            error!("[{}] Unable to start traffic monitoring: {}", real, e);
            state.stats.failed_count += 1;
            e
        })?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                error!("[{}] Capture process was started without a stdout pipe", real);
                let _ = child.start_kill();
                state.stats.failed_count += 1;
                return Err(CaptureError::MissingStdout);
            }
        };

        let stderr_drain = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(drain_stderr(stderr, real.clone())));

        let ctx = ReaderContext {
            target: target.clone(),
            classifier: Classifier::new(&target.virtual_address, &self.monitored),
            visit_log: Arc::clone(&self.visit_log),
            resolver: Arc::clone(&self.resolver),
        };
        let reader = tokio::spawn(read_capture_output(stdout, ctx));
        debug!(
            "[{}] Start user traffic monitoring task ({})",
            real, target.session_id
        );

        state.processes.insert(
            real.clone(),
            CaptureProcess {
                target,
                started_at: Utc::now(),
                child,
                reader,
                stderr_drain,
            },
        );
        state.stats.total_started += 1;

        info!(
            "[{}] Capture started for {} ({})",
            real, session.virtual_address, session.session_id
        );
        Ok(true)
    }

    async fn stop_locked(&self, state: &mut SupervisorState, real_address: &str) -> bool {
        let Some(process) = state.processes.remove(real_address) else {
            debug!("[{}] No capture to stop", real_address);
            return false;
        };

        info!("[{}] Stop user traffic monitoring", real_address);
        terminate(process, self.stop_grace).await;
        info!("[{}] Capture stopped", real_address);
        true
    }

    async fn reap_exited(&self, state: &mut SupervisorState) -> Vec<String> {
        let mut exited = Vec::new();
        for (real, process) in state.processes.iter_mut() {
            match process.child.try_wait() {
                Ok(Some(status)) => {
                    warn!(
                        "[{}] Capture process exited on its own ({}), will restart",
                        real, status
                    );
                    exited.push(real.clone());
                }
                Ok(None) => {}
                Err(e) => warn!("[{}] Unable to poll capture process: {}", real, e),
            }
        }

        for real in &exited {
            if let Some(process) = state.processes.remove(real) {
                terminate(process, self.stop_grace).await;
                state.stats.reaped_count += 1;
            }
        }
        exited
    }
}

/// SIGTERM, then SIGKILL after `grace`; then the reader gets `grace` to drain
/// what is left before it is aborted.
async fn terminate(mut process: CaptureProcess, grace: Duration) {
    let real = process.target.real_address.clone();

    match process.child.try_wait() {
        Ok(Some(status)) => debug!("[{}] Capture process already exited ({})", real, status),
        _ => {
            if let Some(pid) = process.child.id() {
                if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    warn!("[{}] Failed to send SIGTERM to {}: {}", real, pid, e);
                }
            }
            match timeout(grace, process.child.wait()).await {
                Ok(Ok(status)) => {
                    debug!("[{}] Terminated user traffic monitoring process ({})", real, status)
                }
                Ok(Err(e)) => warn!("[{}] Failed to wait for capture process: {}", real, e),
                Err(_) => {
                    warn!(
                        "[{}] Capture process still running {:?} after SIGTERM, killing it",
                        real, grace
                    );
                    if let Err(e) = process.child.kill().await {
                        error!("[{}] Failed to kill capture process: {}", real, e);
                    }
                }
            }
        }
    }

    match timeout(grace, &mut process.reader).await {
        Ok(Ok(visits)) => debug!(
            "[{}] Stopped user traffic monitoring task after {} visit(s)",
            real, visits
        ),
        Ok(Err(e)) => warn!("[{}] Capture reader task failed: {}", real, e),
        Err(_) => {
            warn!("[{}] Capture reader did not finish, aborting it", real);
            process.reader.abort();
        }
    }

    if let Some(drain) = process.stderr_drain.take() {
        drain.abort();
    }
}
