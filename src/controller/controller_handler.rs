use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::Mutex;

use crate::configuration::config::Config;
use crate::configuration::types::FailurePolicy;
use crate::data_capture::capture_supervisor::{CaptureSupervisor, SyncReport};
use crate::data_capture::launcher::TcpdumpLauncher;
use crate::data_capture::resolver::{DnsResolver, HostResolver, NoResolver};
use crate::error_handling::types::ControllerError;
use crate::session_management::session::Session;
use crate::session_management::session_registry::SessionRegistry;
use crate::status::read_snapshot;
use crate::storage::file_storage::FileRegistryStore;
use crate::storage::registry_lock::RegistryLock;
use crate::storage::visit_log::FileVisitLog;

/// Drives the monitor: status snapshot, then registry, then captures, on every tick.
///
/// # Fields Overview
///
/// - `config`: loaded configuration
/// - `registry`: persisted sessions, shared with the administrative operations
/// - `supervisor`: live capture processes, one per registered session
/// - `registry_lock`: keeps the CLI from editing the registry file under a running monitor
pub struct Controller {
    config: Config,
    registry: Mutex<SessionRegistry>,
    supervisor: CaptureSupervisor,
    registry_lock: Option<RegistryLock>,
}

impl Controller {
    /// Builds the controller with the file-backed registry, the visit log and tcpdump.
    ///
    /// Fails with `StorageError::Locked` if another process holds the registry.
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing Controller");

        let registry_lock = RegistryLock::acquire(&config.paths.sessions_file)?;
        let registry = SessionRegistry::open(Box::new(FileRegistryStore::new(
            &config.paths.sessions_file,
        )))?;

        let resolver: Arc<dyn HostResolver> = if config.monitor.resolve_hostnames {
            Arc::new(DnsResolver)
        } else {
            Arc::new(NoResolver)
        };
        let supervisor = CaptureSupervisor::new(
            Arc::new(TcpdumpLauncher::from_config(&config.monitor)),
            Arc::new(FileVisitLog::new(&config.paths.visit_log)),
            resolver,
            &config.monitor.monitored_networks,
            config.stop_grace(),
        );

        let mut controller = Self::with_components(config, registry, supervisor);
        controller.registry_lock = Some(registry_lock);
        Ok(controller)
    }

    pub fn with_components(
        config: Config,
        registry: SessionRegistry,
        supervisor: CaptureSupervisor,
    ) -> Self {
        Self {
            config,
            registry: Mutex::new(registry),
            supervisor,
            registry_lock: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn supervisor(&self) -> &CaptureSupervisor {
        &self.supervisor
    }

    /// One reconciliation pass.
    ///
    /// An unreadable status file or an unpersistable registry aborts the tick
    /// before any capture is touched.
    pub async fn tick(&self) -> Result<SyncReport, ControllerError> {
        let snapshot = read_snapshot(&self.config.paths.status_file)?;
        let desired = self.registry.lock().await.reconcile(&snapshot)?;
        let report = self.supervisor.sync(&desired).await;

        for real in &report.failed {
            error!("[{}] Capture could not be started, retrying next tick", real);
        }
        debug!(
            "Tick done: {} session(s), {} started, {} stopped, {} restarted",
            desired.len(),
            report.started.len(),
            report.stopped.len(),
            report.restarted.len()
        );
        Ok(report)
    }

    /// Runs ticks every `poll_interval_ms` until `shutdown` resolves, then stops
    /// every capture.
    ///
    /// With the `stop` policy the first fatal-input error ends the loop and is
    /// returned. With `retry` it is logged and the next tick tries again.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), ControllerError>
    where
        F: Future<Output = ()>,
    {
        info!(
            "Monitoring {} every {:?}",
            self.config.paths.status_file.display(),
            self.config.poll_interval()
        );
        tokio::pin!(shutdown);

        let mut outcome = Ok(());
        loop {
            match self.tick().await {
                Ok(_) => {}
                Err(e) if e.is_fatal_input() => match self.config.monitor.on_fatal_error {
                    FailurePolicy::Stop => {
                        error!("{}, stopping the monitor", e);
                        outcome = Err(e);
                        break;
                    }
                    FailurePolicy::Retry => warn!("{}, retrying next tick", e),
                },
                Err(e) => error!("{}", e),
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        self.shutdown().await;
        outcome
    }

    pub async fn shutdown(&self) {
        let stopped = self.supervisor.shutdown().await;
        info!("Controller shut down, {} capture(s) stopped", stopped);
    }

    pub fn holds_registry_lock(&self) -> bool {
        self.registry_lock.is_some()
    }

    /// Registers a session by hand and starts its capture.
    pub async fn add_session(
        &self,
        real_address: &str,
        virtual_address: &str,
        common_name: &str,
    ) -> Result<Session, ControllerError> {
        let session = self
            .registry
            .lock()
            .await
            .add(real_address, virtual_address, common_name)?;

        // A replaced entry may still have a capture bound to the old virtual address.
        self.supervisor.stop(real_address).await;
        if let Err(e) = self.supervisor.start(&session).await {
            warn!("[{}] Session added without capture: {}", real_address, e);
        }
        Ok(session)
    }

    /// Removes a session and stops its capture. `Ok(None)` if it was unknown.
    pub async fn delete_session(
        &self,
        real_address: &str,
    ) -> Result<Option<Session>, ControllerError> {
        let removed = self.registry.lock().await.remove(real_address)?;
        if removed.is_some() {
            self.supervisor.stop(real_address).await;
        }
        Ok(removed)
    }

    pub async fn sessions(&self) -> BTreeMap<String, Session> {
        self.registry.lock().await.sessions().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_capture::test_utils::{MemVisitLog, ScriptLauncher, StaticResolver};
    use crate::error_handling::types::StorageError;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    const HEADER: &str = "OpenVPN CLIENT LIST\n\
Updated,Mon Oct 19 12:00:00 2026\n\
Common Name,Real Address,Bytes Received,Bytes Sent,Connected Since\n\
ROUTING TABLE\n\
Virtual Address,Common Name,Real Address,Last Ref\n";
    const TRAILER: &str = "GLOBAL STATS\nMax bcast/mcast queue length,0\nEND\n";
    const ALICE: &str = "10.8.0.2,alice,203.0.113.5:54321,Mon Oct 19 12:00:00 2026\n";
    const BOB: &str = "10.8.0.3,bob,198.51.100.7:1194,Mon Oct 19 12:00:01 2026\n";

    fn write_status(path: &Path, rows: &[&str]) {
        fs::write(path, format!("{}{}{}", HEADER, rows.concat(), TRAILER)).unwrap();
    }

    fn controller(dir: &Path, policy: &str) -> Controller {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = Config::from_toml_str(&format!(
            r#"
[paths]
status_file = "{dir}/status.log"
sessions_file = "{dir}/sessions.json"
visit_log = "{dir}/traffic.log"

[monitor]
network_interface = "tun0"
poll_interval_ms = 50
stop_grace_ms = 300
on_fatal_error = "{policy}"
"#,
            dir = dir.display(),
            policy = policy
        ))
        .unwrap();

        let registry = SessionRegistry::open(Box::new(FileRegistryStore::new(
            &config.paths.sessions_file,
        )))
        .unwrap();
        let supervisor = CaptureSupervisor::new(
            Arc::new(ScriptLauncher::new("exec sleep 30")),
            Arc::new(MemVisitLog::default()),
            Arc::new(StaticResolver),
            &[],
            config.stop_grace(),
        );
        Controller::with_components(config, registry, supervisor)
    }

    #[tokio::test]
    async fn test_tick_follows_connected_clients() {
        let dir = TempDir::new().unwrap();
        let status = dir.path().join("status.log");
        let controller = controller(dir.path(), "stop");

        write_status(&status, &[ALICE, BOB]);
        let report = controller.tick().await.unwrap();
        assert_eq!(report.started.len(), 2);
        let alice_id = controller.sessions().await["203.0.113.5"].session_id;

        write_status(&status, &[ALICE]);
        let report = controller.tick().await.unwrap();

        assert_eq!(report.stopped, vec!["198.51.100.7".to_string()]);
        assert!(report.started.is_empty());
        let active: Vec<String> = controller
            .supervisor()
            .active_addresses()
            .await
            .into_iter()
            .collect();
        assert_eq!(active, vec!["203.0.113.5".to_string()]);
        assert_eq!(
            controller.sessions().await["203.0.113.5"].session_id,
            alice_id
        );

        controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconnect_with_new_virtual_address_moves_the_capture() {
        let dir = TempDir::new().unwrap();
        let status = dir.path().join("status.log");
        let controller = controller(dir.path(), "stop");

        write_status(&status, &[ALICE]);
        controller.tick().await.unwrap();
        let old_pid = controller.supervisor().process_id("203.0.113.5").await.unwrap();
        let alice_id = controller.sessions().await["203.0.113.5"].session_id;

        write_status(
            &status,
            &["10.8.0.9,alice,203.0.113.5:40001,Mon Oct 19 12:05:00 2026\n"],
        );
        let report = controller.tick().await.unwrap();

        assert_eq!(report.restarted, vec!["203.0.113.5".to_string()]);
        let target = controller.supervisor().target("203.0.113.5").await.unwrap();
        assert_eq!(target.virtual_address, "10.8.0.9");
        assert_eq!(target.session_id, alice_id);
        let new_pid = controller.supervisor().process_id("203.0.113.5").await.unwrap();
        assert_ne!(new_pid, old_pid);

        controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_running_monitor_locks_out_registry_edits() {
        let dir = TempDir::new().unwrap();
        let config = controller(dir.path(), "stop").config().clone();

        let monitor = Controller::new(config.clone()).unwrap();
        assert!(monitor.holds_registry_lock());

        let err = RegistryLock::acquire(&config.paths.sessions_file).err().unwrap();
        assert!(matches!(err, StorageError::Locked(_)));
        assert!(matches!(
            Controller::new(config.clone()).err(),
            Some(ControllerError::StorageError(StorageError::Locked(_)))
        ));

        drop(monitor);
        assert!(RegistryLock::acquire(&config.paths.sessions_file).is_ok());
    }

    #[tokio::test]
    async fn test_unreadable_status_is_fatal_and_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let status = dir.path().join("status.log");
        let controller = controller(dir.path(), "stop");

        write_status(&status, &[ALICE]);
        controller.tick().await.unwrap();
        fs::remove_file(&status).unwrap();

        let err = controller.tick().await.unwrap_err();
        assert!(err.is_fatal_input());
        assert!(controller.supervisor().is_active("203.0.113.5").await);
        assert_eq!(controller.sessions().await.len(), 1);

        controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_run_stops_on_fatal_error() {
        let dir = TempDir::new().unwrap();
        let controller = controller(dir.path(), "stop");

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            controller.run(std::future::pending::<()>()),
        )
        .await
        .expect("run should end on its own");

        assert!(matches!(result, Err(ControllerError::StatusError(_))));
    }

    #[tokio::test]
    async fn test_run_retries_until_shutdown() {
        let dir = TempDir::new().unwrap();
        let status = dir.path().join("status.log");
        let controller = controller(dir.path(), "retry");

        let writer = async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            write_status(&status, &[ALICE]);
            for _ in 0..100 {
                if controller.supervisor().is_active("203.0.113.5").await {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };

        let result = tokio::time::timeout(Duration::from_secs(10), controller.run(writer))
            .await
            .unwrap();

        assert!(result.is_ok());
        assert_eq!(controller.sessions().await.len(), 1);
        assert!(controller.supervisor().active_addresses().await.is_empty());
    }

    #[tokio::test]
    async fn test_add_and_delete_session() {
        let dir = TempDir::new().unwrap();
        let controller = controller(dir.path(), "stop");

        let session = controller
            .add_session("203.0.113.5", "10.8.0.2", "alice")
            .await
            .unwrap();
        assert!(controller.supervisor().is_active("203.0.113.5").await);

        let replaced = controller
            .add_session("203.0.113.5", "10.8.0.4", "alice")
            .await
            .unwrap();
        assert_ne!(replaced.session_id, session.session_id);
        assert_eq!(controller.supervisor().stats().await.total_started, 2);

        let removed = controller.delete_session("203.0.113.5").await.unwrap();
        assert_eq!(removed.map(|s| s.session_id), Some(replaced.session_id));
        assert!(!controller.supervisor().is_active("203.0.113.5").await);
        assert!(controller.delete_session("203.0.113.5").await.unwrap().is_none());
    }
}
