pub mod capture_supervisor;
pub mod classifier;
pub mod launcher;
pub mod reader;
pub mod resolver;
pub mod types;

pub use capture_supervisor::{CaptureStats, CaptureSupervisor, SyncReport};
pub use classifier::Classifier;
pub use launcher::{CaptureLauncher, TcpdumpLauncher};
pub use resolver::{DnsResolver, HostResolver, NoResolver};
pub use types::{CaptureTarget, VisitRecord};

#[cfg(test)]
pub(crate) mod test_utils;
