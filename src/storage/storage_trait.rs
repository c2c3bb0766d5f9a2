//! Storage Traits
//!
//! This module defines the persistence interfaces used by the monitor:
//! - `RegistryStore` keeps the full session registry, keyed by real address
//! - `VisitLog` receives one append per detected visit
//!
//! All methods return a `Result` to handle potential storage errors.

use std::collections::BTreeMap;

use crate::data_capture::types::VisitRecord;
use crate::error_handling::types::StorageError;
use crate::session_management::session::Session;

/// Durable home of the session registry.
///
/// Implementors must make `save` all-or-nothing: a reader never observes a
/// partially written registry.
pub trait RegistryStore: Send + Sync {
    /// Loads the last persisted registry. A store that was never written is empty.
    fn load(&self) -> Result<BTreeMap<String, Session>, StorageError>;

    /// Replaces the persisted registry with `sessions`.
    fn save(&self, sessions: &BTreeMap<String, Session>) -> Result<(), StorageError>;
}

/// Append-only sink for visit records.
pub trait VisitLog: Send + Sync {
    fn append(&self, record: &VisitRecord) -> Result<(), StorageError>;
}
