//! Storage subsystem
//!
//! This module provides abstractions and implementations for persisting the
//! session registry and the visit log.
//!
//! Components:
//! - `storage_trait`: the `RegistryStore` and `VisitLog` traits.
//! - `file_storage`: JSON registry file with atomic replace on save.
//! - `visit_log`: append-only text log of detected visits.
//! - `registry_lock`: keeps a second process from writing a registry in use.

pub mod file_storage;
pub mod registry_lock;
pub mod storage_trait;
pub mod visit_log;

pub use file_storage::FileRegistryStore;
pub use registry_lock::RegistryLock;
pub use storage_trait::{RegistryStore, VisitLog};
pub use visit_log::FileVisitLog;
