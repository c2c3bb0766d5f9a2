//! Session management
//!
//! Keeps the registry of connected clients and the identifiers given to them.

/// Session data structure.
pub mod session;
/// Registry reconciling snapshots into persisted sessions.
pub mod session_registry;

pub use session::Session;
pub use session_registry::SessionRegistry;
