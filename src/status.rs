//! Connection status snapshot.
//!
//! Turns the OpenVPN status report into the list of currently connected clients.

pub mod parser;
pub mod types;

pub use parser::{parse_status, read_snapshot};
pub use types::RawSession;
