//! Common data types used across the data_capture subsystem.

use std::fmt;

use chrono::{DateTime, Local};
use uuid::Uuid;

use crate::session_management::session::Session;

/// What a capture process is started for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTarget {
    pub session_id: Uuid,
    pub real_address: String,
    pub virtual_address: String,
}

impl From<&Session> for CaptureTarget {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id,
            real_address: session.real_address.clone(),
            virtual_address: session.virtual_address.clone(),
        }
    }
}

/// A single detected visit. Written once to the visit log, never updated.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitRecord {
    pub timestamp: DateTime<Local>,
    pub session_id: Uuid,
    pub virtual_address: String,
    pub real_address: String,
    pub destination: String,
    /// Reverse-resolved name of `destination`, for the operational log only.
    pub hostname: Option<String>,
}

impl VisitRecord {
    pub fn new(target: &CaptureTarget, destination: String, hostname: Option<String>) -> Self {
        Self {
            timestamp: Local::now(),
            session_id: target.session_id,
            virtual_address: target.virtual_address.clone(),
            real_address: target.real_address.clone(),
            destination,
            hostname,
        }
    }
}

/// Visit log line: `[<timestamp>] <session_id> (<virtual>/<real>) visited the site <destination>`.
impl fmt::Display for VisitRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}/{}) visited the site {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.session_id,
            self.virtual_address,
            self.real_address,
            self.destination
        )
    }
}
