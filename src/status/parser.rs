//! Parser for the OpenVPN status report (version 1 format).
//!
//! Only the routing-table section is of interest:
//!
//! ```text
//! ROUTING TABLE
//! Virtual Address,Common Name,Real Address,Last Ref
//! 10.8.0.2,alice,203.0.113.5:54321,Mon Oct 19 12:00:00 2026
//! GLOBAL STATS
//! Max bcast/mcast queue length,0
//! END
//! ```

use std::path::Path;

use log::{debug, warn};

use super::types::RawSession;
use crate::error_handling::types::StatusError;

pub const CLIENT_LIST_HEADER: &str = "Virtual Address,Common Name,Real Address,Last Ref";
pub const CLIENT_LIST_TRAILER: &str = "GLOBAL STATS";

/// Reads the status report at `path` and returns the connected sessions.
///
/// A missing or unreadable file is an error, never an empty list.
pub fn read_snapshot(path: &Path) -> Result<Vec<RawSession>, StatusError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| StatusError::Unreadable(path.to_path_buf(), e))?;
    let sessions = parse_status(&content);
    debug!(
        "Read {} session(s) from status file {}",
        sessions.len(),
        path.display()
    );
    Ok(sessions)
}

/// Extracts the rows between the client-list header and the `GLOBAL STATS` trailer.
pub fn parse_status(content: &str) -> Vec<RawSession> {
    let mut sessions = Vec::new();
    let mut include = false;

    for line in content.lines() {
        let line = line.trim_end_matches('\r');

        if line == CLIENT_LIST_HEADER {
            include = true;
            continue;
        }
        if !include {
            continue;
        }
        if line == CLIENT_LIST_TRAILER {
            break;
        }

        match parse_row(line) {
            Some(session) => sessions.push(session),
            None => warn!("Skipping malformed status row: {:?}", line),
        }
    }

    sessions
}

fn parse_row(line: &str) -> Option<RawSession> {
    let mut fields = line.split(',');
    let virtual_address = fields.next()?.trim();
    let common_name = fields.next()?.trim();
    let real_address = strip_port(fields.next()?.trim());

    if virtual_address.is_empty() || real_address.is_empty() {
        return None;
    }

    Some(RawSession::new(virtual_address, common_name, real_address))
}

/// Removes a trailing `:port` from a real address.
///
/// `[2001:db8::1]:1194` is unwrapped; a bare IPv6 address (several colons, no
/// brackets) is returned untouched since there is no unambiguous port.
pub fn strip_port(address: &str) -> &str {
    if let Some(rest) = address.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((host, _)) => host,
            None => rest,
        };
    }
    match address.split_once(':') {
        Some((host, port)) if !port.contains(':') => host,
        _ => address,
    }
}
