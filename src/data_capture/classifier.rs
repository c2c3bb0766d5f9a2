//! Classification of capture tool output.
//!
//! This is the only place that knows the tcpdump text format. With `-n`, one
//! packet is printed per line as:
//!
//! ```text
//! 12:00:00.123456 IP 10.8.0.2.54321 > 93.184.216.34.443: Flags [S], seq 1, length 0
//! 12:00:00.123456 IP 10.8.0.2 > 8.8.8.8: ICMP echo request, id 7, seq 1, length 64
//! 12:00:00.123456 IP6 fd00::2.5353 > 2001:db8::1.443: Flags [P.], length 20
//! ```
//!
//! The token after `>` holds the destination, followed by an optional `.port`
//! and a `:` terminator.

use std::net::IpAddr;

use crate::configuration::types::NetworkRange;

/// Extracts the destination address from one line of tcpdump output.
///
/// Returns `None` for anything that is not a numeric IPv4/IPv6 packet line
/// (banners, warnings, truncated lines).
pub fn extract_destination(line: &str) -> Option<IpAddr> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let arrow = fields.iter().position(|f| *f == ">")?;
    if !fields[..arrow].iter().any(|f| *f == "IP" || *f == "IP6") {
        return None;
    }
    bare_address(fields.get(arrow + 1)?)
}

fn bare_address(token: &str) -> Option<IpAddr> {
    // One `:` ends the address field; more would eat into an IPv6 `::`.
    let token = token.strip_suffix(':').unwrap_or(token);
    if let Ok(ip) = token.parse::<IpAddr>() {
        return Some(ip);
    }
    let (host, _port) = token.rsplit_once('.')?;
    host.parse::<IpAddr>().ok()
}

/// Decides whether a capture line is a visit for one session.
#[derive(Debug, Clone)]
pub struct Classifier {
    virtual_address: String,
    monitored: Vec<NetworkRange>,
}

impl Classifier {
    pub fn new(virtual_address: &str, monitored: &[NetworkRange]) -> Self {
        Self {
            virtual_address: virtual_address.to_string(),
            monitored: monitored.to_vec(),
        }
    }

    /// The visited destination, or `None` when the line is noise, self-traffic,
    /// or outside every monitored range.
    pub fn classify(&self, line: &str) -> Option<IpAddr> {
        let destination = extract_destination(line)?;

        if self.is_self(destination) {
            return None;
        }
        if !self.monitored.is_empty() && !self.monitored.iter().any(|n| n.contains(destination)) {
            return None;
        }
        Some(destination)
    }

    fn is_self(&self, destination: IpAddr) -> bool {
        match self.virtual_address.parse::<IpAddr>() {
            Ok(own) => own == destination,
            Err(_) => self.virtual_address == destination.to_string(),
        }
    }
}
