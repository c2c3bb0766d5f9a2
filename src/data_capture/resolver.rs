use std::net::IpAddr;

use log::debug;

/// Best-effort reverse lookup of a destination's display name.
///
/// Implementations may block; callers run them off the async executor.
pub trait HostResolver: Send + Sync {
    fn resolve(&self, ip: IpAddr) -> Option<String>;
}

/// Reverse DNS through the system resolver.
pub struct DnsResolver;

impl HostResolver for DnsResolver {
    fn resolve(&self, ip: IpAddr) -> Option<String> {
        match dns_lookup::lookup_addr(&ip) {
            // Some resolvers answer with the address itself when there is no PTR record.
            Ok(hostname) if hostname != ip.to_string() => Some(hostname),
            Ok(_) => None,
            Err(e) => {
                debug!("Reverse DNS lookup failed for {}: {}", ip, e);
                None
            }
        }
    }
}

/// Used when hostname resolution is disabled.
pub struct NoResolver;

impl HostResolver for NoResolver {
    fn resolve(&self, _ip: IpAddr) -> Option<String> {
        None
    }
}
