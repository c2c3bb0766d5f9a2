use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error_handling::types::ConfigError;

/// A monitored destination range, written `address[/prefix]` in the configuration.
///
/// Host bits are masked away on parsing so the value can be handed to the capture
/// filter as a `net` primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NetworkRange {
    pub address: IpAddr,
    pub prefix: u8,
}

impl NetworkRange {
    pub fn new(address: IpAddr, prefix: u8) -> Result<Self, ConfigError> {
        let max = max_prefix(&address);
        if prefix > max {
            return Err(ConfigError::BadNetworkRange(format!(
                "prefix /{} is longer than {} bits for {}",
                prefix, max, address
            )));
        }
        Ok(Self {
            address: mask(address, prefix),
            prefix,
        })
    }

    /// Whether `ip` falls inside this range. Mixed address families never match.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.address, ip) {
            (IpAddr::V4(_), IpAddr::V4(_)) | (IpAddr::V6(_), IpAddr::V6(_)) => {
                mask(ip, self.prefix) == self.address
            }
            _ => false,
        }
    }
}

fn max_prefix(address: &IpAddr) -> u8 {
    match address {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn mask(address: IpAddr, prefix: u8) -> IpAddr {
    match address {
        IpAddr::V4(v4) => {
            let bits = u32::from(v4);
            let masked = if prefix == 0 { 0 } else { bits & (u32::MAX << (32 - prefix as u32)) };
            IpAddr::V4(masked.into())
        }
        IpAddr::V6(v6) => {
            let bits = u128::from(v6);
            let masked = if prefix == 0 { 0 } else { bits & (u128::MAX << (128 - prefix as u32)) };
            IpAddr::V6(masked.into())
        }
    }
}

impl FromStr for NetworkRange {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };
        let address: IpAddr = addr
            .parse()
            .map_err(|e| ConfigError::BadNetworkRange(format!("'{}': {}", s, e)))?;
        let prefix = match prefix {
            Some(p) => p
                .parse::<u8>()
                .map_err(|e| ConfigError::BadNetworkRange(format!("'{}': {}", s, e)))?,
            None => max_prefix(&address),
        };
        NetworkRange::new(address, prefix)
    }
}

impl TryFrom<String> for NetworkRange {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NetworkRange> for String {
    fn from(range: NetworkRange) -> Self {
        range.to_string()
    }
}

impl fmt::Display for NetworkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

/// What the reconciliation loop does when the status file or the registry fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the loop and exit with an error.
    #[default]
    Stop,
    /// Log the failure and try again on the next tick.
    Retry,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn parses_cidr_and_bare_host() {
        let net: NetworkRange = "93.184.216.0/24".parse().unwrap();
        assert_eq!(net.address, IpAddr::V4(Ipv4Addr::new(93, 184, 216, 0)));
        assert_eq!(net.prefix, 24);

        let host: NetworkRange = "140.82.112.3".parse().unwrap();
        assert_eq!(host.prefix, 32);
        assert_eq!(host.to_string(), "140.82.112.3/32");
    }

    #[test]
    fn masks_host_bits() {
        let net: NetworkRange = "10.0.0.5/8".parse().unwrap();
        assert_eq!(net.to_string(), "10.0.0.0/8");
    }

    #[test]
    fn rejects_garbage() {
        assert!("example.com".parse::<NetworkRange>().is_err());
        assert!("10.0.0.0/33".parse::<NetworkRange>().is_err());
        assert!("10.0.0.0/abc".parse::<NetworkRange>().is_err());
    }

    #[test]
    fn contains_respects_prefix_and_family() {
        let net: NetworkRange = "93.184.216.0/24".parse().unwrap();
        assert!(net.contains(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))));
        assert!(!net.contains(IpAddr::V4(Ipv4Addr::new(93, 184, 217, 34))));
        assert!(!net.contains(IpAddr::V6(Ipv6Addr::LOCALHOST)));

        let v6: NetworkRange = "2001:db8::/32".parse().unwrap();
        assert!(v6.contains("2001:db8:1::1".parse().unwrap()));

        let everything: NetworkRange = "0.0.0.0/0".parse().unwrap();
        assert!(everything.contains(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))));
    }

    #[test]
    fn failure_policy_is_lowercase_in_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: FailurePolicy,
        }
        let w: Wrapper = toml::from_str("policy = \"retry\"").unwrap();
        assert_eq!(w.policy, FailurePolicy::Retry);
    }
}
