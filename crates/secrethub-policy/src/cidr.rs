//! CIDR range matching.
//!
//! Ranges parse as `ip/prefix`; a bare IP is a host route (`/32` or
//! `/128`). Containment interprets addresses as big-endian integers and
//! compares under the prefix mask. IPv4 and IPv6 never match each other.

use std::net::IpAddr;
use std::str::FromStr;

use crate::error::{PolicyError, PolicyResult};

/// A parsed CIDR range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    /// Parse `ip/prefix` or a bare IP.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidCidr`] for unparseable addresses or
    /// prefixes out of range (`/0..=32` for IPv4, `/0..=128` for IPv6).
    pub fn parse(raw: &str) -> PolicyResult<Self> {
        let invalid = || PolicyError::InvalidCidr(raw.to_string());

        let (ip_part, prefix_part) = match raw.split_once('/') {
            Some((ip, prefix)) => (ip, Some(prefix)),
            None => (raw, None),
        };

        let network = IpAddr::from_str(ip_part.trim()).map_err(|_| invalid())?;
        let max_prefix: u8 = if network.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix_part {
            Some(p) => {
                let parsed: u8 = p.trim().parse().map_err(|_| invalid())?;
                if parsed > max_prefix {
                    return Err(invalid());
                }
                parsed
            },
            None => max_prefix,
        };

        Ok(Self { network, prefix })
    }

    /// Whether `ip` falls inside this range.
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(network), IpAddr::V4(candidate)) => {
                if self.prefix == 0 {
                    return true;
                }
                let shift = 32 - u32::from(self.prefix);
                let network = u32::from_be_bytes(network.octets());
                let candidate = u32::from_be_bytes(candidate.octets());
                (network >> shift) == (candidate >> shift)
            },
            (IpAddr::V6(network), IpAddr::V6(candidate)) => {
                if self.prefix == 0 {
                    return true;
                }
                let shift = 128 - u32::from(self.prefix);
                let network = u128::from_be_bytes(network.octets());
                let candidate = u128::from_be_bytes(candidate.octets());
                (network >> shift) == (candidate >> shift)
            },
            _ => false,
        }
    }
}

/// Whether `ip` falls inside any of the given ranges. Unparseable ranges
/// match nothing.
#[must_use]
pub fn in_any_range(ranges: &[String], ip: IpAddr) -> bool {
    ranges
        .iter()
        .filter_map(|raw| Cidr::parse(raw).ok())
        .any(|cidr| cidr.contains(ip))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_ipv4_containment() {
        let cidr = Cidr::parse("10.0.0.0/8").unwrap();
        assert!(cidr.contains(ip("10.1.2.3")));
        assert!(cidr.contains(ip("10.255.255.255")));
        assert!(!cidr.contains(ip("11.0.0.1")));
        assert!(!cidr.contains(ip("192.168.0.1")));
    }

    #[test]
    fn test_ipv4_narrow_prefix() {
        let cidr = Cidr::parse("192.168.1.0/24").unwrap();
        assert!(cidr.contains(ip("192.168.1.42")));
        assert!(!cidr.contains(ip("192.168.2.42")));
    }

    #[test]
    fn test_bare_ip_is_host_route() {
        let cidr = Cidr::parse("10.1.2.3").unwrap();
        assert!(cidr.contains(ip("10.1.2.3")));
        assert!(!cidr.contains(ip("10.1.2.4")));
    }

    #[test]
    fn test_prefix_zero_matches_everything() {
        let cidr = Cidr::parse("0.0.0.0/0").unwrap();
        assert!(cidr.contains(ip("255.255.255.255")));
        assert!(cidr.contains(ip("1.2.3.4")));
    }

    #[test]
    fn test_ipv6_containment() {
        let cidr = Cidr::parse("2001:db8::/32").unwrap();
        assert!(cidr.contains(ip("2001:db8::1")));
        assert!(cidr.contains(ip("2001:db8:ffff::1")));
        assert!(!cidr.contains(ip("2001:db9::1")));
    }

    #[test]
    fn test_ipv6_host_route() {
        let cidr = Cidr::parse("::1").unwrap();
        assert!(cidr.contains(ip("::1")));
        assert!(!cidr.contains(ip("::2")));
    }

    #[test]
    fn test_families_never_match() {
        let v4 = Cidr::parse("0.0.0.0/0").unwrap();
        assert!(!v4.contains(ip("::1")));

        let v6 = Cidr::parse("::/0").unwrap();
        assert!(!v6.contains(ip("10.0.0.1")));
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(Cidr::parse("10.0.0.0/33").is_err());
        assert!(Cidr::parse("2001:db8::/129").is_err());
        assert!(Cidr::parse("not-an-ip/8").is_err());
        assert!(Cidr::parse("10.0.0.0/x").is_err());
    }

    #[test]
    fn test_in_any_range() {
        let ranges = vec!["10.0.0.0/8".to_string(), "192.168.0.0/16".to_string()];
        assert!(in_any_range(&ranges, ip("10.1.1.1")));
        assert!(in_any_range(&ranges, ip("192.168.5.5")));
        assert!(!in_any_range(&ranges, ip("172.16.0.1")));
        assert!(!in_any_range(&[], ip("10.0.0.1")));
    }
}
