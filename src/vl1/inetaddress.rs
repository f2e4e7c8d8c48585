// (c) 2020-2022 ZeroTier, Inc. -- currently propritery pending actual release and licensing. See LICENSE.md.

use std::fmt::{Debug, Display, Formatter};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::InvalidFormatError;

/// Scope of an IP address, used by higher layers to decide path preference. Not consulted
/// by the rule engine itself but retained as part of the address type for parity with the
/// host stack's own classification.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum IpScope {
    None,
    Loopback,
    Global,
    LinkLocal,
    PrivateLocal,
    Multicast,
    PseudoPrivate,
    Shared,
}

/// An IPv4 or IPv6 address, optionally carrying a port and a prefix/mask length used when
/// the address represents a CIDR block (as in a route or a rule operand) rather than a host.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub enum InetAddress {
    Ipv4 { ip: [u8; 4], port: u16 },
    Ipv6 { ip: [u8; 16], port: u16 },
}

impl InetAddress {
    pub fn from_ip_port(ip: IpAddr, port: u16) -> InetAddress {
        match ip {
            IpAddr::V4(v4) => InetAddress::Ipv4 { ip: v4.octets(), port },
            IpAddr::V6(v6) => InetAddress::Ipv6 { ip: v6.octets(), port },
        }
    }

    #[inline(always)]
    pub fn is_ipv4(&self) -> bool {
        matches!(self, InetAddress::Ipv4 { .. })
    }

    #[inline(always)]
    pub fn is_ipv6(&self) -> bool {
        matches!(self, InetAddress::Ipv6 { .. })
    }

    #[inline(always)]
    pub fn port(&self) -> u16 {
        match self {
            InetAddress::Ipv4 { port, .. } => *port,
            InetAddress::Ipv6 { port, .. } => *port,
        }
    }

    pub fn ip_bytes(&self) -> &[u8] {
        match self {
            InetAddress::Ipv4 { ip, .. } => ip.as_slice(),
            InetAddress::Ipv6 { ip, .. } => ip.as_slice(),
        }
    }

    /// Interpret this address as a CIDR block (ip = network address, port field reused as
    /// the prefix length in bits) and test whether `other` falls inside it. Family mismatch
    /// is never a match -- callers filter by ethertype first.
    pub fn contains_cidr(&self, other: &InetAddress, prefix_bits: u8) -> bool {
        match (self, other) {
            (InetAddress::Ipv4 { ip: net, .. }, InetAddress::Ipv4 { ip: host, .. }) => {
                Self::prefix_matches(net, host, prefix_bits.min(32))
            }
            (InetAddress::Ipv6 { ip: net, .. }, InetAddress::Ipv6 { ip: host, .. }) => {
                Self::prefix_matches(net, host, prefix_bits.min(128))
            }
            _ => false,
        }
    }

    fn prefix_matches(net: &[u8], host: &[u8], prefix_bits: u8) -> bool {
        let full_bytes = (prefix_bits / 8) as usize;
        let rem_bits = prefix_bits % 8;
        if net[..full_bytes] != host[..full_bytes] {
            return false;
        }
        if rem_bits == 0 {
            return true;
        }
        let mask = 0xffu8 << (8 - rem_bits);
        (net[full_bytes] & mask) == (host[full_bytes] & mask)
    }
}

impl Debug for InetAddress {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for InetAddress {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            InetAddress::Ipv4 { ip, port } => {
                if *port != 0 {
                    write!(f, "{}:{}", Ipv4Addr::from(*ip), port)
                } else {
                    write!(f, "{}", Ipv4Addr::from(*ip))
                }
            }
            InetAddress::Ipv6 { ip, port } => {
                if *port != 0 {
                    write!(f, "[{}]:{}", Ipv6Addr::from(*ip), port)
                } else {
                    write!(f, "{}", Ipv6Addr::from(*ip))
                }
            }
        }
    }
}

impl FromStr for InetAddress {
    type Err = InvalidFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(v4) = Ipv4Addr::from_str(s) {
            return Ok(InetAddress::Ipv4 { ip: v4.octets(), port: 0 });
        }
        if let Ok(v6) = Ipv6Addr::from_str(s) {
            return Ok(InetAddress::Ipv6 { ip: v6.octets(), port: 0 });
        }
        Err(InvalidFormatError)
    }
}

impl Serialize for InetAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(self.to_string().as_str())
        } else {
            let mut v = Vec::with_capacity(18);
            v.extend_from_slice(self.ip_bytes());
            v.extend_from_slice(&self.port().to_be_bytes());
            serializer.serialize_bytes(&v)
        }
    }
}

struct InetAddressVisitor;

impl<'de> Visitor<'de> for InetAddressVisitor {
    type Value = InetAddress;

    fn expecting(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str("an IPv4 or IPv6 address")
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
        InetAddress::from_str(v).map_err(|_| serde::de::Error::custom("invalid IP address"))
    }

    fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        match v.len() {
            6 => Ok(InetAddress::Ipv4 { ip: [v[0], v[1], v[2], v[3]], port: u16::from_be_bytes([v[4], v[5]]) }),
            18 => {
                let mut ip = [0_u8; 16];
                ip.copy_from_slice(&v[0..16]);
                Ok(InetAddress::Ipv6 { ip, port: u16::from_be_bytes([v[16], v[17]]) })
            }
            _ => Err(serde::de::Error::custom("invalid IP address length")),
        }
    }
}

impl<'de> Deserialize<'de> for InetAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_str(InetAddressVisitor)
        } else {
            deserializer.deserialize_bytes(InetAddressVisitor)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cidr_containment() {
        let net = InetAddress::from_str("10.0.0.0").unwrap();
        let inside = InetAddress::from_str("10.1.2.3").unwrap();
        let outside = InetAddress::from_str("192.168.1.1").unwrap();
        assert!(net.contains_cidr(&inside, 8));
        assert!(!net.contains_cidr(&outside, 8));
    }

    #[test]
    fn ipv6_cidr_containment() {
        let net = InetAddress::from_str("fd00::").unwrap();
        let inside = InetAddress::from_str("fd00::1").unwrap();
        let outside = InetAddress::from_str("fe80::1").unwrap();
        assert!(net.contains_cidr(&inside, 8));
        assert!(!net.contains_cidr(&outside, 8));
    }
}
