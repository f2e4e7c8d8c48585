// (c) 2020-2022 ZeroTier, Inc. -- currently propritery pending actual release and licensing. See LICENSE.md.

use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{InvalidFormatError, OutOfBoundsError};
use crate::util::buffer::Buffer;
use crate::util::marshalable::Marshalable;

/// A 48-bit Ethernet hardware address.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Default)]
pub struct MAC(u64);

impl MAC {
    pub const BROADCAST: MAC = MAC(0xffffffffffff);

    #[inline(always)]
    pub fn is_multicast(&self) -> bool {
        (self.0 & 0x010000000000) != 0
    }

    #[inline(always)]
    pub fn is_broadcast(&self) -> bool {
        self.0 == Self::BROADCAST.0
    }

    #[inline(always)]
    pub fn to_u64(&self) -> u64 {
        self.0
    }

    pub fn from_u64(i: u64) -> Option<MAC> {
        let m = i & 0xffffffffffff;
        if m == 0 {
            None
        } else {
            Some(MAC(m))
        }
    }

    pub fn from_bytes(b: &[u8]) -> Option<MAC> {
        if b.len() < 6 {
            return None;
        }
        Self::from_u64(
            ((b[0] as u64) << 40) | ((b[1] as u64) << 32) | ((b[2] as u64) << 24) | ((b[3] as u64) << 16) | ((b[4] as u64) << 8) | (b[5] as u64),
        )
    }

    pub fn to_bytes(&self) -> [u8; 6] {
        [(self.0 >> 40) as u8, (self.0 >> 32) as u8, (self.0 >> 24) as u8, (self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8]
    }
}

impl Marshalable for MAC {
    const MAX_MARSHAL_SIZE: usize = 6;

    fn marshal<const BL: usize>(&self, buf: &mut Buffer<BL>) -> std::io::Result<()> {
        buf.append_bytes_fixed(&self.to_bytes())
    }

    fn unmarshal<const BL: usize>(buf: &Buffer<BL>, cursor: &mut usize) -> std::io::Result<Self> {
        let b: &[u8; 6] = buf.read_bytes_fixed(cursor)?;
        Self::from_bytes(b).ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, OutOfBoundsError))
    }
}

impl Hash for MAC {
    #[inline(always)]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0);
    }
}

impl Debug for MAC {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for MAC {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let b = self.to_bytes();
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", b[0], b[1], b[2], b[3], b[4], b[5])
    }
}

impl FromStr for MAC {
    type Err = InvalidFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut b = [0_u8; 6];
        let mut i = 0;
        for octet in s.split(':') {
            if i >= 6 {
                return Err(InvalidFormatError);
            }
            b[i] = u8::from_str_radix(octet, 16).map_err(|_| InvalidFormatError)?;
            i += 1;
        }
        if i != 6 {
            return Err(InvalidFormatError);
        }
        Self::from_bytes(&b).ok_or(InvalidFormatError)
    }
}

impl Serialize for MAC {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(self.to_string().as_str())
        } else {
            serializer.serialize_bytes(&self.to_bytes())
        }
    }
}

struct MACVisitor;

impl<'de> Visitor<'de> for MACVisitor {
    type Value = MAC;

    fn expecting(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str("a 48-bit MAC address as colon-separated hex or 6 raw bytes")
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
        MAC::from_str(v).map_err(|_| serde::de::Error::custom("invalid MAC address"))
    }

    fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        MAC::from_bytes(v).ok_or_else(|| serde::de::Error::custom("invalid MAC address"))
    }
}

impl<'de> Deserialize<'de> for MAC {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_str(MACVisitor)
        } else {
            deserializer.deserialize_bytes(MACVisitor)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_multicast_and_broadcast() {
        assert!(MAC::BROADCAST.is_broadcast());
        assert!(MAC::BROADCAST.is_multicast());
        let unicast = MAC::from_str("02:11:22:33:44:55").unwrap();
        assert!(!unicast.is_multicast());
    }

    #[test]
    fn string_round_trips() {
        let m = MAC::from_str("aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(m.to_string(), "aa:bb:cc:dd:ee:ff");
    }
}
