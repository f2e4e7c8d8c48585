// (c) 2020-2022 ZeroTier, Inc. -- currently propritery pending actual release and licensing. See LICENSE.md.

use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{InvalidFormatError, OutOfBoundsError};
use crate::util::buffer::Buffer;
use crate::util::hex;
use crate::util::marshalable::Marshalable;

/// A 40-bit peer address, the short form identifier derived from a full Identity's public key.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub struct Address(u64);

impl Address {
    /// Reserved addresses (all zero, or the top byte 0xff) are never valid peer addresses.
    #[inline(always)]
    pub fn is_reserved(&self) -> bool {
        self.0 == 0 || (self.0 >> 32) == 0xff
    }

    #[inline(always)]
    pub fn to_u64(&self) -> u64 {
        self.0
    }

    pub fn from_u64(i: u64) -> Option<Address> {
        let a = Address(i & 0xffffffffff);
        if a.is_reserved() {
            None
        } else {
            Some(a)
        }
    }

    pub fn from_bytes(b: &[u8]) -> Option<Address> {
        if b.len() < 5 {
            return None;
        }
        Self::from_u64(((b[0] as u64) << 32) | ((b[1] as u64) << 24) | ((b[2] as u64) << 16) | ((b[3] as u64) << 8) | (b[4] as u64))
    }
}

impl Marshalable for Address {
    const MAX_MARSHAL_SIZE: usize = 5;

    fn marshal<const BL: usize>(&self, buf: &mut Buffer<BL>) -> std::io::Result<()> {
        buf.append_bytes_fixed(&[(self.0 >> 32) as u8, (self.0 >> 24) as u8, (self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8])
    }

    fn unmarshal<const BL: usize>(buf: &Buffer<BL>, cursor: &mut usize) -> std::io::Result<Self> {
        let b: &[u8; 5] = buf.read_bytes_fixed(cursor)?;
        Self::from_bytes(b).ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, OutOfBoundsError))
    }
}

impl Hash for Address {
    #[inline(always)]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0);
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str(&hex::to_string(&[(self.0 >> 32) as u8, (self.0 >> 24) as u8, (self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8]))
    }
}

impl FromStr for Address {
    type Err = InvalidFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let b = hex::from_string(s).ok_or(InvalidFormatError)?;
        Self::from_bytes(&b).ok_or(InvalidFormatError)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(self.to_string().as_str())
        } else {
            serializer.serialize_bytes(&self.0.to_be_bytes()[3..8])
        }
    }
}

struct AddressVisitor;

impl<'de> Visitor<'de> for AddressVisitor {
    type Value = Address;

    fn expecting(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str("a 40-bit address as 10 hex digits or 5 raw bytes")
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Address::from_str(v).map_err(|_| serde::de::Error::custom("invalid address"))
    }

    fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        Address::from_bytes(v).ok_or_else(|| serde::de::Error::custom("invalid address"))
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_str(AddressVisitor)
        } else {
            deserializer.deserialize_bytes(AddressVisitor)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_reserved_addresses() {
        assert!(Address::from_u64(0).is_none());
        assert!(Address::from_u64(0xff_0011_2233).is_none());
    }

    #[test]
    fn string_round_trips() {
        let a = Address::from_u64(0x0102030405).unwrap();
        let s = a.to_string();
        assert_eq!(s, "0102030405");
        assert_eq!(Address::from_str(&s).unwrap(), a);
    }
}
