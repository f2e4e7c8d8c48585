// (c) 2020-2022 ZeroTier, Inc. -- currently propritery pending actual release and licensing. See LICENSE.md.

use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{InvalidFormatError, OutOfBoundsError};
use crate::util::buffer::Buffer;
use crate::util::hex;
use crate::util::marshalable::Marshalable;

/// A 64-bit opaque network identifier. The high 40 bits conventionally name the controller's
/// address; this layer treats the whole value as opaque.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct NetworkId(u64);

impl NetworkId {
    #[inline(always)]
    pub fn from_u64(i: u64) -> NetworkId {
        NetworkId(i)
    }

    #[inline(always)]
    pub fn to_u64(&self) -> u64 {
        self.0
    }

    /// The controller address conventionally encoded in the top 40 bits of the network ID.
    pub fn controller_address(&self) -> crate::vl1::Address {
        crate::vl1::Address::from_u64(self.0 >> 24).expect("network id top 40 bits are never reserved by construction")
    }
}

impl Marshalable for NetworkId {
    const MAX_MARSHAL_SIZE: usize = 8;

    fn marshal<const BL: usize>(&self, buf: &mut Buffer<BL>) -> std::io::Result<()> {
        buf.append_u64(self.0)
    }

    fn unmarshal<const BL: usize>(buf: &Buffer<BL>, cursor: &mut usize) -> std::io::Result<Self> {
        Ok(NetworkId(buf.read_u64(cursor)?))
    }
}

impl Debug for NetworkId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for NetworkId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str(&hex::to_string(&self.0.to_be_bytes()))
    }
}

impl FromStr for NetworkId {
    type Err = InvalidFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let b = hex::from_string(s).ok_or(InvalidFormatError)?;
        if b.len() != 8 {
            return Err(InvalidFormatError);
        }
        let mut a = [0_u8; 8];
        a.copy_from_slice(&b);
        Ok(NetworkId(u64::from_be_bytes(a)))
    }
}

impl TryFrom<&[u8]> for NetworkId {
    type Error = OutOfBoundsError;

    fn try_from(b: &[u8]) -> Result<Self, Self::Error> {
        if b.len() < 8 {
            return Err(OutOfBoundsError);
        }
        let mut a = [0_u8; 8];
        a.copy_from_slice(&b[0..8]);
        Ok(NetworkId(u64::from_be_bytes(a)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trips() {
        let n = NetworkId::from_u64(0x8056c2e21c000001);
        assert_eq!(NetworkId::from_str(&n.to_string()).unwrap(), n);
    }
}
