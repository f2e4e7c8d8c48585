// (c) 2020-2022 ZeroTier, Inc. -- currently propritery pending actual release and licensing. See LICENSE.md.

use serde::{Deserialize, Serialize};

use crate::error::OutOfBoundsError;
use crate::util::buffer::Buffer;
use crate::util::marshalable::Marshalable;
use crate::vl1::Address;

/// A signed (id, value) pair issued by the controller to a specific member. Tags are the
/// vocabulary the rule engine's TAGS_* predicates read from: at most one local tag per id is
/// held in a NetworkConfig, while remote tags of the same id arrive per-peer via Membership.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: u32,
    pub value: u32,
    pub network_id: u64,
    pub issued_to: Address,
    pub timestamp: i64,
}

impl Tag {
    pub fn new(id: u32, value: u32, network_id: u64, issued_to: Address, timestamp: i64) -> Tag {
        Tag { id, value, network_id, issued_to, timestamp }
    }
}

impl Marshalable for Tag {
    const MAX_MARSHAL_SIZE: usize = 4 + 4 + 8 + Address::MAX_MARSHAL_SIZE + 8;

    fn marshal<const BL: usize>(&self, buf: &mut Buffer<BL>) -> std::io::Result<()> {
        buf.append_u32(self.id)?;
        buf.append_u32(self.value)?;
        buf.append_u64(self.network_id)?;
        self.issued_to.marshal(buf)?;
        buf.append_u64(self.timestamp as u64)
    }

    fn unmarshal<const BL: usize>(buf: &Buffer<BL>, cursor: &mut usize) -> std::io::Result<Self> {
        let id = buf.read_u32(cursor)?;
        let value = buf.read_u32(cursor)?;
        let network_id = buf.read_u64(cursor)?;
        let issued_to = Address::unmarshal(buf, cursor)?;
        let timestamp = buf.read_u64(cursor)? as i64;
        Ok(Tag { id, value, network_id, issued_to, timestamp })
    }
}

impl TryFrom<&[u8]> for Tag {
    type Error = OutOfBoundsError;

    fn try_from(b: &[u8]) -> Result<Self, Self::Error> {
        let buf: Buffer<64> = Buffer::from_bytes(b).map_err(|_| OutOfBoundsError)?;
        let mut cursor = 0;
        Tag::unmarshal(&buf, &mut cursor).map_err(|_| OutOfBoundsError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let t = Tag::new(1, 0xdeadbeef, 0x8056c2e21c000001, Address::from_u64(0x0102030405).unwrap(), 12345);
        let mut buf: Buffer<128> = Buffer::new();
        t.marshal(&mut buf).unwrap();
        let mut cursor = 0;
        assert_eq!(Tag::unmarshal(&buf, &mut cursor).unwrap(), t);
    }
}
