// (c) 2020-2022 ZeroTier, Inc. -- currently propritery pending actual release and licensing. See LICENSE.md.

use serde::{Deserialize, Serialize};

use crate::error::OutOfBoundsError;
use crate::util::buffer::Buffer;
use crate::util::marshalable::Marshalable;
use crate::vl1::Address;
use crate::vl2::rule::Rule;

/// A secondary, credential-gated rule program. A capability is tried only when the network's
/// base rule program produces no verdict; it lets a controller authorize specific flows for
/// specific member pairs without rewriting the base policy for everyone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub id: u32,
    pub network_id: u64,
    pub rules: Vec<Rule>,
    pub issued_to: Address,
    pub timestamp: i64,
    pub signature: Vec<u8>,
}

impl Capability {
    pub fn new(id: u32, network_id: u64, rules: Vec<Rule>, issued_to: Address, timestamp: i64) -> Capability {
        Capability { id, network_id, rules, issued_to, timestamp, signature: Vec::new() }
    }
}

impl Marshalable for Capability {
    const MAX_MARSHAL_SIZE: usize = 4096;

    fn marshal<const BL: usize>(&self, buf: &mut Buffer<BL>) -> std::io::Result<()> {
        buf.append_u32(self.id)?;
        buf.append_u64(self.network_id)?;
        buf.append_u16(self.rules.len() as u16)?;
        for r in self.rules.iter() {
            r.marshal(buf)?;
        }
        self.issued_to.marshal(buf)?;
        buf.append_u64(self.timestamp as u64)?;
        buf.append_u16(self.signature.len() as u16)?;
        buf.append_bytes(&self.signature)
    }

    fn unmarshal<const BL: usize>(buf: &Buffer<BL>, cursor: &mut usize) -> std::io::Result<Self> {
        let id = buf.read_u32(cursor)?;
        let network_id = buf.read_u64(cursor)?;
        let rule_count = buf.read_u16(cursor)? as usize;
        let mut rules = Vec::with_capacity(rule_count);
        for _ in 0..rule_count {
            rules.push(Rule::unmarshal(buf, cursor)?);
        }
        let issued_to = Address::unmarshal(buf, cursor)?;
        let timestamp = buf.read_u64(cursor)? as i64;
        let sig_len = buf.read_u16(cursor)? as usize;
        let signature = buf.read_bytes(sig_len, cursor)?.to_vec();
        Ok(Capability { id, network_id, rules, issued_to, timestamp, signature })
    }
}

impl TryFrom<&[u8]> for Capability {
    type Error = OutOfBoundsError;

    fn try_from(b: &[u8]) -> Result<Self, Self::Error> {
        let buf: Buffer<4096> = Buffer::from_bytes(b).map_err(|_| OutOfBoundsError)?;
        let mut cursor = 0;
        Capability::unmarshal(&buf, &mut cursor).map_err(|_| OutOfBoundsError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_rules() {
        let c = Capability::new(
            1,
            0x8056c2e21c000001,
            vec![Rule::MatchEthertype { ethertype: 0x0800, negate: false }, Rule::ActionAccept],
            Address::from_u64(1).unwrap(),
            1000,
        );
        let mut buf: Buffer<4096> = Buffer::new();
        c.marshal(&mut buf).unwrap();
        let mut cursor = 0;
        assert_eq!(Capability::unmarshal(&buf, &mut cursor).unwrap(), c);
    }
}
