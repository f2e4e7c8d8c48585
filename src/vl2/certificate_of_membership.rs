// (c) 2020-2022 ZeroTier, Inc. -- currently propritery pending actual release and licensing. See LICENSE.md.

use serde::{Deserialize, Serialize};

use crate::error::OutOfBoundsError;
use crate::util::buffer::Buffer;
use crate::util::marshalable::Marshalable;
use crate::vl1::Address;

/// Short-lived signed credential proving a peer's right to participate in a network. Presented
/// to upstream roots and to fellow members so they can admit multicast and bridged traffic
/// without asking the controller directly. This layer treats the signature as opaque bytes --
/// signing and verification belong to the identity layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateOfMembership {
    pub network_id: u64,
    pub issued_to: Address,
    pub timestamp: i64,
    /// Maximum delta in timestamps for peers to consider each other still in good standing.
    pub max_delta: i64,
    pub signature: Vec<u8>,
}

impl CertificateOfMembership {
    pub fn new(network_id: u64, issued_to: Address, timestamp: i64, max_delta: i64) -> CertificateOfMembership {
        CertificateOfMembership { network_id, issued_to, timestamp, max_delta, signature: Vec::new() }
    }

    /// Two members are in agreement if their certificates name the same network and their
    /// timestamps are within each other's max_delta.
    pub fn agrees_with(&self, other: &CertificateOfMembership) -> bool {
        if self.network_id != other.network_id {
            return false;
        }
        let delta = (self.timestamp - other.timestamp).unsigned_abs();
        delta <= self.max_delta as u64 && delta <= other.max_delta as u64
    }
}

impl Marshalable for CertificateOfMembership {
    const MAX_MARSHAL_SIZE: usize = 8 + Address::MAX_MARSHAL_SIZE + 8 + 8 + 2 + 256;

    fn marshal<const BL: usize>(&self, buf: &mut Buffer<BL>) -> std::io::Result<()> {
        buf.append_u64(self.network_id)?;
        self.issued_to.marshal(buf)?;
        buf.append_u64(self.timestamp as u64)?;
        buf.append_u64(self.max_delta as u64)?;
        buf.append_u16(self.signature.len() as u16)?;
        buf.append_bytes(&self.signature)
    }

    fn unmarshal<const BL: usize>(buf: &Buffer<BL>, cursor: &mut usize) -> std::io::Result<Self> {
        let network_id = buf.read_u64(cursor)?;
        let issued_to = Address::unmarshal(buf, cursor)?;
        let timestamp = buf.read_u64(cursor)? as i64;
        let max_delta = buf.read_u64(cursor)? as i64;
        let sig_len = buf.read_u16(cursor)? as usize;
        let signature = buf.read_bytes(sig_len, cursor)?.to_vec();
        Ok(CertificateOfMembership { network_id, issued_to, timestamp, max_delta, signature })
    }
}

impl TryFrom<&[u8]> for CertificateOfMembership {
    type Error = OutOfBoundsError;

    fn try_from(b: &[u8]) -> Result<Self, Self::Error> {
        let buf: Buffer<512> = Buffer::from_bytes(b).map_err(|_| OutOfBoundsError)?;
        let mut cursor = 0;
        CertificateOfMembership::unmarshal(&buf, &mut cursor).map_err(|_| OutOfBoundsError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agreement_checks_network_and_delta() {
        let a = CertificateOfMembership::new(1, Address::from_u64(1).unwrap(), 1000, 100);
        let b = CertificateOfMembership::new(1, Address::from_u64(2).unwrap(), 1050, 100);
        let c = CertificateOfMembership::new(1, Address::from_u64(2).unwrap(), 2000, 100);
        let d = CertificateOfMembership::new(2, Address::from_u64(2).unwrap(), 1050, 100);
        assert!(a.agrees_with(&b));
        assert!(!a.agrees_with(&c));
        assert!(!a.agrees_with(&d));
    }

    #[test]
    fn round_trips_with_signature() {
        let mut c = CertificateOfMembership::new(1, Address::from_u64(1).unwrap(), 1000, 100);
        c.signature = vec![1, 2, 3, 4, 5];
        let mut buf: Buffer<512> = Buffer::new();
        c.marshal(&mut buf).unwrap();
        let mut cursor = 0;
        assert_eq!(CertificateOfMembership::unmarshal(&buf, &mut cursor).unwrap(), c);
    }
}
