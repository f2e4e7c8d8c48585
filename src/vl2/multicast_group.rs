// (c) 2020-2022 ZeroTier, Inc. -- currently propritery pending actual release and licensing. See LICENSE.md.

use std::fmt::{Debug, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::OutOfBoundsError;
use crate::util::buffer::Buffer;
use crate::util::marshalable::Marshalable;
use crate::vl1::MAC;

/// A multicast group: an Ethernet multicast MAC plus a 32-bit additional distinguishing
/// info field (ADI), which lets IPv4 multicast (ARP-resolved) key groups on the target IP
/// rather than colliding on the single IPv4 multicast MAC prefix.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct MulticastGroup {
    pub mac: MAC,
    pub adi: u32,
}

impl MulticastGroup {
    /// The reserved broadcast group: the all-ones MAC with no ADI.
    pub fn broadcast() -> MulticastGroup {
        MulticastGroup { mac: MAC::BROADCAST, adi: 0 }
    }

    #[inline(always)]
    pub fn is_broadcast(&self) -> bool {
        self.adi == 0 && self.mac.is_broadcast()
    }
}

impl Marshalable for MulticastGroup {
    const MAX_MARSHAL_SIZE: usize = 10;

    fn marshal<const BL: usize>(&self, buf: &mut Buffer<BL>) -> std::io::Result<()> {
        self.mac.marshal(buf)?;
        buf.append_u32(self.adi)
    }

    fn unmarshal<const BL: usize>(buf: &Buffer<BL>, cursor: &mut usize) -> std::io::Result<Self> {
        let mac = MAC::unmarshal(buf, cursor)?;
        let adi = buf.read_u32(cursor)?;
        Ok(MulticastGroup { mac, adi })
    }
}

impl TryFrom<&[u8]> for MulticastGroup {
    type Error = OutOfBoundsError;

    fn try_from(b: &[u8]) -> Result<Self, Self::Error> {
        if b.len() < 10 {
            return Err(OutOfBoundsError);
        }
        let mac = MAC::from_bytes(&b[0..6]).ok_or(OutOfBoundsError)?;
        let adi = u32::from_be_bytes([b[6], b[7], b[8], b[9]]);
        Ok(MulticastGroup { mac, adi })
    }
}

impl Debug for MulticastGroup {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for MulticastGroup {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}/{:08x}", self.mac, self.adi)
    }
}

/// Insert `g` into a sorted, deduplicated group list. Returns true if the list was changed.
pub fn insert_sorted_unique(groups: &mut Vec<MulticastGroup>, g: MulticastGroup) -> bool {
    match groups.binary_search(&g) {
        Ok(_) => false,
        Err(pos) => {
            groups.insert(pos, g);
            true
        }
    }
}

/// Remove `g` from a sorted, deduplicated group list. Returns true if the list was changed.
pub fn remove_sorted_unique(groups: &mut Vec<MulticastGroup>, g: &MulticastGroup) -> bool {
    match groups.binary_search(g) {
        Ok(pos) => {
            groups.remove(pos);
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_sorted_unique() {
        let mut v = Vec::new();
        let a = MulticastGroup { mac: MAC::from_u64(1).unwrap(), adi: 0 };
        let b = MulticastGroup { mac: MAC::from_u64(2).unwrap(), adi: 0 };
        assert!(insert_sorted_unique(&mut v, b));
        assert!(insert_sorted_unique(&mut v, a));
        assert!(!insert_sorted_unique(&mut v, a));
        assert_eq!(v, vec![a, b]);
    }

    #[test]
    fn broadcast_group_identity() {
        assert!(MulticastGroup::broadcast().is_broadcast());
    }
}
