// (c) 2020-2022 ZeroTier, Inc. -- currently propritery pending actual release and licensing. See LICENSE.md.

//! The rule type. On the wire the negate flag lives in the high bit of the type byte, exactly
//! as in prior protocol versions, but internally a rule is a single tagged enum rather than a
//! (type, negate, operand-union) triple -- callers never have to remember which operand field
//! goes with which type.

use serde::{Deserialize, Serialize};

use crate::error::OutOfBoundsError;
use crate::util::buffer::Buffer;
use crate::util::marshalable::Marshalable;
use crate::vl1::{Address, InetAddress, MAC};

const NEGATE_BIT: u8 = 0x80;

mod type_code {
    pub const ACTION_DROP: u8 = 0;
    pub const ACTION_ACCEPT: u8 = 1;
    pub const ACTION_TEE: u8 = 2;
    pub const ACTION_REDIRECT: u8 = 3;
    pub const ACTION_DEBUG_LOG: u8 = 4;

    pub const MATCH_SOURCE_ZT: u8 = 32;
    pub const MATCH_DEST_ZT: u8 = 33;
    pub const MATCH_VLAN_ID: u8 = 34;
    pub const MATCH_VLAN_PCP: u8 = 35;
    pub const MATCH_VLAN_DEI: u8 = 36;
    pub const MATCH_ETHERTYPE: u8 = 37;
    pub const MATCH_MAC_SOURCE: u8 = 38;
    pub const MATCH_MAC_DEST: u8 = 39;
    pub const MATCH_IPV4_SOURCE: u8 = 40;
    pub const MATCH_IPV4_DEST: u8 = 41;
    pub const MATCH_IPV6_SOURCE: u8 = 42;
    pub const MATCH_IPV6_DEST: u8 = 43;
    pub const MATCH_IP_TOS: u8 = 44;
    pub const MATCH_IP_PROTOCOL: u8 = 45;
    pub const MATCH_ICMP: u8 = 46;
    pub const MATCH_IP_SOURCE_PORT_RANGE: u8 = 47;
    pub const MATCH_IP_DEST_PORT_RANGE: u8 = 48;
    pub const MATCH_CHARACTERISTICS: u8 = 49;
    pub const MATCH_FRAME_SIZE_RANGE: u8 = 50;
    pub const MATCH_TAGS_DIFFERENCE: u8 = 51;
    pub const MATCH_TAGS_BITWISE_AND: u8 = 52;
    pub const MATCH_TAGS_BITWISE_OR: u8 = 53;
    pub const MATCH_TAGS_BITWISE_XOR: u8 = 54;
}

/// Operand for a tag-valued predicate (DIFFERENCE / BITWISE_AND / OR / XOR).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagOperand {
    pub id: u32,
    pub value: u32,
}

/// Operand for an ICMP match: a required type and an optionally-checked code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcmpOperand {
    pub icmp_type: u8,
    pub icmp_code: Option<u8>,
}

/// Operand for a forwarding action (TEE / REDIRECT): target and optional truncation length.
/// A length of zero means "forward the whole frame."
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardTarget {
    pub address: Address,
    pub length: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub first: u16,
    pub last: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Characteristics {
    pub mask: u64,
    pub expected: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cidr {
    pub ip: InetAddress,
    pub prefix_bits: u8,
}

/// A single rule. `Action*` variants terminate (or at least conclude) a match-set; all others
/// are predicates evaluated against the packet context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Rule {
    ActionDrop,
    ActionAccept,
    ActionTee(ForwardTarget),
    ActionRedirect(ForwardTarget),
    ActionDebugLog,
    /// An action type byte this implementation does not recognize. Preserved verbatim so older
    /// or newer rule programs still round-trip even if we can't interpret every action.
    ActionUnknown(u8),

    MatchSourceZt { address: Address, negate: bool },
    MatchDestZt { address: Address, negate: bool },
    MatchVlanId { id: u16, negate: bool },
    MatchVlanPcp { pcp: u8, negate: bool },
    MatchVlanDei { dei: u8, negate: bool },
    MatchEthertype { ethertype: u16, negate: bool },
    MatchMacSource { mac: MAC, negate: bool },
    MatchMacDest { mac: MAC, negate: bool },
    MatchIpv4Source { cidr: Cidr, negate: bool },
    MatchIpv4Dest { cidr: Cidr, negate: bool },
    MatchIpv6Source { cidr: Cidr, negate: bool },
    MatchIpv6Dest { cidr: Cidr, negate: bool },
    MatchIpTos { dscp: u8, negate: bool },
    MatchIpProtocol { protocol: u8, negate: bool },
    MatchIcmp { operand: IcmpOperand, negate: bool },
    MatchIpSourcePortRange { range: PortRange, negate: bool },
    MatchIpDestPortRange { range: PortRange, negate: bool },
    MatchCharacteristics { characteristics: Characteristics, negate: bool },
    MatchFrameSizeRange { range: PortRange, negate: bool },
    MatchTagsDifference { operand: TagOperand, negate: bool },
    MatchTagsBitwiseAnd { operand: TagOperand, negate: bool },
    MatchTagsBitwiseOr { operand: TagOperand, negate: bool },
    MatchTagsBitwiseXor { operand: TagOperand, negate: bool },
    /// A match type byte this implementation does not recognize; falls back to the network's
    /// `rules_result_of_unsupported_match` flag.
    MatchUnknown(u8, bool),
}

impl Rule {
    #[inline(always)]
    pub fn is_action(&self) -> bool {
        matches!(self, Rule::ActionDrop | Rule::ActionAccept | Rule::ActionTee(_) | Rule::ActionRedirect(_) | Rule::ActionDebugLog | Rule::ActionUnknown(_))
    }
}

impl Marshalable for Rule {
    const MAX_MARSHAL_SIZE: usize = 24;

    fn marshal<const BL: usize>(&self, buf: &mut Buffer<BL>) -> std::io::Result<()> {
        use type_code::*;
        macro_rules! put {
            ($code:expr, $negate:expr) => {
                buf.append_u8(if $negate { $code | NEGATE_BIT } else { $code })
            };
        }
        match self {
            Rule::ActionDrop => buf.append_u8(ACTION_DROP),
            Rule::ActionAccept => buf.append_u8(ACTION_ACCEPT),
            Rule::ActionTee(t) => {
                buf.append_u8(ACTION_TEE)?;
                t.address.marshal(buf)?;
                buf.append_u16(t.length)
            }
            Rule::ActionRedirect(t) => {
                buf.append_u8(ACTION_REDIRECT)?;
                t.address.marshal(buf)?;
                buf.append_u16(t.length)
            }
            Rule::ActionDebugLog => buf.append_u8(ACTION_DEBUG_LOG),
            Rule::ActionUnknown(code) => buf.append_u8(*code),

            Rule::MatchSourceZt { address, negate } => {
                put!(MATCH_SOURCE_ZT, *negate)?;
                address.marshal(buf)
            }
            Rule::MatchDestZt { address, negate } => {
                put!(MATCH_DEST_ZT, *negate)?;
                address.marshal(buf)
            }
            Rule::MatchVlanId { id, negate } => {
                put!(MATCH_VLAN_ID, *negate)?;
                buf.append_u16(*id)
            }
            Rule::MatchVlanPcp { pcp, negate } => {
                put!(MATCH_VLAN_PCP, *negate)?;
                buf.append_u8(*pcp)
            }
            Rule::MatchVlanDei { dei, negate } => {
                put!(MATCH_VLAN_DEI, *negate)?;
                buf.append_u8(*dei)
            }
            Rule::MatchEthertype { ethertype, negate } => {
                put!(MATCH_ETHERTYPE, *negate)?;
                buf.append_u16(*ethertype)
            }
            Rule::MatchMacSource { mac, negate } => {
                put!(MATCH_MAC_SOURCE, *negate)?;
                mac.marshal(buf)
            }
            Rule::MatchMacDest { mac, negate } => {
                put!(MATCH_MAC_DEST, *negate)?;
                mac.marshal(buf)
            }
            Rule::MatchIpv4Source { cidr, negate } => {
                put!(MATCH_IPV4_SOURCE, *negate)?;
                let ip: [u8; 4] = cidr.ip.ip_bytes().try_into().unwrap_or([0u8; 4]);
                buf.append_bytes_fixed(&ip)?;
                buf.append_u8(cidr.prefix_bits)
            }
            Rule::MatchIpv4Dest { cidr, negate } => {
                put!(MATCH_IPV4_DEST, *negate)?;
                let ip: [u8; 4] = cidr.ip.ip_bytes().try_into().unwrap_or([0u8; 4]);
                buf.append_bytes_fixed(&ip)?;
                buf.append_u8(cidr.prefix_bits)
            }
            Rule::MatchIpv6Source { cidr, negate } => {
                put!(MATCH_IPV6_SOURCE, *negate)?;
                let ip: [u8; 16] = cidr.ip.ip_bytes().try_into().unwrap_or([0u8; 16]);
                buf.append_bytes_fixed(&ip)?;
                buf.append_u8(cidr.prefix_bits)
            }
            Rule::MatchIpv6Dest { cidr, negate } => {
                put!(MATCH_IPV6_DEST, *negate)?;
                let ip: [u8; 16] = cidr.ip.ip_bytes().try_into().unwrap_or([0u8; 16]);
                buf.append_bytes_fixed(&ip)?;
                buf.append_u8(cidr.prefix_bits)
            }
            Rule::MatchIpTos { dscp, negate } => {
                put!(MATCH_IP_TOS, *negate)?;
                buf.append_u8(*dscp)
            }
            Rule::MatchIpProtocol { protocol, negate } => {
                put!(MATCH_IP_PROTOCOL, *negate)?;
                buf.append_u8(*protocol)
            }
            Rule::MatchIcmp { operand, negate } => {
                put!(MATCH_ICMP, *negate)?;
                buf.append_u8(operand.icmp_type)?;
                buf.append_u8(1)?;
                buf.append_u8(operand.icmp_code.unwrap_or(0))
            }
            Rule::MatchIpSourcePortRange { range, negate } => {
                put!(MATCH_IP_SOURCE_PORT_RANGE, *negate)?;
                buf.append_u16(range.first)?;
                buf.append_u16(range.last)
            }
            Rule::MatchIpDestPortRange { range, negate } => {
                put!(MATCH_IP_DEST_PORT_RANGE, *negate)?;
                buf.append_u16(range.first)?;
                buf.append_u16(range.last)
            }
            Rule::MatchCharacteristics { characteristics, negate } => {
                put!(MATCH_CHARACTERISTICS, *negate)?;
                buf.append_u64(characteristics.mask)?;
                buf.append_u64(characteristics.expected)
            }
            Rule::MatchFrameSizeRange { range, negate } => {
                put!(MATCH_FRAME_SIZE_RANGE, *negate)?;
                buf.append_u16(range.first)?;
                buf.append_u16(range.last)
            }
            Rule::MatchTagsDifference { operand, negate } => {
                put!(MATCH_TAGS_DIFFERENCE, *negate)?;
                buf.append_u32(operand.id)?;
                buf.append_u32(operand.value)
            }
            Rule::MatchTagsBitwiseAnd { operand, negate } => {
                put!(MATCH_TAGS_BITWISE_AND, *negate)?;
                buf.append_u32(operand.id)?;
                buf.append_u32(operand.value)
            }
            Rule::MatchTagsBitwiseOr { operand, negate } => {
                put!(MATCH_TAGS_BITWISE_OR, *negate)?;
                buf.append_u32(operand.id)?;
                buf.append_u32(operand.value)
            }
            Rule::MatchTagsBitwiseXor { operand, negate } => {
                put!(MATCH_TAGS_BITWISE_XOR, *negate)?;
                buf.append_u32(operand.id)?;
                buf.append_u32(operand.value)
            }
            Rule::MatchUnknown(code, negate) => put!(*code & !NEGATE_BIT, *negate),
        }
    }

    fn unmarshal<const BL: usize>(buf: &Buffer<BL>, cursor: &mut usize) -> std::io::Result<Self> {
        use type_code::*;
        let raw = buf.read_u8(cursor)?;
        let negate = (raw & NEGATE_BIT) != 0;
        let code = raw & !NEGATE_BIT;
        Ok(match code {
            ACTION_DROP => Rule::ActionDrop,
            ACTION_ACCEPT => Rule::ActionAccept,
            ACTION_TEE => Rule::ActionTee(ForwardTarget { address: Address::unmarshal(buf, cursor)?, length: buf.read_u16(cursor)? }),
            ACTION_REDIRECT => Rule::ActionRedirect(ForwardTarget { address: Address::unmarshal(buf, cursor)?, length: buf.read_u16(cursor)? }),
            ACTION_DEBUG_LOG => Rule::ActionDebugLog,

            MATCH_SOURCE_ZT => Rule::MatchSourceZt { address: Address::unmarshal(buf, cursor)?, negate },
            MATCH_DEST_ZT => Rule::MatchDestZt { address: Address::unmarshal(buf, cursor)?, negate },
            MATCH_VLAN_ID => Rule::MatchVlanId { id: buf.read_u16(cursor)?, negate },
            MATCH_VLAN_PCP => Rule::MatchVlanPcp { pcp: buf.read_u8(cursor)?, negate },
            MATCH_VLAN_DEI => Rule::MatchVlanDei { dei: buf.read_u8(cursor)?, negate },
            MATCH_ETHERTYPE => Rule::MatchEthertype { ethertype: buf.read_u16(cursor)?, negate },
            MATCH_MAC_SOURCE => Rule::MatchMacSource { mac: MAC::unmarshal(buf, cursor)?, negate },
            MATCH_MAC_DEST => Rule::MatchMacDest { mac: MAC::unmarshal(buf, cursor)?, negate },
            MATCH_IPV4_SOURCE => {
                let b: &[u8; 4] = buf.read_bytes_fixed(cursor)?;
                let prefix_bits = buf.read_u8(cursor)?;
                Rule::MatchIpv4Source { cidr: Cidr { ip: crate::vl1::InetAddress::Ipv4 { ip: *b, port: 0 }, prefix_bits }, negate }
            }
            MATCH_IPV4_DEST => {
                let b: &[u8; 4] = buf.read_bytes_fixed(cursor)?;
                let prefix_bits = buf.read_u8(cursor)?;
                Rule::MatchIpv4Dest { cidr: Cidr { ip: crate::vl1::InetAddress::Ipv4 { ip: *b, port: 0 }, prefix_bits }, negate }
            }
            MATCH_IPV6_SOURCE => {
                let b: &[u8; 16] = buf.read_bytes_fixed(cursor)?;
                let prefix_bits = buf.read_u8(cursor)?;
                Rule::MatchIpv6Source { cidr: Cidr { ip: crate::vl1::InetAddress::Ipv6 { ip: *b, port: 0 }, prefix_bits }, negate }
            }
            MATCH_IPV6_DEST => {
                let b: &[u8; 16] = buf.read_bytes_fixed(cursor)?;
                let prefix_bits = buf.read_u8(cursor)?;
                Rule::MatchIpv6Dest { cidr: Cidr { ip: crate::vl1::InetAddress::Ipv6 { ip: *b, port: 0 }, prefix_bits }, negate }
            }
            MATCH_IP_TOS => Rule::MatchIpTos { dscp: buf.read_u8(cursor)?, negate },
            MATCH_IP_PROTOCOL => Rule::MatchIpProtocol { protocol: buf.read_u8(cursor)?, negate },
            MATCH_ICMP => {
                let icmp_type = buf.read_u8(cursor)?;
                let flags = buf.read_u8(cursor)?;
                let code = buf.read_u8(cursor)?;
                Rule::MatchIcmp { operand: IcmpOperand { icmp_type, icmp_code: if flags & 1 != 0 { Some(code) } else { None } }, negate }
            }
            MATCH_IP_SOURCE_PORT_RANGE => {
                Rule::MatchIpSourcePortRange { range: PortRange { first: buf.read_u16(cursor)?, last: buf.read_u16(cursor)? }, negate }
            }
            MATCH_IP_DEST_PORT_RANGE => {
                Rule::MatchIpDestPortRange { range: PortRange { first: buf.read_u16(cursor)?, last: buf.read_u16(cursor)? }, negate }
            }
            MATCH_CHARACTERISTICS => {
                Rule::MatchCharacteristics { characteristics: Characteristics { mask: buf.read_u64(cursor)?, expected: buf.read_u64(cursor)? }, negate }
            }
            MATCH_FRAME_SIZE_RANGE => {
                Rule::MatchFrameSizeRange { range: PortRange { first: buf.read_u16(cursor)?, last: buf.read_u16(cursor)? }, negate }
            }
            MATCH_TAGS_DIFFERENCE => {
                Rule::MatchTagsDifference { operand: TagOperand { id: buf.read_u32(cursor)?, value: buf.read_u32(cursor)? }, negate }
            }
            MATCH_TAGS_BITWISE_AND => {
                Rule::MatchTagsBitwiseAnd { operand: TagOperand { id: buf.read_u32(cursor)?, value: buf.read_u32(cursor)? }, negate }
            }
            MATCH_TAGS_BITWISE_OR => {
                Rule::MatchTagsBitwiseOr { operand: TagOperand { id: buf.read_u32(cursor)?, value: buf.read_u32(cursor)? }, negate }
            }
            MATCH_TAGS_BITWISE_XOR => {
                Rule::MatchTagsBitwiseXor { operand: TagOperand { id: buf.read_u32(cursor)?, value: buf.read_u32(cursor)? }, negate }
            }
            other if other < 32 => Rule::ActionUnknown(other),
            other => Rule::MatchUnknown(other, negate),
        })
    }
}

impl TryFrom<&[u8]> for Rule {
    type Error = OutOfBoundsError;

    fn try_from(b: &[u8]) -> Result<Self, Self::Error> {
        let buf: Buffer<64> = Buffer::from_bytes(b).map_err(|_| OutOfBoundsError)?;
        let mut cursor = 0;
        Rule::unmarshal(&buf, &mut cursor).map_err(|_| OutOfBoundsError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_and_accept_round_trip() {
        for r in [Rule::ActionDrop, Rule::ActionAccept, Rule::ActionDebugLog] {
            let mut buf: Buffer<64> = Buffer::new();
            r.marshal(&mut buf).unwrap();
            let mut cursor = 0;
            assert_eq!(Rule::unmarshal(&buf, &mut cursor).unwrap(), r);
        }
    }

    #[test]
    fn negate_bit_round_trips() {
        let r = Rule::MatchEthertype { ethertype: 0x0800, negate: true };
        let mut buf: Buffer<64> = Buffer::new();
        r.marshal(&mut buf).unwrap();
        let mut cursor = 0;
        assert_eq!(Rule::unmarshal(&buf, &mut cursor).unwrap(), r);
    }

    #[test]
    fn icmp_operand_round_trips_with_and_without_code() {
        for operand in [IcmpOperand { icmp_type: 8, icmp_code: None }, IcmpOperand { icmp_type: 3, icmp_code: Some(1) }] {
            let r = Rule::MatchIcmp { operand, negate: false };
            let mut buf: Buffer<64> = Buffer::new();
            r.marshal(&mut buf).unwrap();
            let mut cursor = 0;
            assert_eq!(Rule::unmarshal(&buf, &mut cursor).unwrap(), r);
        }
    }
}
