// (c) 2020-2022 ZeroTier, Inc. -- currently propritery pending actual release and licensing. See LICENSE.md.

//! The filter interpreter: a flat rule array is partitioned into match-sets (zero or more
//! MATCH entries terminated by an ACTION) and evaluated as a pure function over an immutable
//! packet context. Nothing here touches a lock, a socket, or a clock -- Network owns all of
//! that and calls in here once per frame.

use std::collections::HashMap;

use crate::vl1::{Address, InetAddress, MAC};
use crate::vl2::frame_parser;
use crate::vl2::rule::Rule;

/// Bit assigned to packets evaluated on the inbound path.
const CHARACTERISTIC_INBOUND: u64 = 1 << 63;
const CHARACTERISTIC_MULTICAST: u64 = 1 << 62;
const CHARACTERISTIC_BROADCAST: u64 = 1 << 61;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Everything the rule engine needs to know about one frame evaluation. Tag tables are looked
/// up by the caller (Network) from the appropriate Membership -- local rules always read the
/// local member's own tags, while which *remote* table is passed in is what creates the
/// capability-vs-base-rule asymmetry between outbound and inbound (see Network::filter_*).
pub struct EvalContext<'a> {
    pub direction: Direction,
    pub local_address: Address,
    pub zt_source: Address,
    pub mac_source: MAC,
    pub mac_dest: MAC,
    pub frame: &'a [u8],
    pub ether_type: u16,
    pub vlan_id: u16,
    pub local_tags: &'a HashMap<u32, u32>,
    pub remote_tags: &'a HashMap<u32, u32>,
    /// Default verdict (0 or 1, per the network's RULES_RESULT_OF_UNSUPPORTED_MATCH flag) for
    /// a MATCH type byte this build doesn't recognize.
    pub unsupported_match_default: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    NoMatch,
    Drop,
    Accept,
    SuperAccept,
    Redirect(Address),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TeeSideEffect {
    pub address: Address,
    pub length: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub verdict: Verdict,
    pub tee: Option<TeeSideEffect>,
}

/// Evaluate `rules` against `ctx`, starting redirection bookkeeping from `zt_dest`. `zt_dest`
/// is the destination the caller currently believes is correct; REDIRECT rules may change it,
/// which is why the chosen destination is threaded through rather than read once from `ctx`.
pub fn evaluate(rules: &[Rule], ctx: &EvalContext, zt_dest: Address) -> Outcome {
    let mut this_set_matches = true;
    let mut tee: Option<TeeSideEffect> = None;
    let mut zt_dest2 = zt_dest;

    for rule in rules {
        if rule.is_action() {
            if this_set_matches {
                match rule {
                    Rule::ActionDrop => return Outcome { verdict: Verdict::Drop, tee },
                    Rule::ActionAccept => return Outcome { verdict: Verdict::Accept, tee },
                    Rule::ActionTee(target) => {
                        if target.address != ctx.zt_source && target.address != ctx.local_address && target.address != zt_dest2 {
                            let cc_length = if target.length > 0 { (ctx.frame.len()).min(target.length as usize) } else { ctx.frame.len() };
                            tee = Some(TeeSideEffect { address: target.address, length: cc_length });
                        }
                    }
                    Rule::ActionRedirect(target) => {
                        if target.address == ctx.local_address && ctx.direction == Direction::Inbound {
                            return Outcome { verdict: Verdict::SuperAccept, tee };
                        } else if target.address == ctx.zt_source
                            || (target.address == ctx.local_address && ctx.direction == Direction::Outbound)
                            || target.address == zt_dest2
                        {
                            // noop: redirect target is a no-op per the design's self-redirect guard
                        } else {
                            zt_dest2 = target.address;
                            return Outcome { verdict: Verdict::Redirect(zt_dest2), tee };
                        }
                    }
                    Rule::ActionDebugLog | Rule::ActionUnknown(_) => {}
                    _ => unreachable!("is_action() guarantees an action variant"),
                }
            }
            this_set_matches = true;
            continue;
        }

        if !this_set_matches {
            continue; // circuit breaker: this match-set is already dead
        }
        let matched = predicate_matches(rule, ctx, zt_dest2);
        this_set_matches = this_set_matches && matched;
    }

    Outcome { verdict: Verdict::NoMatch, tee }
}

fn ipv4_cidr_contains(cidr_ip: &InetAddress, prefix_bits: u8, frame: &[u8], ether_type: u16, source: bool) -> bool {
    let host = if source { frame_parser::ipv4_source(frame, ether_type) } else { frame_parser::ipv4_dest(frame, ether_type) };
    match host {
        Some(ip) => cidr_ip.contains_cidr(&InetAddress::Ipv4 { ip, port: 0 }, prefix_bits),
        None => false,
    }
}

fn ipv6_cidr_contains(cidr_ip: &InetAddress, prefix_bits: u8, frame: &[u8], ether_type: u16, source: bool) -> bool {
    let host = if source { frame_parser::ipv6_source(frame, ether_type) } else { frame_parser::ipv6_dest(frame, ether_type) };
    match host {
        Some(ip) => cidr_ip.contains_cidr(&InetAddress::Ipv6 { ip, port: 0 }, prefix_bits),
        None => false,
    }
}

fn port_in_range(frame: &[u8], ether_type: u16, range_lo: u16, range_hi: u16, source: bool) -> bool {
    let protocol = match frame_parser::ip_protocol(frame, ether_type) {
        Some(p) => p,
        None => return false,
    };
    let header_pos = if frame_parser::is_ipv4(frame, ether_type) {
        frame_parser::ipv4_header_len(frame)
    } else {
        match frame_parser::ipv6_payload(frame, ether_type) {
            Some((pos, _)) => pos,
            None => return false,
        }
    };
    match frame_parser::l4_ports(frame, header_pos, protocol) {
        Some((src, dst)) => {
            let port = if source { src } else { dst };
            port >= range_lo && port <= range_hi
        }
        None => false,
    }
}

fn characteristics(ctx: &EvalContext) -> u64 {
    let mut cf = 0_u64;
    if ctx.direction == Direction::Inbound {
        cf |= CHARACTERISTIC_INBOUND;
    }
    if ctx.mac_dest.is_multicast() {
        cf |= CHARACTERISTIC_MULTICAST;
    }
    if ctx.mac_dest.is_broadcast() {
        cf |= CHARACTERISTIC_BROADCAST;
    }
    if let Some(protocol) = frame_parser::ip_protocol(ctx.frame, ctx.ether_type) {
        if protocol == frame_parser::IP_PROTOCOL_TCP {
            let hdr = if frame_parser::is_ipv4(ctx.frame, ctx.ether_type) {
                Some(frame_parser::ipv4_header_len(ctx.frame))
            } else {
                frame_parser::ipv6_payload(ctx.frame, ctx.ether_type).map(|(pos, _)| pos)
            };
            if let Some(hdr) = hdr {
                if hdr + 14 <= ctx.frame.len() {
                    cf |= ctx.frame[hdr + 13] as u64;
                    cf |= ((ctx.frame[hdr + 12] & 0x0f) as u64) << 8;
                }
            }
        }
    }
    cf
}

/// Tag predicates implement the inbound-strict / outbound-lenient asymmetry: on outbound, a
/// remote tag that simply hasn't arrived yet (sync lag) is treated as a pass; on inbound,
/// absence must fail closed or the policy is not actually enforced.
fn tag_predicate(ctx: &EvalContext, tag_id: u32, op: impl Fn(u32, u32) -> bool) -> bool {
    let local = match ctx.local_tags.get(&tag_id) {
        Some(v) => *v,
        None => return false,
    };
    match ctx.remote_tags.get(&tag_id) {
        Some(remote) => op(local, *remote),
        None => ctx.direction == Direction::Outbound,
    }
}

fn predicate_matches(rule: &Rule, ctx: &EvalContext, zt_dest2: Address) -> bool {
    match rule {
        Rule::MatchSourceZt { address, negate } => (*address == ctx.zt_source) ^ negate,
        Rule::MatchDestZt { address, negate } => (*address == zt_dest2) ^ negate,
        Rule::MatchVlanId { id, negate } => (*id == ctx.vlan_id) ^ negate,
        Rule::MatchVlanPcp { pcp, negate } => (*pcp == 0) ^ negate,
        Rule::MatchVlanDei { dei, negate } => (*dei == 0) ^ negate,
        Rule::MatchEthertype { ethertype, negate } => (*ethertype == ctx.ether_type) ^ negate,
        Rule::MatchMacSource { mac, negate } => (*mac == ctx.mac_source) ^ negate,
        Rule::MatchMacDest { mac, negate } => (*mac == ctx.mac_dest) ^ negate,
        Rule::MatchIpv4Source { cidr, negate } => ipv4_cidr_contains(&cidr.ip, cidr.prefix_bits, ctx.frame, ctx.ether_type, true) ^ negate,
        Rule::MatchIpv4Dest { cidr, negate } => ipv4_cidr_contains(&cidr.ip, cidr.prefix_bits, ctx.frame, ctx.ether_type, false) ^ negate,
        Rule::MatchIpv6Source { cidr, negate } => ipv6_cidr_contains(&cidr.ip, cidr.prefix_bits, ctx.frame, ctx.ether_type, true) ^ negate,
        Rule::MatchIpv6Dest { cidr, negate } => ipv6_cidr_contains(&cidr.ip, cidr.prefix_bits, ctx.frame, ctx.ether_type, false) ^ negate,
        Rule::MatchIpTos { dscp, negate } => {
            let got = frame_parser::ipv4_dscp(ctx.frame, ctx.ether_type).or_else(|| frame_parser::ipv6_dscp(ctx.frame, ctx.ether_type));
            (got == Some(*dscp)) ^ negate
        }
        Rule::MatchIpProtocol { protocol, negate } => {
            (frame_parser::ip_protocol(ctx.frame, ctx.ether_type) == Some(*protocol)) ^ negate
        }
        Rule::MatchIcmp { operand, negate } => {
            let got = frame_parser::icmp_type_code(ctx.frame, ctx.ether_type);
            let m = match got {
                Some((t, c)) => t == operand.icmp_type && operand.icmp_code.map_or(true, |expected| expected == c),
                None => false,
            };
            m ^ negate
        }
        Rule::MatchIpSourcePortRange { range, negate } => port_in_range(ctx.frame, ctx.ether_type, range.first, range.last, true) ^ negate,
        Rule::MatchIpDestPortRange { range, negate } => port_in_range(ctx.frame, ctx.ether_type, range.first, range.last, false) ^ negate,
        Rule::MatchCharacteristics { characteristics: c, negate } => ((characteristics(ctx) & c.mask) == c.expected) ^ negate,
        Rule::MatchFrameSizeRange { range, negate } => {
            let len = ctx.frame.len() as u16;
            (len >= range.first && len <= range.last) ^ negate
        }
        Rule::MatchTagsDifference { operand, negate } => {
            tag_predicate(ctx, operand.id, |l, r| (l as i64 - r as i64).unsigned_abs() <= operand.value as u64) ^ negate
        }
        Rule::MatchTagsBitwiseAnd { operand, negate } => tag_predicate(ctx, operand.id, |l, r| (l & r) == operand.value) ^ negate,
        Rule::MatchTagsBitwiseOr { operand, negate } => tag_predicate(ctx, operand.id, |l, r| (l | r) == operand.value) ^ negate,
        Rule::MatchTagsBitwiseXor { operand, negate } => tag_predicate(ctx, operand.id, |l, r| (l ^ r) == operand.value) ^ negate,
        Rule::MatchUnknown(_, negate) => ctx.unsupported_match_default ^ negate,
        _ => unreachable!("action variants are handled before predicate_matches is called"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_ctx<'a>(frame: &'a [u8], ether_type: u16, local_tags: &'a HashMap<u32, u32>, remote_tags: &'a HashMap<u32, u32>) -> EvalContext<'a> {
        EvalContext {
            direction: Direction::Outbound,
            local_address: Address::from_u64(0xffffff0001).unwrap(),
            zt_source: Address::from_u64(1).unwrap(),
            mac_source: MAC::from_u64(0x1).unwrap(),
            mac_dest: MAC::from_u64(0x2).unwrap(),
            frame,
            ether_type,
            vlan_id: 0,
            local_tags,
            remote_tags,
            unsupported_match_default: false,
        }
    }

    #[test]
    fn default_true_match_set() {
        let empty = HashMap::new();
        let ctx = base_ctx(&[], 0x0800, &empty, &empty);
        assert_eq!(evaluate(&[Rule::ActionAccept], &ctx, ctx.zt_source).verdict, Verdict::Accept);
        assert_eq!(evaluate(&[Rule::ActionDrop], &ctx, ctx.zt_source).verdict, Verdict::Drop);
        assert_eq!(evaluate(&[], &ctx, ctx.zt_source).verdict, Verdict::NoMatch);
    }

    #[test]
    fn s1_ethertype_mismatch_falls_through_to_no_match() {
        let empty = HashMap::new();
        let ctx = base_ctx(&[], 0x0806, &empty, &empty);
        let rules = vec![Rule::MatchEthertype { ethertype: 0x0800, negate: false }, Rule::ActionAccept];
        assert_eq!(evaluate(&rules, &ctx, ctx.zt_source).verdict, Verdict::NoMatch);
    }

    #[test]
    fn s2_cidr_drop_then_accept() {
        let empty = HashMap::new();
        let mut frame = vec![0_u8; 20];
        frame[0] = 0x45;
        frame[16..20].copy_from_slice(&[10, 1, 2, 3]);
        let ctx = base_ctx(&frame, 0x0800, &empty, &empty);
        let rules = vec![
            Rule::MatchIpv4Dest { cidr: crate::vl2::rule::Cidr { ip: InetAddress::Ipv4 { ip: [10, 0, 0, 0], port: 0 }, prefix_bits: 8 }, negate: false },
            Rule::ActionDrop,
            Rule::ActionAccept,
        ];
        assert_eq!(evaluate(&rules, &ctx, ctx.zt_source).verdict, Verdict::Drop);

        let mut frame2 = frame.clone();
        frame2[16..20].copy_from_slice(&[192, 168, 1, 1]);
        let ctx2 = base_ctx(&frame2, 0x0800, &empty, &empty);
        assert_eq!(evaluate(&rules, &ctx2, ctx2.zt_source).verdict, Verdict::Accept);
    }

    #[test]
    fn s3_redirect_to_local_inbound_is_super_accept() {
        let empty = HashMap::new();
        let mut ctx = base_ctx(&[], 0x0800, &empty, &empty);
        ctx.direction = Direction::Inbound;
        let local = ctx.local_address;
        let rules = vec![Rule::ActionRedirect(crate::vl2::rule::ForwardTarget { address: local, length: 0 })];
        assert_eq!(evaluate(&rules, &ctx, ctx.zt_source).verdict, Verdict::SuperAccept);

        let ctx_out = base_ctx(&[], 0x0800, &empty, &empty);
        assert_eq!(evaluate(&rules, &ctx_out, ctx_out.zt_source).verdict, Verdict::NoMatch);
    }

    #[test]
    fn s4_tee_sets_side_channel_without_changing_verdict() {
        let empty = HashMap::new();
        let ctx = base_ctx(&[0_u8; 4], 0x0800, &empty, &empty);
        let target = Address::from_u64(0xabcdef0123).unwrap();
        let rules = vec![Rule::ActionTee(crate::vl2::rule::ForwardTarget { address: target, length: 0 }), Rule::ActionAccept];
        let outcome = evaluate(&rules, &ctx, ctx.zt_source);
        assert_eq!(outcome.verdict, Verdict::Accept);
        assert_eq!(outcome.tee, Some(TeeSideEffect { address: target, length: 4 }));
    }

    #[test]
    fn circuit_breaker_skips_rest_of_dead_match_set() {
        let empty = HashMap::new();
        let ctx = base_ctx(&[], 0x0806, &empty, &empty);
        let rules = vec![
            Rule::MatchEthertype { ethertype: 0x0800, negate: false }, // fails -> set is dead
            Rule::MatchVlanId { id: 999, negate: false },              // must be skipped, not evaluated
            Rule::ActionDrop,
            Rule::ActionAccept,
        ];
        assert_eq!(evaluate(&rules, &ctx, ctx.zt_source).verdict, Verdict::Accept);
    }

    #[test]
    fn tag_asymmetry_inbound_strict_outbound_lenient() {
        let mut local_tags = HashMap::new();
        local_tags.insert(1_u32, 5_u32);
        let remote_tags = HashMap::new(); // remote never sent tag 1
        let mut ctx_in = base_ctx(&[], 0x0800, &local_tags, &remote_tags);
        ctx_in.direction = Direction::Inbound;
        let ctx_out = base_ctx(&[], 0x0800, &local_tags, &remote_tags);
        let rules = vec![Rule::MatchTagsBitwiseAnd { operand: crate::vl2::rule::TagOperand { id: 1, value: 1 }, negate: false }, Rule::ActionAccept];
        assert_eq!(evaluate(&rules, &ctx_in, ctx_in.zt_source).verdict, Verdict::NoMatch);
        assert_eq!(evaluate(&rules, &ctx_out, ctx_out.zt_source).verdict, Verdict::Accept);
    }

    #[test]
    fn negate_symmetry() {
        let empty = HashMap::new();
        let ctx = base_ctx(&[], 0x0800, &empty, &empty);
        let positive = vec![Rule::MatchEthertype { ethertype: 0x0800, negate: false }, Rule::ActionAccept];
        let negated = vec![Rule::MatchEthertype { ethertype: 0x0800, negate: true }, Rule::ActionAccept];
        let a = evaluate(&positive, &ctx, ctx.zt_source).verdict == Verdict::Accept;
        let b = evaluate(&negated, &ctx, ctx.zt_source).verdict == Verdict::Accept;
        assert!(a ^ b);
    }
}
