// (c) 2020-2022 ZeroTier, Inc. -- currently propritery pending actual release and licensing. See LICENSE.md.

use std::collections::HashMap;

use crate::vl2::capability::Capability;
use crate::vl2::certificate_of_membership::CertificateOfMembership;
use crate::vl2::network_config::NetworkConfig;
use crate::vl2::tag::Tag;

/// Minimum interval between unsolicited credential pushes to the same peer.
pub const CREDENTIAL_PUSH_INTERVAL_MS: i64 = 60_000;

/// Per-remote-peer, per-network state: everything this member has told us about itself, plus
/// bookkeeping for when we last pushed our own credentials to them. Network owns one of these
/// per Address it has ever exchanged network traffic or multicast interest with; entries are
/// created lazily on first reference and reaped by `Network::clean`.
#[derive(Clone, Debug, Default)]
pub struct Membership {
    remote_tags: HashMap<u32, u32>,
    remote_capabilities: HashMap<u32, Capability>,
    remote_com: Option<CertificateOfMembership>,
    last_pushed_credentials: i64,
    last_multicast_like_sent: i64,
}

impl Membership {
    pub fn new() -> Membership {
        Membership::default()
    }

    pub fn remote_tag_map(&self) -> &HashMap<u32, u32> {
        &self.remote_tags
    }

    pub fn remote_com(&self) -> Option<&CertificateOfMembership> {
        self.remote_com.as_ref()
    }

    pub fn learn_tag(&mut self, tag: Tag) {
        self.remote_tags.insert(tag.id, tag.value);
    }

    pub fn learn_capability(&mut self, cap: Capability) {
        self.remote_capabilities.insert(cap.id, cap);
    }

    pub fn learn_com(&mut self, com: CertificateOfMembership) {
        self.remote_com = Some(com);
    }

    /// Capabilities cached from this peer, in ascending id order -- the iteration order the
    /// rule engine's capability fallback loop uses when no base rule produced a verdict.
    pub fn remote_capabilities_in_order(&self) -> Vec<&Capability> {
        let mut v: Vec<&Capability> = self.remote_capabilities.values().collect();
        v.sort_by_key(|c| c.id);
        v
    }

    /// True (and resets the internal gate) if at least `CREDENTIAL_PUSH_INTERVAL_MS` has
    /// elapsed since the last push, or none has ever been sent.
    pub fn should_push_credentials(&mut self, now: i64) -> bool {
        if now.saturating_sub(self.last_pushed_credentials) >= CREDENTIAL_PUSH_INTERVAL_MS {
            self.last_pushed_credentials = now;
            true
        } else {
            false
        }
    }

    pub fn mark_credentials_pushed(&mut self, now: i64) {
        self.last_pushed_credentials = now;
    }

    pub fn due_for_multicast_like(&self, now: i64, period_ms: i64) -> bool {
        now.saturating_sub(self.last_multicast_like_sent) >= period_ms
    }

    pub fn mark_multicast_like_sent(&mut self, now: i64) {
        self.last_multicast_like_sent = now;
    }

    /// Drop cached remote credentials that name capability or tag ids the current config no
    /// longer defines -- once the controller retires an id, a peer's stale copy should stop
    /// being trusted even if it keeps presenting it.
    pub fn clean(&mut self, config: &NetworkConfig) {
        self.remote_capabilities.retain(|id, _| config.capability_by_id(*id).is_some());
        self.remote_tags.retain(|id, _| config.tag_by_id(*id).is_some());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vl1::Address;
    use crate::vl2::network_id::NetworkId;

    #[test]
    fn credential_push_is_rate_limited() {
        let mut m = Membership::new();
        assert!(m.should_push_credentials(0));
        assert!(!m.should_push_credentials(1_000));
        assert!(m.should_push_credentials(CREDENTIAL_PUSH_INTERVAL_MS));
    }

    #[test]
    fn capabilities_iterate_in_id_order() {
        let mut m = Membership::new();
        let nwid = 1_u64;
        let who = Address::from_u64(1).unwrap();
        m.learn_capability(Capability::new(5, nwid, vec![], who, 0));
        m.learn_capability(Capability::new(1, nwid, vec![], who, 0));
        m.learn_capability(Capability::new(3, nwid, vec![], who, 0));
        let ids: Vec<u32> = m.remote_capabilities_in_order().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 3, 5]);
    }

    #[test]
    fn clean_drops_retired_credentials() {
        let mut m = Membership::new();
        let who = Address::from_u64(1).unwrap();
        m.learn_capability(Capability::new(1, 1, vec![], who, 0));
        m.learn_tag(Tag::new(2, 9, 1, who, 0));
        let config = NetworkConfig::new(NetworkId::from_u64(1), who); // defines neither id
        m.clean(&config);
        assert!(m.remote_capabilities_in_order().is_empty());
        assert!(m.remote_tag_map().is_empty());
    }
}
