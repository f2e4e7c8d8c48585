// (c) 2020-2022 ZeroTier, Inc. -- currently propritery pending actual release and licensing. See LICENSE.md.

use crate::vl2::multicast_group::{self, MulticastGroup};

/// A multicast group learned from a bridged L2 segment rather than joined locally, with an
/// expiry time after which it drops out unless refreshed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct BridgedGroup {
    group: MulticastGroup,
    expires_at: i64,
}

/// Tracks which multicast groups this member cares about: groups the local tap has joined
/// directly, and groups learned via bridging that expire if not refreshed. `Network` consults
/// this to decide what multicast LIKE announcements to send and what inbound multicast to
/// admit to the tap.
#[derive(Clone, Debug, Default)]
pub struct MulticastRegistry {
    local_groups: Vec<MulticastGroup>,
    bridged_groups: Vec<BridgedGroup>,
}

impl MulticastRegistry {
    pub fn new() -> MulticastRegistry {
        MulticastRegistry::default()
    }

    /// Join a group locally. Returns true if this was a new membership.
    pub fn join(&mut self, group: MulticastGroup) -> bool {
        multicast_group::insert_sorted_unique(&mut self.local_groups, group)
    }

    /// Leave a previously joined local group. Returns true if it was present.
    pub fn leave(&mut self, group: &MulticastGroup) -> bool {
        multicast_group::remove_sorted_unique(&mut self.local_groups, group)
    }

    /// Learn of (or refresh) a bridged group with a new expiry time.
    pub fn learn_bridged(&mut self, group: MulticastGroup, expires_at: i64) {
        if let Some(existing) = self.bridged_groups.iter_mut().find(|g| g.group == group) {
            existing.expires_at = expires_at;
        } else {
            self.bridged_groups.push(BridgedGroup { group, expires_at });
        }
    }

    /// Drop bridged groups whose expiry has passed.
    pub fn clean(&mut self, now: i64) {
        self.bridged_groups.retain(|g| g.expires_at > now);
    }

    pub fn local_groups(&self) -> &[MulticastGroup] {
        &self.local_groups
    }

    /// The full set of groups this member is interested in: locally joined groups, unexpired
    /// bridged groups, and (iff broadcast is enabled on this network) the broadcast group --
    /// sorted and deduplicated.
    pub fn all_groups(&self, now: i64, broadcast_enabled: bool) -> Vec<MulticastGroup> {
        let mut all = self.local_groups.clone();
        for g in self.bridged_groups.iter() {
            if g.expires_at > now {
                multicast_group::insert_sorted_unique(&mut all, g.group);
            }
        }
        if broadcast_enabled {
            multicast_group::insert_sorted_unique(&mut all, MulticastGroup::broadcast());
        }
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vl1::MAC;

    fn group(n: u64) -> MulticastGroup {
        MulticastGroup { mac: MAC::from_u64(n).unwrap(), adi: 0 }
    }

    #[test]
    fn join_and_leave_are_idempotent() {
        let mut r = MulticastRegistry::new();
        assert!(r.join(group(1)));
        assert!(!r.join(group(1)));
        assert!(r.leave(&group(1)));
        assert!(!r.leave(&group(1)));
    }

    #[test]
    fn bridged_groups_expire() {
        let mut r = MulticastRegistry::new();
        r.learn_bridged(group(2), 100);
        assert_eq!(r.all_groups(50, false), vec![group(2)]);
        r.clean(150);
        assert!(r.all_groups(200, false).is_empty());
    }

    #[test]
    fn broadcast_group_included_only_when_enabled() {
        let r = MulticastRegistry::new();
        assert!(r.all_groups(0, false).is_empty());
        assert_eq!(r.all_groups(0, true), vec![MulticastGroup::broadcast()]);
    }
}
