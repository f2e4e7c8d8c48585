// (c) 2020-2022 ZeroTier, Inc. -- currently propritery pending actual release and licensing. See LICENSE.md.

//! The per-networkId state machine: membership table, current configuration, multicast
//! interests, bridge routes, and the filter entry points that everything else in this crate
//! exists to serve. A single `parking_lot::Mutex` guards all of it, matching the original's
//! one-lock-per-network design: filter calls never block on I/O while holding it, and nothing
//! here ever acquires a second lock while already holding this one.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::util::dictionary::Dictionary;
use crate::util::marshalable::Marshalable;
use crate::vl1::{Address, MAC};
use crate::vl2::capability::Capability;
use crate::vl2::certificate_of_membership::CertificateOfMembership;
use crate::vl2::config_reassembler::ConfigReassembler;
use crate::vl2::interfaces::{
    Controller, ControllerResult, ExternalConfig, HostPortCallback, MAX_ASSIGNED_ADDRESSES, MAX_NETWORK_ROUTES, NetworkStatus, OutboundPacket,
    PersistenceShim, PortOperation, Switch, Topology, persistence_path,
};
use crate::vl2::membership::Membership;
use crate::vl2::multicast_group::MulticastGroup;
use crate::vl2::multicast_registry::MulticastRegistry;
use crate::vl2::network_config::NetworkConfig;
use crate::vl2::network_id::NetworkId;
use crate::vl2::rule_engine::{self, Direction, EvalContext, Verdict};
use crate::vl2::tag::Tag;

/// Anti-DOS circuit breaker on remote-asserted bridge routes.
pub const MAX_BRIDGE_ROUTES: usize = 16384;
pub const MULTICAST_ANNOUNCE_PERIOD_MS: i64 = 120_000;
pub const MULTICAST_LIKE_EXPIRE_MS: i64 = 300_000;
pub const CONFIG_REQUEST_RATE_LIMIT_MS: i64 = 1_000;

const EXT_FRAME_SIDE_OUTBOUND: u8 = 0x02;
const EXT_FRAME_SIDE_INBOUND: u8 = 0x06;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FailureState {
    None,
    NotFound,
    AccessDenied,
}

struct Inner {
    config: Option<NetworkConfig>,
    memberships: HashMap<Address, Membership>,
    multicast: MulticastRegistry,
    remote_bridge_routes: HashMap<MAC, Address>,
    reassembler: ConfigReassembler,
    inbound_config_packet_id: u64,
    failure: FailureState,
    port_error: i32,
    destroyed: bool,
    port_initialized: bool,
    last_config_update: i64,
    last_requested_configuration: i64,
    last_announced_upstream: i64,
}

pub struct Network {
    pub id: NetworkId,
    local_address: Address,
    mac: MAC,
    inner: Mutex<Inner>,
}

impl Network {
    /// Create a Network, attempting to load a cached config from persistence. On success the
    /// cached config is applied with `save_to_disk=false`; otherwise a one-byte `"\n"` is
    /// written to persist membership intent while a real netconf is requested.
    pub fn new(network_id: NetworkId, local_address: Address, persistence: &dyn PersistenceShim, host: &dyn HostPortCallback) -> Network {
        let path = persistence_path(network_id);
        let cached = persistence.get(&path).and_then(|bytes| Dictionary::from_bytes(&bytes)).and_then(|d| NetworkConfig::from_dictionary(&d).ok());

        let net = Network {
            id: network_id,
            local_address,
            mac: NetworkConfig::derive_mac(network_id, local_address),
            inner: Mutex::new(Inner {
                config: None,
                memberships: HashMap::new(),
                multicast: MulticastRegistry::new(),
                remote_bridge_routes: HashMap::new(),
                reassembler: ConfigReassembler::new(),
                inbound_config_packet_id: 0,
                failure: FailureState::None,
                port_error: 0,
                destroyed: false,
                port_initialized: false,
                last_config_update: 0,
                last_requested_configuration: 0,
                last_announced_upstream: 0,
            }),
        };

        if let Some(conf) = cached {
            net.apply_configuration(0, conf, host);
        } else {
            persistence.put(&path, b"\n", false);
        }

        {
            let mut inner = net.inner.lock();
            if !inner.port_initialized {
                let ext = Network::external_config_locked(&net, &inner);
                inner.port_error = host.configure_virtual_network_port(net.id, PortOperation::Up, &ext);
                inner.port_initialized = true;
            }
        }

        net
    }

    pub fn mac(&self) -> MAC {
        self.mac
    }

    fn status_locked(inner: &Inner) -> NetworkStatus {
        if inner.port_error != 0 {
            return NetworkStatus::PortError;
        }
        match inner.failure {
            FailureState::AccessDenied => NetworkStatus::AccessDenied,
            FailureState::NotFound => NetworkStatus::NotFound,
            FailureState::None => {
                if inner.config.is_some() {
                    NetworkStatus::Ok
                } else {
                    NetworkStatus::RequestingConfiguration
                }
            }
        }
    }

    fn external_config_locked(&self, inner: &Inner) -> ExternalConfig {
        let (name, is_private, mtu, bridge_enabled, broadcast_enabled, revision, assigned, routes) = match &inner.config {
            Some(c) => (
                c.name.clone(),
                c.is_private(),
                c.mtu,
                c.passive_bridging() || c.active_bridges.contains(&self.local_address),
                c.enable_broadcast(),
                c.revision,
                c.static_ips.clone(),
                c.routes.clone(),
            ),
            None => (String::new(), true, 0, false, false, 0, Vec::new(), Vec::new()),
        };
        ExternalConfig {
            network_id: self.id,
            mac: self.mac,
            name,
            status: Network::status_locked(inner),
            is_private,
            mtu,
            bridge_enabled,
            broadcast_enabled,
            port_error: inner.port_error,
            revision,
            assigned_addresses: assigned.into_iter().take(MAX_ASSIGNED_ADDRESSES).collect(),
            routes: routes.into_iter().take(MAX_NETWORK_ROUTES).collect(),
        }
    }

    pub fn external_config(&self) -> ExternalConfig {
        let inner = self.inner.lock();
        self.external_config_locked(&inner)
    }

    pub fn is_allowed(&self, peer: Address) -> bool {
        let inner = self.inner.lock();
        match &inner.config {
            Some(_) => inner.memberships.contains_key(&peer),
            None => false,
        }
    }

    fn push_credentials_if_needed(inner: &mut Inner, now: i64, to: Address, switch: &dyn Switch) {
        if to.to_u64() == 0 {
            return;
        }
        let Some(config) = inner.config.as_ref() else { return };
        if !config.is_private() {
            return;
        }
        let Some(com) = config.com.as_ref() else { return };
        let member = inner.memberships.entry(to).or_insert_with(Membership::new);
        if member.should_push_credentials(now) {
            switch.send(to, OutboundPacket::NetworkCredentials { com: com.to_bytes() }, true);
        }
    }

    /// Outbound filter: base rules, then (on no-match) each capability's rules in order. See
    /// module docs on the Network type for the locking contract.
    pub fn filter_outgoing_packet(
        &self,
        no_tee: bool,
        now: i64,
        zt_source: Address,
        zt_dest: Address,
        mac_source: MAC,
        mac_dest: MAC,
        frame: &[u8],
        ether_type: u16,
        vlan_id: u16,
        switch: &dyn Switch,
    ) -> bool {
        let mut inner = self.inner.lock();
        let Some(config) = inner.config.clone() else { return false };

        let remote_tags = inner.memberships.entry(zt_dest).or_insert_with(Membership::new).remote_tag_map().clone();
        let local_tags = config.local_tag_map();
        let unsupported_default = config.rules_result_of_unsupported_match();

        let ctx = EvalContext {
            direction: Direction::Outbound,
            local_address: self.local_address,
            zt_source,
            mac_source,
            mac_dest,
            frame,
            ether_type,
            vlan_id,
            local_tags: &local_tags,
            remote_tags: &remote_tags,
            unsupported_match_default: unsupported_default,
        };

        let mut outcome = rule_engine::evaluate(&config.rules, &ctx, zt_dest);
        if outcome.verdict == Verdict::NoMatch {
            for cap in config.capabilities.iter() {
                let cap_outcome = rule_engine::evaluate(&cap.rules, &ctx, zt_dest);
                match cap_outcome.verdict {
                    Verdict::NoMatch | Verdict::Drop => continue,
                    Verdict::Accept | Verdict::SuperAccept | Verdict::Redirect(_) => {
                        outcome = cap_outcome;
                        break;
                    }
                }
            }
        }

        let (accept, redirected_to) = match outcome.verdict {
            Verdict::Drop => return false,
            Verdict::NoMatch => (false, None),
            Verdict::Accept | Verdict::SuperAccept => (true, None),
            Verdict::Redirect(to) => (true, Some(to)),
        };
        if !accept {
            return false;
        }

        if let Some(tee) = outcome.tee {
            if !no_tee {
                Network::push_credentials_if_needed(&mut inner, now, tee.address, switch);
                switch.send(
                    tee.address,
                    OutboundPacket::ExtFrame {
                        network_id: self.id,
                        side: EXT_FRAME_SIDE_OUTBOUND,
                        mac_dest,
                        mac_source,
                        ether_type,
                        frame: frame[..tee.length.min(frame.len())].to_vec(),
                    },
                    true,
                );
            }
        }

        if let Some(to) = redirected_to {
            if to != zt_dest && to.to_u64() != 0 {
                Network::push_credentials_if_needed(&mut inner, now, to, switch);
                switch.send(
                    to,
                    OutboundPacket::ExtFrame { network_id: self.id, side: EXT_FRAME_SIDE_OUTBOUND, mac_dest, mac_source, ether_type, frame: frame.to_vec() },
                    true,
                );
                return false; // locally dropped: we redirected
            }
        } else if zt_dest.to_u64() != 0 {
            Network::push_credentials_if_needed(&mut inner, now, zt_dest, switch);
        }

        true
    }

    /// Inbound filter: on no-match, capabilities are drawn from the *source* peer's Membership,
    /// not our own capability table -- the sender chose a capability to send under, and we
    /// verify against that same one. Returns 0 (drop), 1 (accept), or 2 (super-accept).
    pub fn filter_incoming_packet(
        &self,
        now: i64,
        source_peer: Address,
        zt_dest: Address,
        mac_source: MAC,
        mac_dest: MAC,
        frame: &[u8],
        ether_type: u16,
        vlan_id: u16,
        switch: &dyn Switch,
    ) -> u8 {
        let mut inner = self.inner.lock();
        let Some(config) = inner.config.clone() else { return 0 };

        let remote_tags = inner.memberships.entry(zt_dest).or_insert_with(Membership::new).remote_tag_map().clone();
        let capabilities = inner
            .memberships
            .entry(source_peer)
            .or_insert_with(Membership::new)
            .remote_capabilities_in_order()
            .into_iter()
            .cloned()
            .collect::<Vec<_>>();
        let local_tags = config.local_tag_map();
        let unsupported_default = config.rules_result_of_unsupported_match();

        let ctx = EvalContext {
            direction: Direction::Inbound,
            local_address: self.local_address,
            zt_source: source_peer,
            mac_source,
            mac_dest,
            frame,
            ether_type,
            vlan_id,
            local_tags: &local_tags,
            remote_tags: &remote_tags,
            unsupported_match_default: unsupported_default,
        };

        let mut outcome = rule_engine::evaluate(&config.rules, &ctx, zt_dest);
        if outcome.verdict == Verdict::NoMatch {
            for cap in capabilities.iter() {
                let cap_outcome = rule_engine::evaluate(&cap.rules, &ctx, zt_dest);
                match cap_outcome.verdict {
                    Verdict::NoMatch | Verdict::Drop => continue,
                    Verdict::Accept | Verdict::SuperAccept | Verdict::Redirect(_) => {
                        outcome = cap_outcome;
                        break;
                    }
                }
            }
        }

        let (accept, redirected_to) = match outcome.verdict {
            Verdict::Drop | Verdict::NoMatch => (0_u8, None),
            Verdict::Accept => (1_u8, None),
            Verdict::SuperAccept => (2_u8, None),
            Verdict::Redirect(to) => (1_u8, Some(to)),
        };
        if accept == 0 {
            return 0;
        }

        if let Some(tee) = outcome.tee {
            Network::push_credentials_if_needed(&mut inner, now, tee.address, switch);
            switch.send(
                tee.address,
                OutboundPacket::ExtFrame {
                    network_id: self.id,
                    side: EXT_FRAME_SIDE_INBOUND,
                    mac_dest,
                    mac_source,
                    ether_type,
                    frame: frame[..tee.length.min(frame.len())].to_vec(),
                },
                true,
            );
        }

        if let Some(to) = redirected_to {
            if to.to_u64() != 0 {
                switch.send(
                    to,
                    OutboundPacket::ExtFrame { network_id: self.id, side: EXT_FRAME_SIDE_INBOUND, mac_dest, mac_source, ether_type, frame: frame.to_vec() },
                    true,
                );
                return 0; // locally dropped: redirected
            }
        }

        accept
    }

    pub fn request_configuration(&self, now: i64, switch: &dyn Switch, controller: Option<&dyn Controller>, persistence: &dyn PersistenceShim, host: &dyn HostPortCallback) {
        {
            let mut inner = self.inner.lock();
            if now - inner.last_requested_configuration < CONFIG_REQUEST_RATE_LIMIT_MS {
                return;
            }
            inner.last_requested_configuration = now;
        }

        let mut metadata = Dictionary::new();
        metadata.set_u64("protocolVersion", crate::VERSION_PROTO as u64);
        metadata.set_u64("nodeMajorVersion", crate::VERSION_MAJOR as u64);
        metadata.set_u64("nodeMinorVersion", crate::VERSION_MINOR as u64);
        metadata.set_u64("nodeRevision", crate::VERSION_REVISION as u64);
        let metadata_bytes = metadata.to_bytes();

        let controller_addr = self.id.controller_address();
        if controller_addr == self.local_address {
            match controller {
                Some(c) => match c.do_network_config_request(self.local_address, self.id, &metadata_bytes) {
                    (ControllerResult::Ok, Some(conf)) => {
                        self.set_configuration(now, conf, true, persistence, host);
                    }
                    (ControllerResult::NotFound, _) => self.set_not_found(),
                    (ControllerResult::AccessDenied, _) => self.set_access_denied(),
                    _ => {}
                },
                None => self.set_not_found(),
            }
            return;
        }

        let (current_revision, current_timestamp) = {
            let inner = self.inner.lock();
            match &inner.config {
                Some(c) => (c.revision, c.timestamp),
                None => (0, 0),
            }
        };
        let packet_id = switch.send(
            controller_addr,
            OutboundPacket::NetworkConfigRequest { network_id: self.id, metadata: metadata_bytes, current_revision, current_timestamp },
            true,
        );

        let mut inner = self.inner.lock();
        inner.inbound_config_packet_id = packet_id;
        inner.reassembler.begin(packet_id);
    }

    pub fn handle_inbound_config_chunk(
        &self,
        now: i64,
        in_re_packet_id: u64,
        data: &[u8],
        offset: usize,
        total_size: usize,
        persistence: &dyn PersistenceShim,
        host: &dyn HostPortCallback,
    ) {
        let reassembled = {
            let mut inner = self.inner.lock();
            if in_re_packet_id != inner.inbound_config_packet_id {
                return;
            }
            inner.reassembler.handle_chunk(in_re_packet_id, data, offset, total_size)
        };
        let Some(bytes) = reassembled else { return };
        let Some(dict) = Dictionary::from_bytes(&bytes) else { return };
        let Ok(conf) = NetworkConfig::from_dictionary(&dict) else { return };
        self.set_configuration(now, conf, true, persistence, host);
    }

    /// Sanity-checks network id and issued-to address, then atomically replaces the config.
    pub fn apply_configuration(&self, now: i64, conf: NetworkConfig, host: &dyn HostPortCallback) -> bool {
        if conf.network_id != self.id || conf.issued_to != self.local_address {
            return false;
        }
        let (ext, op);
        {
            let mut inner = self.inner.lock();
            inner.config = Some(conf);
            inner.last_config_update = now;
            inner.failure = FailureState::None;
            op = if inner.port_initialized { PortOperation::ConfigUpdate } else { PortOperation::Up };
            ext = self.external_config_locked(&inner);
            inner.port_initialized = true;
        }
        let err = host.configure_virtual_network_port(self.id, op, &ext);
        self.inner.lock().port_error = err;
        true
    }

    /// Idempotent: 1 if identical to the current config, 2 if applied (and optionally
    /// persisted), 0 if rejected.
    pub fn set_configuration(&self, now: i64, conf: NetworkConfig, save_to_disk: bool, persistence: &dyn PersistenceShim, host: &dyn HostPortCallback) -> u8 {
        {
            let inner = self.inner.lock();
            if inner.config.as_ref() == Some(&conf) {
                return 1;
            }
        }
        if self.apply_configuration(now, conf.clone(), host) {
            if save_to_disk {
                let d = conf.to_dictionary();
                persistence.put(&persistence_path(self.id), &d.to_bytes(), true);
            }
            2
        } else {
            0
        }
    }

    pub fn set_not_found(&self) {
        self.inner.lock().failure = FailureState::NotFound;
    }

    pub fn set_access_denied(&self) {
        self.inner.lock().failure = FailureState::AccessDenied;
    }

    pub fn join(&self, group: MulticastGroup) -> bool {
        self.inner.lock().multicast.join(group)
    }

    pub fn leave(&self, group: &MulticastGroup) -> bool {
        self.inner.lock().multicast.leave(group)
    }

    pub fn learn_bridge_route(&self, mac: MAC, addr: Address) {
        let mut inner = self.inner.lock();
        inner.remote_bridge_routes.insert(mac, addr);

        while inner.remote_bridge_routes.len() > MAX_BRIDGE_ROUTES {
            let mut counts: HashMap<Address, usize> = HashMap::new();
            for a in inner.remote_bridge_routes.values() {
                *counts.entry(*a).or_insert(0) += 1;
            }
            let Some((&worst, _)) = counts.iter().max_by_key(|(_, c)| **c) else { break };
            inner.remote_bridge_routes.retain(|_, a| *a != worst);
        }
    }

    pub fn learn_bridged_multicast_group(&self, now: i64, group: MulticastGroup) {
        self.inner.lock().multicast.learn_bridged(group, now + MULTICAST_LIKE_EXPIRE_MS);
    }

    /// Caches a tag presented by `from` (e.g. inline on a frame, or via NETWORK_CREDENTIALS),
    /// so later filter calls against that peer can resolve the tag predicates in §4.2.1.
    pub fn learn_remote_tag(&self, from: Address, tag: Tag) {
        self.inner.lock().memberships.entry(from).or_insert_with(Membership::new).learn_tag(tag);
    }

    /// Caches a capability presented by `from` -- this is what makes the inbound capability
    /// fallback in `filter_incoming_packet` (keyed by the source peer's Membership) reachable.
    pub fn learn_remote_capability(&self, from: Address, cap: Capability) {
        self.inner.lock().memberships.entry(from).or_insert_with(Membership::new).learn_capability(cap);
    }

    /// Caches a certificate of membership presented by `from`.
    pub fn learn_remote_com(&self, from: Address, com: CertificateOfMembership) {
        self.inner.lock().memberships.entry(from).or_insert_with(Membership::new).learn_com(com);
    }

    pub fn all_multicast_groups(&self, now: i64) -> Vec<MulticastGroup> {
        let inner = self.inner.lock();
        let enable_broadcast = inner.config.as_ref().map_or(false, |c| c.enable_broadcast());
        inner.multicast.all_groups(now, enable_broadcast)
    }

    /// Emits MULTICAST_LIKE packets for `groups` to `peer`: batches of (networkId, MAC, ADI)
    /// entries, one call to Switch::send per batch.
    fn announce_multicast_groups_to(&self, peer: Address, groups: &[MulticastGroup], switch: &dyn Switch) {
        const MAX_ENTRIES_PER_PACKET: usize = 64;
        for batch in groups.chunks(MAX_ENTRIES_PER_PACKET) {
            let entries = batch.iter().map(|g| (self.id, g.mac, g.adi)).collect();
            switch.send(peer, OutboundPacket::MulticastLike { entries }, true);
        }
    }

    pub fn announce_multicast_groups(&self, now: i64, only_this: Option<MulticastGroup>, topology: &dyn Topology, switch: &dyn Switch) {
        let groups = match only_this {
            Some(g) => vec![g],
            None => self.all_multicast_groups(now),
        };
        if groups.is_empty() {
            return;
        }

        let should_announce_upstream = {
            let mut inner = self.inner.lock();
            let due = only_this.is_some() || now - inner.last_announced_upstream >= MULTICAST_ANNOUNCE_PERIOD_MS;
            if due && only_this.is_none() {
                inner.last_announced_upstream = now;
            }
            due
        };

        if should_announce_upstream {
            let (is_private, com) = {
                let inner = self.inner.lock();
                match &inner.config {
                    Some(c) => (c.is_private(), c.com.clone()),
                    None => (false, None),
                }
            };
            for upstream in topology.upstream_addresses() {
                if is_private {
                    if let Some(com) = &com {
                        switch.send(upstream, OutboundPacket::NetworkCredentials { com: com.to_bytes() }, true);
                    }
                }
                self.announce_multicast_groups_to(upstream, &groups, switch);
            }
        }

        let controller_addr = self.id.controller_address();
        let upstreams = topology.upstream_addresses();
        if !upstreams.contains(&controller_addr) {
            let inner = self.inner.lock();
            if !inner.memberships.contains_key(&controller_addr) {
                drop(inner);
                self.announce_multicast_groups_to(controller_addr, &groups, switch);
            }
        }

        let due_members: Vec<Address> = {
            let mut inner = self.inner.lock();
            inner
                .memberships
                .iter_mut()
                .filter_map(|(addr, m)| {
                    if only_this.is_some() || m.due_for_multicast_like(now, MULTICAST_ANNOUNCE_PERIOD_MS) {
                        m.mark_multicast_like_sent(now);
                        Some(*addr)
                    } else {
                        None
                    }
                })
                .collect()
        };
        for addr in due_members {
            self.announce_multicast_groups_to(addr, &groups, switch);
        }

        // Anchor side-effect: ensure every configured anchor has a (possibly empty) Membership,
        // which is an intentional registration rather than a bug.
        let anchors: Vec<Address> = self.inner.lock().config.as_ref().map(|c| c.anchors.clone()).unwrap_or_default();
        let mut inner = self.inner.lock();
        for anchor in anchors {
            inner.memberships.entry(anchor).or_insert_with(Membership::new);
        }
    }

    pub fn clean(&self, now: i64, topology: &dyn Topology) {
        let mut inner = self.inner.lock();
        if inner.destroyed {
            return;
        }
        inner.multicast.clean(now);
        let config = inner.config.clone();
        inner.memberships.retain(|addr, member| {
            if topology.has_peer(*addr) {
                if let Some(config) = &config {
                    member.clean(config);
                }
                true
            } else {
                false
            }
        });
    }

    /// Sets the destroyed flag, fires OP_DESTROY, and deletes the persisted config.
    pub fn destroy(&self, persistence: &dyn PersistenceShim, host: &dyn HostPortCallback) {
        let ext;
        {
            let mut inner = self.inner.lock();
            inner.destroyed = true;
            ext = self.external_config_locked(&inner);
        }
        host.configure_virtual_network_port(self.id, PortOperation::Destroy, &ext);
        persistence.delete(&persistence_path(self.id));
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        // Normal (non-destroy()) teardown signals the port to go down; the original issues
        // OP_DOWN here and OP_DESTROY only when explicitly destroyed, which destroy() already
        // handled above, so a plain drop is a no-op beyond releasing the lock's contents.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::sync::Mutex as StdMutex;

    use crate::vl1::InetAddress;
    use crate::vl2::network_config::Route;
    use crate::vl2::rule::Rule;

    struct FakeSwitch {
        sent: StdMutex<Vec<(Address, OutboundPacket)>>,
    }
    impl FakeSwitch {
        fn new() -> FakeSwitch {
            FakeSwitch { sent: StdMutex::new(Vec::new()) }
        }
    }
    impl Switch for FakeSwitch {
        fn send(&self, to: Address, packet: OutboundPacket, _encrypt: bool) -> u64 {
            self.sent.lock().unwrap().push((to, packet));
            1
        }
    }

    struct FakePersistence {
        store: RefCell<HashMap<String, Vec<u8>>>,
    }
    impl FakePersistence {
        fn new() -> FakePersistence {
            FakePersistence { store: RefCell::new(HashMap::new()) }
        }
    }
    impl PersistenceShim for FakePersistence {
        fn get(&self, path: &str) -> Option<Vec<u8>> {
            self.store.borrow().get(path).cloned()
        }
        fn put(&self, path: &str, bytes: &[u8], _secure: bool) {
            self.store.borrow_mut().insert(path.to_string(), bytes.to_vec());
        }
        fn delete(&self, path: &str) {
            self.store.borrow_mut().remove(path);
        }
    }

    struct FakeHost;
    impl HostPortCallback for FakeHost {
        fn configure_virtual_network_port(&self, _network_id: NetworkId, _op: PortOperation, _cfg: &ExternalConfig) -> i32 {
            0
        }
    }

    struct FakeTopology {
        known: Vec<Address>,
    }
    impl Topology for FakeTopology {
        fn upstream_addresses(&self) -> Vec<Address> {
            Vec::new()
        }
        fn has_peer(&self, address: Address) -> bool {
            self.known.contains(&address)
        }
    }

    fn make_network() -> (Network, Address, Address) {
        let local = Address::from_u64(1).unwrap();
        let peer = Address::from_u64(2).unwrap();
        let nwid = NetworkId::from_u64(0x8056c2e21c000001);
        let persistence = FakePersistence::new();
        let host = FakeHost;
        let net = Network::new(nwid, local, &persistence, &host);
        let mut conf = NetworkConfig::new(nwid, local);
        conf.revision = 1;
        conf.rules.push(Rule::ActionAccept);
        net.apply_configuration(0, conf, &host);
        (net, local, peer)
    }

    #[test]
    fn no_config_never_allows_traffic() {
        let local = Address::from_u64(1).unwrap();
        let nwid = NetworkId::from_u64(1);
        let persistence = FakePersistence::new();
        let host = FakeHost;
        let net = Network::new(nwid, local, &persistence, &host);
        let sw = FakeSwitch::new();
        assert!(!net.filter_outgoing_packet(true, 0, local, local, MAC::from_u64(1).unwrap(), MAC::from_u64(2).unwrap(), &[], 0x0800, 0, &sw));
    }

    #[test]
    fn accept_everything_rule_program_accepts_outbound() {
        let (net, local, peer) = make_network();
        let sw = FakeSwitch::new();
        assert!(net.filter_outgoing_packet(true, 0, local, peer, MAC::from_u64(1).unwrap(), MAC::from_u64(2).unwrap(), &[], 0x0800, 0, &sw));
    }

    #[test]
    fn set_configuration_is_idempotent() {
        let (net, local, _peer) = make_network();
        let persistence = FakePersistence::new();
        let host = FakeHost;
        let mut conf = NetworkConfig::new(net.id, local);
        conf.revision = 1;
        conf.rules.push(Rule::ActionAccept);
        assert_eq!(net.set_configuration(0, conf.clone(), false, &persistence, &host), 1);
        conf.revision = 2;
        assert_eq!(net.set_configuration(0, conf, false, &persistence, &host), 2);
    }

    #[test]
    fn learned_remote_capability_is_used_by_inbound_filter_fallback() {
        let local = Address::from_u64(1).unwrap();
        let peer_a = Address::from_u64(2).unwrap();
        let peer_b = Address::from_u64(3).unwrap();
        let nwid = NetworkId::from_u64(0x8056c2e21c000001);
        let persistence = FakePersistence::new();
        let host = FakeHost;
        let net = Network::new(nwid, local, &persistence, &host);
        let mut conf = NetworkConfig::new(nwid, local);
        conf.revision = 1;
        // base rules yield NoMatch for everyone (no ACCEPT/DROP action at all).
        net.apply_configuration(0, conf, &host);

        let cap = Capability::new(1, nwid.to_u64(), vec![Rule::MatchSourceZt { address: peer_a, negate: false }, Rule::ActionAccept], local, 0);
        net.learn_remote_capability(peer_a, cap);

        let sw = FakeSwitch::new();
        let mac_s = MAC::from_u64(1).unwrap();
        let mac_d = MAC::from_u64(2).unwrap();
        assert_eq!(net.filter_incoming_packet(0, peer_a, local, mac_s, mac_d, &[], 0x0800, 0, &sw), 1);
        assert_eq!(net.filter_incoming_packet(0, peer_b, local, mac_s, mac_d, &[], 0x0800, 0, &sw), 0);
    }

    #[test]
    fn bridge_route_cap_evicts_worst_offender() {
        let (net, _local, _peer) = make_network();
        let spammer = Address::from_u64(0x0102030405).unwrap();
        for i in 0..(MAX_BRIDGE_ROUTES + 10) {
            net.learn_bridge_route(MAC::from_u64((i as u64) + 1).unwrap(), spammer);
        }
        let inner = net.inner.lock();
        assert!(inner.remote_bridge_routes.len() <= MAX_BRIDGE_ROUTES);
        assert!(!inner.remote_bridge_routes.values().any(|a| *a == spammer));
    }

    #[test]
    fn clean_removes_memberships_for_unknown_peers() {
        let (net, local, peer) = make_network();
        let sw = FakeSwitch::new();
        net.filter_outgoing_packet(true, 0, local, peer, MAC::from_u64(1).unwrap(), MAC::from_u64(2).unwrap(), &[], 0x0800, 0, &sw);
        assert!(net.inner.lock().memberships.contains_key(&peer));
        let topo = FakeTopology { known: vec![] };
        net.clean(0, &topo);
        assert!(!net.inner.lock().memberships.contains_key(&peer));
    }

    #[test]
    fn external_config_caps_assigned_addresses_and_routes() {
        use std::net::{IpAddr, Ipv4Addr};

        let (net, local, _peer) = make_network();
        let mut conf = NetworkConfig::new(net.id, local);
        conf.revision = 2;
        conf.rules.push(Rule::ActionAccept);
        for i in 0..(MAX_ASSIGNED_ADDRESSES + 5) {
            conf.static_ips.push(InetAddress::from_ip_port(IpAddr::V4(Ipv4Addr::new(10, 0, 0, i as u8)), 0));
        }
        for i in 0..(MAX_NETWORK_ROUTES + 5) {
            conf.routes.push(Route {
                target: InetAddress::from_ip_port(IpAddr::V4(Ipv4Addr::new(10, (i / 256) as u8, (i % 256) as u8, 0)), 0),
                target_prefix_bits: 24,
                via: None,
            });
        }
        let host = FakeHost;
        net.apply_configuration(0, conf, &host);

        let inner = net.inner.lock();
        let ext = net.external_config_locked(&inner);
        assert_eq!(ext.assigned_addresses.len(), MAX_ASSIGNED_ADDRESSES);
        assert_eq!(ext.routes.len(), MAX_NETWORK_ROUTES);
    }

    #[test]
    fn multicast_groups_include_broadcast_only_when_enabled() {
        let (net, local, _peer) = make_network();
        assert!(net.all_multicast_groups(0).is_empty());
        let mut conf = NetworkConfig::new(net.id, local);
        conf.revision = 2;
        conf.rules.push(Rule::ActionAccept);
        conf.flags |= crate::vl2::network_config::NetworkConfigFlags::ENABLE_BROADCAST;
        let host = FakeHost;
        net.apply_configuration(0, conf, &host);
        assert_eq!(net.all_multicast_groups(0), vec![MulticastGroup::broadcast()]);
    }
}
