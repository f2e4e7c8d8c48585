// (c) 2020-2022 ZeroTier, Inc. -- currently propritery pending actual release and licensing. See LICENSE.md.

//! Narrow contracts to the collaborators this layer treats as external: the switch/transport
//! that actually puts bytes on the wire, node topology, the local persistence store, the
//! host's virtual network port, and an in-process network controller. Network calls through
//! these traits; it never depends on their implementations.

use crate::vl1::{Address, InetAddress, MAC};
use crate::vl2::network_config::{NetworkConfig, Route};
use crate::vl2::network_id::NetworkId;

pub const MAX_ASSIGNED_ADDRESSES: usize = 16;
pub const MAX_NETWORK_ROUTES: usize = 32;

/// One of the packet types this layer hands to the Switch. Bodies here are structured data,
/// not wire bytes -- turning them into an actual Packet is the serializer's job, which is out
/// of scope for this crate.
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundPacket {
    /// side = 0x02 for an outbound-side TEE/REDIRECT, 0x06 for an inbound-side one.
    ExtFrame { network_id: NetworkId, side: u8, mac_dest: MAC, mac_source: MAC, ether_type: u16, frame: Vec<u8> },
    MulticastLike { entries: Vec<(NetworkId, MAC, u32)> },
    NetworkCredentials { com: Vec<u8> },
    NetworkConfigRequest { network_id: NetworkId, metadata: Vec<u8>, current_revision: u64, current_timestamp: i64 },
}

/// Sends a packet to a peer, returning the packet id assigned to it (needed so Network can
/// remember which id a netconf reply chunk is replying to).
pub trait Switch {
    fn send(&self, to: Address, packet: OutboundPacket, encrypt: bool) -> u64;
}

pub trait Topology {
    fn upstream_addresses(&self) -> Vec<Address>;
    fn has_peer(&self, address: Address) -> bool;
}

/// KV interface for `networks.d/<16-hex-networkId>.conf`.
pub trait PersistenceShim {
    fn get(&self, path: &str) -> Option<Vec<u8>>;
    fn put(&self, path: &str, bytes: &[u8], secure: bool);
    fn delete(&self, path: &str);
}

pub fn persistence_path(network_id: NetworkId) -> String {
    format!("networks.d/{:016x}.conf", network_id.to_u64())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortOperation {
    Up,
    Down,
    Destroy,
    ConfigUpdate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkStatus {
    RequestingConfiguration,
    Ok,
    AccessDenied,
    NotFound,
    PortError,
}

/// Flat snapshot of a Network's externally visible state, passed to the host port callback
/// and readable by API consumers. Address/route lists are capped the way the original's
/// fixed-size C snapshot struct was.
#[derive(Clone, Debug, PartialEq)]
pub struct ExternalConfig {
    pub network_id: NetworkId,
    pub mac: MAC,
    pub name: String,
    pub status: NetworkStatus,
    pub is_private: bool,
    pub mtu: u32,
    pub bridge_enabled: bool,
    pub broadcast_enabled: bool,
    pub port_error: i32,
    pub revision: u64,
    pub assigned_addresses: Vec<InetAddress>,
    pub routes: Vec<Route>,
}

/// `configureVirtualNetworkPort(networkId, userPtr, op, cfg)`. The user pointer is opaque to
/// this crate; hosts thread their own context through whatever closure or object implements
/// this trait.
pub trait HostPortCallback {
    fn configure_virtual_network_port(&self, network_id: NetworkId, op: PortOperation, cfg: &ExternalConfig) -> i32;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerResult {
    Ok,
    NotFound,
    AccessDenied,
    TemporarilyUnavailable,
}

/// The local in-process controller path, taken only when this node is its own network's
/// controller (`networkId`'s controller address equals the local node's address).
pub trait Controller {
    fn do_network_config_request(&self, requester: Address, network_id: NetworkId, metadata: &[u8]) -> (ControllerResult, Option<NetworkConfig>);
}
