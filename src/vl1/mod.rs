// (c) 2020-2022 ZeroTier, Inc. -- currently propritery pending actual release and licensing. See LICENSE.md.

//! Identity-adjacent primitives shared by the network layer: the short peer address, Ethernet
//! MAC addresses, and IP addresses/CIDR blocks. The full identity, path, and peer-session types
//! belong to the transport layer and are not part of this crate.

mod address;
mod inetaddress;
mod mac;

pub use address::Address;
pub use inetaddress::{InetAddress, IpScope};
pub use mac::MAC;
