/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2021 ZeroTier, Inc.
 * https://www.zerotier.com/
 */

pub mod capability;
pub mod certificate_of_membership;
pub mod config_reassembler;
pub mod frame_parser;
pub mod interfaces;
pub mod membership;
pub mod multicast_group;
pub mod multicast_registry;
pub mod network;
pub mod network_config;
pub mod network_id;
pub mod rule;
pub mod rule_engine;
pub mod tag;

pub use capability::Capability;
pub use certificate_of_membership::CertificateOfMembership;
pub use config_reassembler::ConfigReassembler;
pub use membership::Membership;
pub use multicast_group::MulticastGroup;
pub use multicast_registry::MulticastRegistry;
pub use network::Network;
pub use network_config::{NetworkConfig, NetworkConfigFlags, Route};
pub use network_id::NetworkId;
pub use rule::Rule;
pub use tag::Tag;
