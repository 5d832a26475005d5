//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, Ipv6Addr};

use ipnetwork::{Ipv4Network, Ipv6Network};
use prefix_trie::Prefix;
use ribflow_utils::ip::{AddressFamily, IpAddrKind, IpNetworkKind};

// Address-family specific code.
pub trait Version
where
    Self: 'static
        + Send
        + Sync
        + Clone
        + Copy
        + Default
        + Eq
        + PartialEq
        + std::fmt::Debug,
{
    const ADDRESS_FAMILY: AddressFamily;

    type IpAddr: IpAddrKind;
    type IpNetwork: IpNetworkKind<Self::IpAddr> + Prefix;
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Ipv4();

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Ipv6();

// ===== impl Ipv4 =====

impl Version for Ipv4 {
    const ADDRESS_FAMILY: AddressFamily = AddressFamily::Ipv4;

    type IpAddr = Ipv4Addr;
    type IpNetwork = Ipv4Network;
}

// ===== impl Ipv6 =====

impl Version for Ipv6 {
    const ADDRESS_FAMILY: AddressFamily = AddressFamily::Ipv6;

    type IpAddr = Ipv6Addr;
    type IpNetwork = Ipv6Network;
}
