//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnetwork::{IpNetwork, IpNetworkError, Ipv4Network, Ipv6Network};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// Address Family identifier.
//
// IANA registry:
// http://www.iana.org/assignments/address-family-numbers
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Ipv4 = 1,
    Ipv6 = 2,
}

pub trait IpAddrKind:
    std::fmt::Debug
    + std::fmt::Display
    + Clone
    + Copy
    + Eq
    + std::hash::Hash
    + Ord
    + PartialEq
    + PartialOrd
    + Send
    + Sync
    + DeserializeOwned
    + Serialize
    + Into<IpAddr>
    + 'static
{
    // Lowest address of the address family.
    const MIN: Self;

    // Highest address of the address family.
    const MAX: Self;

    fn get(addr: IpAddr) -> Option<Self>;

    // Returns the address immediately above this one, if any.
    fn successor(&self) -> Option<Self>;

    // Returns the address immediately below this one, if any.
    fn predecessor(&self) -> Option<Self>;
}

pub trait IpNetworkKind<I: IpAddrKind>:
    std::fmt::Debug
    + std::fmt::Display
    + Clone
    + Copy
    + Eq
    + std::hash::Hash
    + Ord
    + PartialEq
    + PartialOrd
    + Send
    + Sync
    + DeserializeOwned
    + Serialize
    + Into<IpNetwork>
    + 'static
{
    const MAX_PREFIXLEN: u8;

    fn new(addr: I, prefix: u8) -> Result<Self, IpNetworkError>;

    // Prefix covering the whole address space of the family.
    fn default(af: AddressFamily) -> Self;

    // Host prefix covering a single address.
    fn host(addr: I) -> Self;

    fn get(prefix: IpNetwork) -> Option<Self>;

    fn contains(&self, ip: I) -> bool;

    fn ip(&self) -> I;

    fn prefix(&self) -> u8;

    // First address covered by the prefix.
    fn network(&self) -> I;

    // Last address covered by the prefix.
    fn broadcast(&self) -> I;

    // Clears the host bits.
    #[must_use]
    fn apply_mask(&self) -> Self;
}

// ===== impl AddressFamily =====

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "ipv4"),
            AddressFamily::Ipv6 => write!(f, "ipv6"),
        }
    }
}

// ===== impl Ipv4Addr =====

impl IpAddrKind for Ipv4Addr {
    const MIN: Self = Ipv4Addr::UNSPECIFIED;
    const MAX: Self = Ipv4Addr::BROADCAST;

    fn get(addr: IpAddr) -> Option<Self> {
        match addr {
            IpAddr::V4(addr) => Some(addr),
            _ => None,
        }
    }

    fn successor(&self) -> Option<Self> {
        u32::from(*self).checked_add(1).map(Ipv4Addr::from)
    }

    fn predecessor(&self) -> Option<Self> {
        u32::from(*self).checked_sub(1).map(Ipv4Addr::from)
    }
}

// ===== impl Ipv6Addr =====

impl IpAddrKind for Ipv6Addr {
    const MIN: Self = Ipv6Addr::UNSPECIFIED;
    const MAX: Self = Ipv6Addr::new(
        0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff,
    );

    fn get(addr: IpAddr) -> Option<Self> {
        match addr {
            IpAddr::V6(addr) => Some(addr),
            _ => None,
        }
    }

    fn successor(&self) -> Option<Self> {
        u128::from(*self).checked_add(1).map(Ipv6Addr::from)
    }

    fn predecessor(&self) -> Option<Self> {
        u128::from(*self).checked_sub(1).map(Ipv6Addr::from)
    }
}

// ===== impl Ipv4Network =====

impl IpNetworkKind<Ipv4Addr> for Ipv4Network {
    const MAX_PREFIXLEN: u8 = 32;

    fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self, IpNetworkError> {
        Ipv4Network::new(addr, prefix)
    }

    fn default(_family: AddressFamily) -> Self {
        Ipv4Network::new(Ipv4Addr::UNSPECIFIED, 0).unwrap()
    }

    fn host(addr: Ipv4Addr) -> Self {
        Ipv4Network::new(addr, 32).unwrap()
    }

    fn get(prefix: IpNetwork) -> Option<Self> {
        match prefix {
            IpNetwork::V4(prefix) => Some(prefix),
            _ => None,
        }
    }

    fn contains(&self, ip: Ipv4Addr) -> bool {
        Ipv4Network::contains(*self, ip)
    }

    fn ip(&self) -> Ipv4Addr {
        Ipv4Network::ip(*self)
    }

    fn prefix(&self) -> u8 {
        Ipv4Network::prefix(*self)
    }

    fn network(&self) -> Ipv4Addr {
        Ipv4Network::network(*self)
    }

    fn broadcast(&self) -> Ipv4Addr {
        Ipv4Network::broadcast(*self)
    }

    fn apply_mask(&self) -> Self {
        // The prefix length was already validated.
        Ipv4Network::new(IpNetworkKind::network(self), self.prefix()).unwrap()
    }
}

// ===== impl Ipv6Network =====

impl IpNetworkKind<Ipv6Addr> for Ipv6Network {
    const MAX_PREFIXLEN: u8 = 128;

    fn new(addr: Ipv6Addr, prefix: u8) -> Result<Self, IpNetworkError> {
        Ipv6Network::new(addr, prefix)
    }

    fn default(_family: AddressFamily) -> Self {
        Ipv6Network::new(Ipv6Addr::UNSPECIFIED, 0).unwrap()
    }

    fn host(addr: Ipv6Addr) -> Self {
        Ipv6Network::new(addr, 128).unwrap()
    }

    fn get(prefix: IpNetwork) -> Option<Self> {
        match prefix {
            IpNetwork::V6(prefix) => Some(prefix),
            _ => None,
        }
    }

    fn contains(&self, ip: Ipv6Addr) -> bool {
        Ipv6Network::contains(self, ip)
    }

    fn ip(&self) -> Ipv6Addr {
        Ipv6Network::ip(self)
    }

    fn prefix(&self) -> u8 {
        Ipv6Network::prefix(self)
    }

    fn network(&self) -> Ipv6Addr {
        Ipv6Network::network(self)
    }

    fn broadcast(&self) -> Ipv6Addr {
        Ipv6Network::broadcast(self)
    }

    fn apply_mask(&self) -> Self {
        // The prefix length was already validated.
        Ipv6Network::new(IpNetworkKind::network(self), self.prefix()).unwrap()
    }
}

// ===== unit tests =====
