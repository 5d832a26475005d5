//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;

use ribflow_utils::protocol::Protocol;

use crate::route::RouteEntry;
use crate::version::Version;

// Network interface known to the RIB.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RibVif<V: Version> {
    pub name: String,
    // Configured addresses and the subnet each one is attached to.
    pub addresses: BTreeMap<V::IpAddr, V::IpNetwork>,
}

// ===== impl RibVif =====

impl<V> RibVif<V>
where
    V: Version,
{
    pub(crate) fn new(name: String) -> RibVif<V> {
        RibVif {
            name,
            addresses: Default::default(),
        }
    }

    // Route to the subnet directly attached through the given address.
    pub(crate) fn connected_route(
        &self,
        addr: V::IpAddr,
        subnet: V::IpNetwork,
    ) -> RouteEntry<V> {
        RouteEntry::new(subnet, addr, Protocol::DIRECT, 0).with_interface(
            Some(self.name.clone()),
            Some(self.name.clone()),
        )
    }
}
