//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;

use ribflow_utils::policy::PolicyTags;
use ribflow_utils::protocol::Protocol;

use crate::error::Error;
use crate::route::{RouteEntry, RouteRange};
use crate::table::TableId;
use crate::trie::PrefixTrie;
use crate::version::Version;

// Source of truth for the routes of one routing protocol.
#[derive(Debug)]
pub struct OriginTable<V: Version> {
    pub name: String,
    pub protocol: Protocol,
    pub admin_distance: u32,
    pub next_table: Option<TableId>,
    trie: PrefixTrie<V, Arc<RouteEntry<V>>>,
}

// ===== impl OriginTable =====

impl<V> OriginTable<V>
where
    V: Version,
{
    pub(crate) fn new(
        name: String,
        protocol: Protocol,
        admin_distance: u32,
    ) -> OriginTable<V> {
        OriginTable {
            name,
            protocol,
            admin_distance,
            next_table: None,
            trie: PrefixTrie::new(),
        }
    }

    pub fn route_count(&self) -> usize {
        self.trie.len()
    }

    pub(crate) fn add_route(
        &mut self,
        mut route: RouteEntry<V>,
    ) -> Result<Arc<RouteEntry<V>>, Error> {
        if self.trie.contains(&route.net) {
            return Err(Error::RouteExists(self.protocol, route.net.into()));
        }

        route.admin_distance = self.admin_distance;
        let route = Arc::new(route);
        self.trie.insert(route.net, route.clone());
        Ok(route)
    }

    pub(crate) fn delete_route(
        &mut self,
        net: &V::IpNetwork,
    ) -> Result<Arc<RouteEntry<V>>, Error> {
        self.trie
            .remove(net)
            .ok_or_else(|| Error::RouteNotFound(self.protocol, (*net).into()))
    }

    // Re-tags an existing route.
    //
    // Returns the updated route and its previous tags, or `None` when the tags
    // didn't change.
    pub(crate) fn replace_policytags(
        &mut self,
        net: &V::IpNetwork,
        policytags: PolicyTags,
    ) -> Result<Option<(Arc<RouteEntry<V>>, PolicyTags)>, Error> {
        let protocol = self.protocol;
        let Some(route) = self.trie.lookup_node_mut(net) else {
            return Err(Error::RouteNotFound(protocol, (*net).into()));
        };
        if route.policytags == policytags {
            return Ok(None);
        }

        let mut new_route = (**route).clone();
        let prevtags = std::mem::replace(&mut new_route.policytags, policytags);
        *route = Arc::new(new_route);
        Ok(Some((route.clone(), prevtags)))
    }

    // Hands over all routes, leaving the table empty.
    pub(crate) fn take_routes(
        &mut self,
    ) -> PrefixTrie<V, Arc<RouteEntry<V>>> {
        std::mem::take(&mut self.trie)
    }

    pub fn lookup_route(
        &self,
        net: &V::IpNetwork,
    ) -> Option<&Arc<RouteEntry<V>>> {
        self.trie.lookup_node(net)
    }

    pub fn lookup_route_addr(
        &self,
        addr: V::IpAddr,
    ) -> Option<&Arc<RouteEntry<V>>> {
        self.trie.find(addr).map(|(_, route)| route)
    }

    pub fn lookup_route_range(&self, addr: V::IpAddr) -> RouteRange<V> {
        let route = self.lookup_route_addr(addr).cloned();
        let (bottom, top) = self.trie.find_bounds(addr);
        RouteRange::new(addr, route, bottom, top)
    }

    pub fn routes(&self) -> impl Iterator<Item = &Arc<RouteEntry<V>>> {
        self.trie.iter().map(|(_, route)| route)
    }
}
