//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;

use crate::route::{RouteEntry, RouteRange};
use crate::table::TableId;
use crate::trie::PrefixTrie;
use crate::version::Version;

// Transient stage holding the routes of a restarted protocol until they are
// withdrawn in the background, one route per scheduler turn.
#[derive(Debug)]
pub struct DeletionTable<V: Version> {
    pub name: String,
    pub parent: TableId,
    pub next_table: Option<TableId>,
    trie: PrefixTrie<V, Arc<RouteEntry<V>>>,
}

// ===== impl DeletionTable =====

impl<V> DeletionTable<V>
where
    V: Version,
{
    pub(crate) fn new(
        name: String,
        parent: TableId,
        next_table: Option<TableId>,
        trie: PrefixTrie<V, Arc<RouteEntry<V>>>,
    ) -> DeletionTable<V> {
        DeletionTable {
            name,
            parent,
            next_table,
            trie,
        }
    }

    // Number of routes still waiting to be withdrawn.
    pub fn pending(&self) -> usize {
        self.trie.len()
    }

    // A route for a network pending deletion came back. Cancels the pending
    // deletion and returns the stale route so it can be withdrawn first.
    pub(crate) fn add_route(
        &mut self,
        route: &RouteEntry<V>,
    ) -> Option<Arc<RouteEntry<V>>> {
        self.trie.remove(&route.net)
    }

    pub(crate) fn check_delete(&self, route: &RouteEntry<V>) {
        assert!(
            !self.trie.contains(&route.net),
            "{}: deleted route {} is pending deletion",
            self.name,
            route.net
        );
    }

    pub(crate) fn pop_route(&mut self) -> Option<Arc<RouteEntry<V>>> {
        self.trie.pop_first().map(|(_, route)| route)
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
}
