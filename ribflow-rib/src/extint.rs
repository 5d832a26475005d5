//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ribflow_utils::ip::IpNetworkKind;
use ribflow_utils::protocol::Protocol;

use crate::debug::Debug;
use crate::route::{RouteEntry, RouteRange};
use crate::table::TableId;
use crate::trie::PrefixTrie;
use crate::version::Version;

// Stage joining the IGP and EGP halves of the table graph.
//
// IGP routes pass through. An EGP route is only propagated once an IGP
// route covers its next-hop, and then goes out through the next-hop and
// interface of that IGP route. For networks known on both sides, the lower
// administrative distance wins and ties go to the IGP side.
#[derive(Debug)]
pub struct ExtIntTable<V: Version> {
    pub name: String,
    pub int_parent: Option<TableId>,
    pub ext_parent: Option<TableId>,
    pub next_table: Option<TableId>,
    // Routes propagated downstream.
    winning: PrefixTrie<V, Arc<RouteEntry<V>>>,
    resolved: BTreeMap<V::IpNetwork, ResolvedRoute<V>>,
    // Resolved EGP networks, by resolving IGP network.
    igp_parents: BTreeMap<V::IpNetwork, BTreeSet<V::IpNetwork>>,
    unresolved: BTreeMap<V::IpNetwork, Arc<RouteEntry<V>>>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExtIntSide {
    Internal,
    External,
}

// EGP route whose next-hop resolved through an IGP route.
#[derive(Debug)]
pub struct ResolvedRoute<V: Version> {
    pub egp_route: Arc<RouteEntry<V>>,
    pub igp_net: V::IpNetwork,
    // Route as propagated downstream.
    pub route: Arc<RouteEntry<V>>,
}

// ===== impl ExtIntTable =====

impl<V> ExtIntTable<V>
where
    V: Version,
{
    pub(crate) fn new(name: String) -> ExtIntTable<V> {
        ExtIntTable {
            name,
            int_parent: None,
            ext_parent: None,
            next_table: None,
            winning: PrefixTrie::new(),
            resolved: Default::default(),
            igp_parents: Default::default(),
            unresolved: Default::default(),
        }
    }

    pub(crate) fn side(&self, caller: TableId) -> ExtIntSide {
        if self.int_parent == Some(caller) {
            ExtIntSide::Internal
        } else {
            assert_eq!(
                self.ext_parent,
                Some(caller),
                "{}: unknown parent",
                self.name
            );
            ExtIntSide::External
        }
    }

    pub(crate) fn parent_mut(
        &mut self,
        side: ExtIntSide,
    ) -> &mut Option<TableId> {
        match side {
            ExtIntSide::Internal => &mut self.int_parent,
            ExtIntSide::External => &mut self.ext_parent,
        }
    }

    pub(crate) fn replumb(&mut self, old_parent: TableId, new_parent: TableId) {
        if self.int_parent == Some(old_parent) {
            self.int_parent = Some(new_parent);
        } else {
            assert_eq!(
                self.ext_parent,
                Some(old_parent),
                "{}: replumb from unknown parent",
                self.name
            );
            self.ext_parent = Some(new_parent);
        }
    }

    // ----- propagated routes -----

    pub(crate) fn set_winner(&mut self, route: Arc<RouteEntry<V>>) {
        self.winning.remove(&route.net);
        self.winning.insert(route.net, route);
    }

    pub(crate) fn clear_winner(
        &mut self,
        net: &V::IpNetwork,
    ) -> Option<Arc<RouteEntry<V>>> {
        self.winning.remove(net)
    }

    pub fn route_count(&self) -> usize {
        self.winning.len()
    }

    // ----- next-hop resolution -----

    pub fn is_resolved(&self, net: &V::IpNetwork) -> bool {
        self.resolved.contains_key(net)
    }

    pub fn is_unresolved(&self, net: &V::IpNetwork) -> bool {
        self.unresolved.contains_key(net)
    }

    pub fn resolved_route(
        &self,
        net: &V::IpNetwork,
    ) -> Option<&ResolvedRoute<V>> {
        self.resolved.get(net)
    }

    pub fn unresolved_count(&self) -> usize {
        self.unresolved.len()
    }

    // Records that `egp_route` resolved through `igp_route`, returning the
    // route to propagate.
    //
    // Next-hops on a connected subnet are already usable as they are.
    pub(crate) fn resolve(
        &mut self,
        egp_route: Arc<RouteEntry<V>>,
        igp_route: &RouteEntry<V>,
    ) -> Arc<RouteEntry<V>> {
        Debug::<V>::NexthopResolved(&egp_route.net, &igp_route.net).log();

        let route = if igp_route.protocol == Protocol::DIRECT {
            egp_route.clone()
        } else {
            let mut route = (*egp_route).clone();
            route.nexthop = igp_route.nexthop;
            route.ifname = igp_route.ifname.clone();
            route.vifname = igp_route.vifname.clone();
            Arc::new(route)
        };

        self.igp_parents
            .entry(igp_route.net)
            .or_default()
            .insert(egp_route.net);
        let resolved = ResolvedRoute {
            egp_route,
            igp_net: igp_route.net,
            route: route.clone(),
        };
        self.resolved.insert(resolved.egp_route.net, resolved);
        route
    }

    pub(crate) fn take_resolved(
        &mut self,
        net: &V::IpNetwork,
    ) -> Option<ResolvedRoute<V>> {
        let resolved = self.resolved.remove(net)?;
        if let Some(nets) = self.igp_parents.get_mut(&resolved.igp_net) {
            nets.remove(net);
            if nets.is_empty() {
                self.igp_parents.remove(&resolved.igp_net);
            }
        }
        Some(resolved)
    }

    // EGP networks resolved through the given IGP network.
    pub(crate) fn resolved_by(
        &self,
        igp_net: &V::IpNetwork,
    ) -> Vec<V::IpNetwork> {
        self.igp_parents
            .get(igp_net)
            .map(|nets| nets.iter().copied().collect())
            .unwrap_or_default()
    }

    // EGP networks whose next-hop `net` covers more specifically than the
    // IGP network they currently resolve through.
    pub(crate) fn resolved_less_specific(
        &self,
        net: &V::IpNetwork,
    ) -> Vec<V::IpNetwork> {
        self.resolved
            .values()
            .filter(|resolved| {
                resolved.igp_net.prefix() < net.prefix()
                    && net.contains(resolved.egp_route.nexthop)
            })
            .map(|resolved| resolved.egp_route.net)
            .collect()
    }

    pub(crate) fn add_unresolved(&mut self, route: Arc<RouteEntry<V>>) {
        Debug::<V>::NexthopUnresolved(&route.net, &route.nexthop).log();
        self.unresolved.insert(route.net, route);
    }

    pub(crate) fn take_unresolved(
        &mut self,
        net: &V::IpNetwork,
    ) -> Option<Arc<RouteEntry<V>>> {
        self.unresolved.remove(net)
    }

    // Removes the EGP routes waiting for a next-hop inside `net`.
    pub(crate) fn take_unresolved_covered(
        &mut self,
        net: &V::IpNetwork,
    ) -> Vec<Arc<RouteEntry<V>>> {
        let nets = self
            .unresolved
            .values()
            .filter(|route| net.contains(route.nexthop))
            .map(|route| route.net)
            .collect::<Vec<_>>();
        nets.iter()
            .filter_map(|net| self.unresolved.remove(net))
            .collect()
    }

    // Stores the new policy tags of an EGP route. Returns the route to
    // propagate when the EGP route is resolved.
    pub(crate) fn replace_egp_route(
        &mut self,
        route: &Arc<RouteEntry<V>>,
    ) -> Option<Arc<RouteEntry<V>>> {
        if let Some(unresolved) = self.unresolved.get_mut(&route.net) {
            *unresolved = route.clone();
            return None;
        }
        let resolved = self.resolved.get_mut(&route.net)?;
        let mut propagated = (*resolved.route).clone();
        propagated.policytags = route.policytags.clone();
        resolved.egp_route = route.clone();
        resolved.route = Arc::new(propagated);
        Some(resolved.route.clone())
    }

    // ----- lookups -----

    pub(crate) fn lookup_route(
        &self,
        net: &V::IpNetwork,
    ) -> Option<&Arc<RouteEntry<V>>> {
        self.winning.lookup_node(net)
    }

    pub(crate) fn lookup_route_addr(
        &self,
        addr: V::IpAddr,
    ) -> Option<&Arc<RouteEntry<V>>> {
        self.winning.find(addr).map(|(_, route)| route)
    }

    pub(crate) fn lookup_route_range(&self, addr: V::IpAddr) -> RouteRange<V> {
        let route = self.lookup_route_addr(addr).cloned();
        let (bottom, top) = self.winning.find_bounds(addr);
        RouteRange::new(addr, route, bottom, top)
    }
}

// ===== unit tests =====
