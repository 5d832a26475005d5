//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use prefix_trie::map::PrefixMap;
use ribflow_utils::ip::{IpAddrKind, IpNetworkKind};

use crate::version::Version;

// Longest-prefix-match container keyed by IP prefix.
//
// Prefixes are always stored with their host bits cleared.
pub struct PrefixTrie<V: Version, T> {
    map: PrefixMap<V::IpNetwork, T>,
    count: usize,
}

// ===== impl PrefixTrie =====

impl<V, T> PrefixTrie<V, T>
where
    V: Version,
{
    pub fn new() -> Self {
        PrefixTrie {
            map: PrefixMap::new(),
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    // Inserts a new entry.
    //
    // The prefix must not be present already.
    pub fn insert(&mut self, prefix: V::IpNetwork, value: T) {
        let prefix = prefix.apply_mask();
        let old = self.map.insert(prefix, value);
        assert!(old.is_none(), "duplicate trie entry for {prefix}");
        self.count += 1;
    }

    // Removes an existing entry, returning its value.
    //
    // Removing a prefix that isn't present is a bug.
    pub fn erase(&mut self, prefix: &V::IpNetwork) -> T {
        let prefix = prefix.apply_mask();
        match self.map.remove(&prefix) {
            Some(value) => {
                self.count -= 1;
                value
            }
            None => panic!("trie entry for {prefix} not found"),
        }
    }

    // Removes an entry if present.
    pub fn remove(&mut self, prefix: &V::IpNetwork) -> Option<T> {
        let value = self.map.remove(&prefix.apply_mask())?;
        self.count -= 1;
        Some(value)
    }

    // Exact-match lookup.
    pub fn lookup_node(&self, prefix: &V::IpNetwork) -> Option<&T> {
        self.map.get(&prefix.apply_mask())
    }

    pub fn lookup_node_mut(
        &mut self,
        prefix: &V::IpNetwork,
    ) -> Option<&mut T> {
        self.map.get_mut(&prefix.apply_mask())
    }

    pub fn contains(&self, prefix: &V::IpNetwork) -> bool {
        self.lookup_node(prefix).is_some()
    }

    // Longest-prefix-match lookup.
    pub fn find(&self, addr: V::IpAddr) -> Option<(&V::IpNetwork, &T)> {
        self.map.get_lpm(&V::IpNetwork::host(addr))
    }

    // Returns the inclusive address range around `addr` that resolves to the
    // same longest-prefix match, as (bottom, top).
    //
    // When no entry covers `addr`, the range spans the whole address space
    // minus the subtrees of any stored prefixes.
    pub fn find_bounds(&self, addr: V::IpAddr) -> (V::IpAddr, V::IpAddr) {
        let root = match self.find(addr) {
            Some((prefix, _)) => *prefix,
            None => V::IpNetwork::default(V::ADDRESS_FAMILY),
        };
        let mut bottom = root.network();
        let mut top = root.broadcast();

        // Exclude the more specific prefixes nested under the match.
        for (prefix, _) in self.map.children(&root) {
            if *prefix == root {
                continue;
            }
            if prefix.broadcast() < addr {
                if let Some(next) = prefix.broadcast().successor() {
                    bottom = bottom.max(next);
                }
            } else if prefix.network() > addr {
                if let Some(prev) = prefix.network().predecessor() {
                    top = top.min(prev);
                }
            }
        }

        (bottom, top)
    }

    // Removes and returns an arbitrary entry.
    pub fn pop_first(&mut self) -> Option<(V::IpNetwork, T)> {
        let prefix = self.map.iter().next().map(|(prefix, _)| *prefix)?;
        let value = self.erase(&prefix);
        Some((prefix, value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&V::IpNetwork, &T)> {
        self.map.iter()
    }
}

impl<V, T> Default for PrefixTrie<V, T>
where
    V: Version,
{
    fn default() -> Self {
        PrefixTrie::new()
    }
}

impl<V, T> std::fmt::Debug for PrefixTrie<V, T>
where
    V: Version,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefixTrie")
            .field("count", &self.count)
            .finish()
    }
}

// ===== unit tests =====
