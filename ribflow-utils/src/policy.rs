//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::protocol::Protocol;

// Set of opaque tags attached to a route by the policy engine.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(transparent)]
pub struct PolicyTags(BTreeSet<u32>);

// Maps redistribution target protocols to the policy tags they are
// interested in.
#[derive(Clone, Debug, Default)]
#[derive(Deserialize, Serialize)]
pub struct PolicyRedistMap(BTreeMap<Protocol, PolicyTags>);

// ===== impl PolicyTags =====

impl PolicyTags {
    pub fn new() -> PolicyTags {
        PolicyTags::default()
    }

    pub fn insert(&mut self, tag: u32) -> bool {
        self.0.insert(tag)
    }

    pub fn contains(&self, tag: u32) -> bool {
        self.0.contains(&tag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &u32> {
        self.0.iter()
    }

    // Returns true if both sets share at least one tag.
    pub fn contains_atleast_one(&self, other: &PolicyTags) -> bool {
        !self.0.is_disjoint(&other.0)
    }
}

impl FromIterator<u32> for PolicyTags {
    fn from_iter<T: IntoIterator<Item = u32>>(iter: T) -> Self {
        PolicyTags(iter.into_iter().collect())
    }
}

impl From<BTreeSet<u32>> for PolicyTags {
    fn from(tags: BTreeSet<u32>) -> PolicyTags {
        PolicyTags(tags)
    }
}

impl std::fmt::Display for PolicyTags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, tag) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{tag}")?;
        }
        write!(f, "}}")
    }
}

// ===== impl PolicyRedistMap =====

impl PolicyRedistMap {
    // Sets the tags a protocol is interested in, replacing any previous set.
    pub fn insert(&mut self, protocol: Protocol, tags: PolicyTags) {
        self.0.insert(protocol, tags);
    }

    pub fn remove(&mut self, protocol: Protocol) -> Option<PolicyTags> {
        self.0.remove(&protocol)
    }

    pub fn reset(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    // Returns the protocols interested in at least one of the given tags.
    pub fn get_protocols(&self, tags: &PolicyTags) -> BTreeSet<Protocol> {
        self.0
            .iter()
            .filter(|(_, ptags)| ptags.contains_atleast_one(tags))
            .map(|(protocol, _)| *protocol)
            .collect()
    }
}

// ===== unit tests =====
