//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use derive_new::new;

use crate::route::RouteEntry;
use crate::table::TableId;
use crate::version::Version;

// Stage joining two upstream chains. For each network only the route with
// the lowest administrative distance is propagated; ties go to `table_a`.
#[derive(Debug, new)]
pub struct MergedTable {
    pub name: String,
    pub table_a: TableId,
    pub table_b: TableId,
    pub next_table: Option<TableId>,
}

// ===== impl MergedTable =====

impl MergedTable {
    // Returns the parent opposite to `caller` and whether `caller` is
    // `table_a`.
    pub(crate) fn other_parent(&self, caller: TableId) -> (TableId, bool) {
        if caller == self.table_a {
            (self.table_b, true)
        } else {
            assert_eq!(caller, self.table_b, "{}: unknown parent", self.name);
            (self.table_a, false)
        }
    }

    pub(crate) fn replumb(&mut self, old_parent: TableId, new_parent: TableId) {
        if self.table_a == old_parent {
            self.table_a = new_parent;
        } else {
            assert_eq!(
                self.table_b, old_parent,
                "{}: replumb from unknown parent",
                self.name
            );
            self.table_b = new_parent;
        }
    }

    // Returns whether `route`, coming from the `route_from_a` side, beats
    // `other` coming from the opposite side.
    pub(crate) fn prefers<V: Version>(
        route: &RouteEntry<V>,
        route_from_a: bool,
        other: &RouteEntry<V>,
    ) -> bool {
        match route.admin_distance.cmp(&other.admin_distance) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Greater => false,
            std::cmp::Ordering::Equal => route_from_a,
        }
    }
}
