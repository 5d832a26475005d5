//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use ribflow_utils::policy::PolicyTags;

use crate::debug::Debug;
use crate::route::RouteEntry;
use crate::table::TableId;
use crate::version::Version;

// Pass-through stage logging every update it sees.
#[derive(Debug)]
pub struct LogTable {
    pub name: String,
    pub parent: Option<TableId>,
    pub next_table: Option<TableId>,
    pub update_number: u64,
}

// ===== impl LogTable =====

impl LogTable {
    pub(crate) fn new(name: String) -> LogTable {
        LogTable {
            name,
            parent: None,
            next_table: None,
            update_number: 0,
        }
    }

    pub(crate) fn add_route<V: Version>(&mut self, route: &RouteEntry<V>) {
        self.log(route, "add");
    }

    pub(crate) fn delete_route<V: Version>(&mut self, route: &RouteEntry<V>) {
        self.log(route, "delete");
    }

    pub(crate) fn replace_policytags<V: Version>(
        &mut self,
        route: &RouteEntry<V>,
        _prevtags: &PolicyTags,
    ) {
        self.log(route, "replace-policytags");
    }

    fn log<V: Version>(&mut self, route: &RouteEntry<V>, op: &str) {
        Debug::<V>::LogUpdate(&self.name, self.update_number, op, route).log();
        self.update_number += 1;
    }
}
