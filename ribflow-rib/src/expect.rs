//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::VecDeque;

use ribflow_utils::policy::PolicyTags;

use crate::route::RouteEntry;
use crate::table::TableId;
use crate::version::Version;

// Diagnostic stage recording the updates it sees and checking them against
// a queue of expected updates.
#[derive(Debug)]
pub struct ExpectTable<V: Version> {
    pub name: String,
    pub parent: Option<TableId>,
    pub next_table: Option<TableId>,
    expected: VecDeque<RouteEvent<V>>,
    events: Vec<RouteEvent<V>>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RouteEvent<V: Version> {
    Add(RouteEntry<V>),
    Delete(RouteEntry<V>),
    ReplacePolicyTags(RouteEntry<V>, PolicyTags),
}

// ===== impl ExpectTable =====

impl<V> ExpectTable<V>
where
    V: Version,
{
    pub(crate) fn new(name: String) -> ExpectTable<V> {
        ExpectTable {
            name,
            parent: None,
            next_table: None,
            expected: Default::default(),
            events: Default::default(),
        }
    }

    pub fn expect_add(&mut self, route: RouteEntry<V>) {
        self.expected.push_back(RouteEvent::Add(route));
    }

    pub fn expect_delete(&mut self, route: RouteEntry<V>) {
        self.expected.push_back(RouteEvent::Delete(route));
    }

    pub fn expect_replace_policytags(
        &mut self,
        route: RouteEntry<V>,
        prevtags: PolicyTags,
    ) {
        self.expected
            .push_back(RouteEvent::ReplacePolicyTags(route, prevtags));
    }

    // Returns whether every expected update was observed.
    pub fn expected_done(&self) -> bool {
        self.expected.is_empty()
    }

    pub fn events(&self) -> &[RouteEvent<V>] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<RouteEvent<V>> {
        std::mem::take(&mut self.events)
    }

    // Records an update. Once expectations are queued, any update other than
    // the next expected one is fatal.
    pub(crate) fn observe(&mut self, event: RouteEvent<V>) {
        if let Some(expected) = self.expected.pop_front() {
            assert_eq!(
                expected, event,
                "{}: unexpected route update",
                self.name
            );
        }
        self.events.push(event);
    }
}

// ===== impl RouteEvent =====

impl<V> RouteEvent<V>
where
    V: Version,
{
    pub fn route(&self) -> &RouteEntry<V> {
        match self {
            RouteEvent::Add(route)
            | RouteEvent::Delete(route)
            | RouteEvent::ReplacePolicyTags(route, _) => route,
        }
    }

    pub fn is_add(&self) -> bool {
        matches!(self, RouteEvent::Add(..))
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, RouteEvent::Delete(..))
    }
}
