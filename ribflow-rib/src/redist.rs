//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::ops::Bound;

use generational_arena::{Arena, Index};
use ribflow_utils::UnboundedSender;
use ribflow_utils::ip::IpNetworkKind;

use crate::debug::Debug;
use crate::output::RedistOutput;
use crate::policy::RoutePolicy;
use crate::route::RouteEntry;
use crate::table::TableId;
use crate::tasks;
use crate::tasks::messages::RibMsg;
use crate::version::Version;

pub type RedistributorId = Index;

// Network ordered by prefix length first, then by address.
pub struct IndexKey<V: Version>(pub V::IpNetwork);

// Ordered set of the networks currently live at a redistribution table.
#[derive(Debug)]
pub struct RouteIndex<V: Version>(BTreeSet<IndexKey<V>>);

// Stage that tracks live networks and fans route events out to its
// redistributors.
#[derive(Debug)]
pub struct RedistTable<V: Version> {
    pub name: String,
    pub parent: Option<TableId>,
    pub next_table: Option<TableId>,
    pub index: RouteIndex<V>,
    pub redistributors: Vec<RedistributorId>,
}

// Per-output controller. Dumps the routes already present at its table, one
// per scheduler turn, then relays live events.
pub struct Redistributor<V: Version> {
    pub id: RedistributorId,
    pub name: String,
    pub table_id: TableId,
    output: Box<dyn RedistOutput<V>>,
    policy: Option<Box<dyn RoutePolicy<V>>>,
    dumping: bool,
    blocked: bool,
    // Last network visited by the dump. `None` means the dump hasn't
    // visited any network yet.
    last_net: Option<V::IpNetwork>,
    dump_seqno: u64,
    dump_pending: Option<u64>,
    msg_tx: UnboundedSender<RibMsg>,
}

// ===== impl IndexKey =====

impl<V> Clone for IndexKey<V>
where
    V: Version,
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for IndexKey<V> where V: Version {}

impl<V> PartialEq for IndexKey<V>
where
    V: Version,
{
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<V> Eq for IndexKey<V> where V: Version {}

impl<V> PartialOrd for IndexKey<V>
where
    V: Version,
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<V> Ord for IndexKey<V>
where
    V: Version,
{
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .prefix()
            .cmp(&other.0.prefix())
            .then_with(|| self.0.ip().cmp(&other.0.ip()))
    }
}

impl<V> std::fmt::Debug for IndexKey<V>
where
    V: Version,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ===== impl RouteIndex =====

impl<V> RouteIndex<V>
where
    V: Version,
{
    pub fn insert(&mut self, net: V::IpNetwork) -> bool {
        self.0.insert(IndexKey(net))
    }

    pub fn remove(&mut self, net: &V::IpNetwork) -> bool {
        self.0.remove(&IndexKey(*net))
    }

    pub fn contains(&self, net: &V::IpNetwork) -> bool {
        self.0.contains(&IndexKey(*net))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    // Returns the network following `net`, or the first one when `net` is
    // `None`.
    pub fn next_after(
        &self,
        net: Option<&V::IpNetwork>,
    ) -> Option<V::IpNetwork> {
        match net {
            Some(net) => self
                .0
                .range((Bound::Excluded(IndexKey(*net)), Bound::Unbounded))
                .next(),
            None => self.0.first(),
        }
        .map(|key| key.0)
    }

    // Returns the network preceding `net`.
    pub fn prev_before(&self, net: &V::IpNetwork) -> Option<V::IpNetwork> {
        self.0
            .range((Bound::Unbounded, Bound::Excluded(IndexKey(*net))))
            .next_back()
            .map(|key| key.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &V::IpNetwork> {
        self.0.iter().map(|key| &key.0)
    }
}

impl<V> Default for RouteIndex<V>
where
    V: Version,
{
    fn default() -> Self {
        RouteIndex(Default::default())
    }
}

// ===== impl RedistTable =====

impl<V> RedistTable<V>
where
    V: Version,
{
    pub(crate) fn new(name: String) -> RedistTable<V> {
        RedistTable {
            name,
            parent: None,
            next_table: None,
            index: Default::default(),
            redistributors: Default::default(),
        }
    }

    pub(crate) fn add_route(
        &mut self,
        route: &RouteEntry<V>,
        redistributors: &mut Arena<Redistributor<V>>,
    ) {
        assert!(
            self.index.insert(route.net),
            "{}: route {} already indexed",
            self.name,
            route.net
        );

        for redist_id in &self.redistributors {
            if let Some(redist) = redistributors.get_mut(*redist_id) {
                redist.did_add(route);
            }
        }
    }

    pub(crate) fn delete_route(
        &mut self,
        route: &RouteEntry<V>,
        redistributors: &mut Arena<Redistributor<V>>,
    ) {
        for redist_id in &self.redistributors {
            if let Some(redist) = redistributors.get_mut(*redist_id) {
                redist.will_delete(route, &self.index);
            }
        }

        assert!(
            self.index.remove(&route.net),
            "{}: route {} not indexed",
            self.name,
            route.net
        );

        for redist_id in &self.redistributors {
            if let Some(redist) = redistributors.get_mut(*redist_id) {
                redist.did_delete(route);
            }
        }
    }
}

// ===== impl Redistributor =====

impl<V> Redistributor<V>
where
    V: Version,
{
    pub(crate) fn new(
        id: RedistributorId,
        name: String,
        table_id: TableId,
        output: Box<dyn RedistOutput<V>>,
        policy: Option<Box<dyn RoutePolicy<V>>>,
        msg_tx: UnboundedSender<RibMsg>,
    ) -> Redistributor<V> {
        Redistributor {
            id,
            name,
            table_id,
            output,
            policy,
            dumping: false,
            blocked: false,
            last_net: None,
            dump_seqno: 0,
            dump_pending: None,
            msg_tx,
        }
    }

    pub fn is_dumping(&self) -> bool {
        self.dumping
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn last_net(&self) -> Option<&V::IpNetwork> {
        self.last_net.as_ref()
    }

    pub fn output_mut(&mut self) -> &mut dyn RedistOutput<V> {
        self.output.as_mut()
    }

    fn policy_accepts(&self, route: &RouteEntry<V>) -> bool {
        self.policy
            .as_ref()
            .is_none_or(|policy| policy.accept(route))
    }

    // Returns whether `net` sorts after the current dump position.
    fn not_yet_dumped(&self, net: &V::IpNetwork) -> bool {
        match &self.last_net {
            Some(last_net) => IndexKey::<V>(*net) > IndexKey(*last_net),
            None => true,
        }
    }

    pub(crate) fn start_dump(&mut self) {
        Debug::<V>::DumpStart(&self.name).log();

        self.dumping = true;
        self.last_net = None;
        self.output.starting_route_dump();
        self.schedule_dump_step();
    }

    pub(crate) fn finish_dump(&mut self) {
        Debug::<V>::DumpFinish(&self.name).log();

        self.dumping = false;
        self.last_net = None;
        self.dump_pending = None;
        self.output.finishing_route_dump();
    }

    fn schedule_dump_step(&mut self) {
        if self.blocked {
            return;
        }

        self.dump_seqno += 1;
        self.dump_pending = Some(self.dump_seqno);
        tasks::redist_dump_step(self.id, self.dump_seqno, &self.msg_tx);
    }

    // Claims a scheduled dump step. Steps cancelled in the meantime are
    // rejected.
    pub(crate) fn take_dump_step(&mut self, seqno: u64) -> bool {
        if !self.dumping || self.dump_pending != Some(seqno) {
            return false;
        }
        self.dump_pending = None;
        true
    }

    // Announces the next network of the dump.
    pub(crate) fn dump_route(&mut self, route: &RouteEntry<V>) {
        if self.policy_accepts(route) {
            self.output.add_route(route);
        }
        self.last_net = Some(route.net);
        self.schedule_dump_step();
    }

    pub(crate) fn did_add(&mut self, route: &RouteEntry<V>) {
        if !self.policy_accepts(route) {
            return;
        }

        // The dump will get to this route.
        if self.dumping && self.not_yet_dumped(&route.net) {
            return;
        }

        self.output.add_route(route);
    }

    pub(crate) fn will_delete(
        &mut self,
        route: &RouteEntry<V>,
        index: &RouteIndex<V>,
    ) {
        if !self.dumping || self.last_net != Some(route.net) {
            return;
        }

        // The dump position is going away: step back to the previous
        // network so the next step resumes from a network still indexed.
        self.last_net = index.prev_before(&route.net);

        if self.policy_accepts(route) {
            self.output.delete_route(route);
        }
    }

    pub(crate) fn did_delete(&mut self, route: &RouteEntry<V>) {
        // Routes not visited yet were never announced.
        if self.dumping && self.not_yet_dumped(&route.net) {
            return;
        }

        if self.policy_accepts(route) {
            self.output.delete_route(route);
        }
    }

    pub(crate) fn high_water(&mut self) {
        Debug::<V>::OutputHighWater(&self.name).log();

        self.blocked = true;
        self.dump_pending = None;
    }

    pub(crate) fn low_water(&mut self) {
        Debug::<V>::OutputLowWater(&self.name).log();

        self.blocked = false;
        if self.dumping && self.dump_pending.is_none() {
            self.schedule_dump_step();
        }
    }
}

// ===== unit tests =====
