//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;

use bitflags::bitflags;
use enum_as_inner::EnumAsInner;
use generational_arena::{Arena, Index};
use itertools::Itertools;
use ribflow_utils::UnboundedSender;
use ribflow_utils::ip::IpAddrKind;
use ribflow_utils::policy::PolicyTags;
use ribflow_utils::protocol::Protocol;

use crate::debug::Debug;
use crate::deletion::DeletionTable;
use crate::error::Error;
use crate::expect::{ExpectTable, RouteEvent};
use crate::extint::{ExtIntSide, ExtIntTable, ResolvedRoute};
use crate::log::LogTable;
use crate::merged::MergedTable;
use crate::origin::OriginTable;
use crate::output::{OutputEvent, RedistEventSender, RedistOutput};
use crate::policy::RoutePolicy;
use crate::policy_redist::{PolicyRedistMsg, PolicyRedistTable};
use crate::redist::{RedistTable, Redistributor, RedistributorId};
use crate::register::{RegisterTable, RouteInvalidateMsg};
use crate::rib::RibTransport;
use crate::route::{RouteEntry, RouteRange};
use crate::tasks;
use crate::tasks::messages::RibMsg;
use crate::version::Version;

pub type TableId = Index;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct TableType: u16 {
        const ORIGIN = 0x01;
        const DELETION = 0x02;
        const MERGED = 0x04;
        const REDIST = 0x08;
        const POLICY_REDIST = 0x10;
        const LOG = 0x20;
        const EXPECT = 0x40;
        const EXT_INT = 0x80;
        const REGISTER = 0x100;
    }
}

// Route table stage.
#[derive(Debug, EnumAsInner)]
pub enum Table<V: Version> {
    Origin(OriginTable<V>),
    Deletion(DeletionTable<V>),
    Merged(MergedTable),
    ExtInt(ExtIntTable<V>),
    Redist(RedistTable<V>),
    PolicyRedist(PolicyRedistTable),
    Log(LogTable),
    Expect(ExpectTable<V>),
    Register(RegisterTable<V>),
}

// Graph of route table stages.
//
// Stages reference each other by identifier. Routes flow downstream along
// `next_table` edges while lookups are delegated upstream to the parents.
pub struct Tables<V: Version> {
    arena: Arena<Table<V>>,
    redistributors: Arena<Redistributor<V>>,
    msg_tx: UnboundedSender<RibMsg>,
}

// ===== impl Table =====

impl<V> Table<V>
where
    V: Version,
{
    pub fn name(&self) -> &str {
        match self {
            Table::Origin(table) => &table.name,
            Table::Deletion(table) => &table.name,
            Table::Merged(table) => &table.name,
            Table::ExtInt(table) => &table.name,
            Table::Redist(table) => &table.name,
            Table::PolicyRedist(table) => &table.name,
            Table::Log(table) => &table.name,
            Table::Expect(table) => &table.name,
            Table::Register(table) => &table.name,
        }
    }

    pub fn table_type(&self) -> TableType {
        match self {
            Table::Origin(_) => TableType::ORIGIN,
            Table::Deletion(_) => TableType::DELETION,
            Table::Merged(_) => TableType::MERGED,
            Table::ExtInt(_) => TableType::EXT_INT,
            Table::Redist(_) => TableType::REDIST,
            Table::PolicyRedist(_) => TableType::POLICY_REDIST,
            Table::Log(_) => TableType::LOG,
            Table::Expect(_) => TableType::EXPECT,
            Table::Register(_) => TableType::REGISTER,
        }
    }

    pub fn next_table(&self) -> Option<TableId> {
        match self {
            Table::Origin(table) => table.next_table,
            Table::Deletion(table) => table.next_table,
            Table::Merged(table) => table.next_table,
            Table::ExtInt(table) => table.next_table,
            Table::Redist(table) => table.next_table,
            Table::PolicyRedist(table) => table.next_table,
            Table::Log(table) => table.next_table,
            Table::Expect(table) => table.next_table,
            Table::Register(table) => table.next_table,
        }
    }

    pub(crate) fn set_next_table(&mut self, next_table: Option<TableId>) {
        match self {
            Table::Origin(table) => table.next_table = next_table,
            Table::Deletion(table) => table.next_table = next_table,
            Table::Merged(table) => table.next_table = next_table,
            Table::ExtInt(table) => table.next_table = next_table,
            Table::Redist(table) => table.next_table = next_table,
            Table::PolicyRedist(table) => table.next_table = next_table,
            Table::Log(table) => table.next_table = next_table,
            Table::Expect(table) => table.next_table = next_table,
            Table::Register(table) => table.next_table = next_table,
        }
    }

    // Returns the upstream tables.
    pub fn parents(&self) -> Vec<TableId> {
        match self {
            Table::Origin(_) => vec![],
            Table::Deletion(table) => vec![table.parent],
            Table::Merged(table) => vec![table.table_a, table.table_b],
            Table::ExtInt(table) => [table.int_parent, table.ext_parent]
                .into_iter()
                .flatten()
                .collect(),
            _ => self.single_parent().into_iter().collect(),
        }
    }

    // Parent of a pass-through stage.
    fn single_parent(&self) -> Option<TableId> {
        match self {
            Table::Redist(table) => table.parent,
            Table::PolicyRedist(table) => table.parent,
            Table::Log(table) => table.parent,
            Table::Expect(table) => table.parent,
            Table::Register(table) => table.parent,
            Table::Deletion(table) => Some(table.parent),
            Table::Origin(_) | Table::Merged(_) | Table::ExtInt(_) => None,
        }
    }

    fn single_parent_mut(&mut self) -> &mut Option<TableId> {
        match self {
            Table::Redist(table) => &mut table.parent,
            Table::PolicyRedist(table) => &mut table.parent,
            Table::Log(table) => &mut table.parent,
            Table::Expect(table) => &mut table.parent,
            Table::Register(table) => &mut table.parent,
            _ => {
                panic!("{}: table can't be plumbed after a parent", self.name())
            }
        }
    }

    // Replaces the upstream table `old_parent` by `new_parent`.
    pub(crate) fn replumb(&mut self, old_parent: TableId, new_parent: TableId) {
        match self {
            Table::Origin(table) => {
                panic!("{}: origin table has no parent", table.name);
            }
            Table::Deletion(table) => {
                assert_eq!(
                    table.parent, old_parent,
                    "{}: replumb from unknown parent",
                    table.name
                );
                table.parent = new_parent;
            }
            Table::Merged(table) => table.replumb(old_parent, new_parent),
            Table::ExtInt(table) => table.replumb(old_parent, new_parent),
            _ => {
                let name = self.name().to_owned();
                let parent = self.single_parent_mut();
                assert_eq!(
                    *parent,
                    Some(old_parent),
                    "{name}: replumb from unknown parent"
                );
                *parent = Some(new_parent);
            }
        }
    }
}

// ===== impl Tables =====

impl<V> Tables<V>
where
    V: Version,
{
    pub fn new(msg_tx: UnboundedSender<RibMsg>) -> Tables<V> {
        Tables {
            arena: Arena::new(),
            redistributors: Arena::new(),
            msg_tx,
        }
    }

    pub fn get(&self, id: TableId) -> Option<&Table<V>> {
        self.arena.get(id)
    }

    pub fn get_mut(&mut self, id: TableId) -> Option<&mut Table<V>> {
        self.arena.get_mut(id)
    }

    pub fn table_type(&self, id: TableId) -> Option<TableType> {
        self.arena.get(id).map(|table| table.table_type())
    }

    pub fn iter(&self) -> impl Iterator<Item = (TableId, &Table<V>)> {
        self.arena.iter()
    }

    fn insert(&mut self, table: Table<V>) -> TableId {
        Debug::<V>::TableCreate(table.name(), table.table_type()).log();
        self.arena.insert(table)
    }

    // ----- construction and plumbing -----

    pub fn new_origin_table(
        &mut self,
        name: impl Into<String>,
        protocol: Protocol,
        admin_distance: u32,
    ) -> TableId {
        let table = OriginTable::new(name.into(), protocol, admin_distance);
        self.insert(Table::Origin(table))
    }

    pub fn new_redist_table(
        &mut self,
        name: impl Into<String>,
        parent: Option<TableId>,
    ) -> TableId {
        let id = self.insert(Table::Redist(RedistTable::new(name.into())));
        if let Some(parent) = parent {
            self.plumb_after(parent, id);
        }
        id
    }

    pub fn new_policy_redist_table(
        &mut self,
        name: impl Into<String>,
        parent: Option<TableId>,
        transport: RibTransport,
        redist_tx: Option<UnboundedSender<PolicyRedistMsg>>,
    ) -> TableId {
        let table = PolicyRedistTable::new(name.into(), transport, redist_tx);
        let id = self.insert(Table::PolicyRedist(table));
        if let Some(parent) = parent {
            self.plumb_after(parent, id);
        }
        id
    }

    pub fn new_log_table(
        &mut self,
        name: impl Into<String>,
        parent: TableId,
    ) -> TableId {
        let id = self.insert(Table::Log(LogTable::new(name.into())));
        self.plumb_after(parent, id);
        id
    }

    pub fn new_expect_table(
        &mut self,
        name: impl Into<String>,
        parent: TableId,
    ) -> TableId {
        let id = self.insert(Table::Expect(ExpectTable::new(name.into())));
        self.plumb_after(parent, id);
        id
    }

    // Creates an unplumbed ext-int table. Each side gets connected later
    // with `link_ext_int`.
    pub fn new_ext_int_table(&mut self, name: impl Into<String>) -> TableId {
        self.insert(Table::ExtInt(ExtIntTable::new(name.into())))
    }

    pub fn new_register_table(
        &mut self,
        name: impl Into<String>,
        parent: TableId,
        transport: RibTransport,
        invalidate_tx: Option<UnboundedSender<RouteInvalidateMsg>>,
    ) -> TableId {
        let table = RegisterTable::new(name.into(), transport, invalidate_tx);
        let id = self.insert(Table::Register(table));
        self.plumb_after(parent, id);
        id
    }

    // Joins two chains. `table_a` keeps its downstream tables, which are
    // re-plumbed after the new merged table.
    pub fn new_merged_table(
        &mut self,
        name: impl Into<String>,
        table_a: TableId,
        table_b: TableId,
    ) -> TableId {
        let next = self.arena[table_a].next_table();
        assert!(
            self.arena[table_b].next_table().is_none(),
            "{}: table already plumbed",
            self.arena[table_b].name()
        );

        let table = MergedTable::new(name.into(), table_a, table_b, next);
        let id = self.insert(Table::Merged(table));
        if let Some(next) = next {
            self.arena[next].replumb(table_a, id);
        }
        self.arena[table_a].set_next_table(Some(id));
        self.arena[table_b].set_next_table(Some(id));
        id
    }

    // Splices a pass-through table right after `parent`.
    pub fn plumb_after(&mut self, parent: TableId, id: TableId) {
        let next = self.arena[parent].next_table();
        {
            let table = &mut self.arena[id];
            *table.single_parent_mut() = Some(parent);
            table.set_next_table(next);
        }
        if let Some(next) = next {
            self.arena[next].replumb(parent, id);
        }
        self.arena[parent].set_next_table(Some(id));

        let (table, parent) = (&self.arena[id], &self.arena[parent]);
        Debug::<V>::TablePlumb(table.name(), parent.name()).log();
    }

    // Connects the end of a chain to a stage that has no parent yet.
    pub fn link(&mut self, parent: TableId, id: TableId) {
        assert!(
            self.arena[parent].next_table().is_none(),
            "{}: table already plumbed",
            self.arena[parent].name()
        );
        let table = &mut self.arena[id];
        assert!(
            table.single_parent().is_none(),
            "{}: parent already set",
            table.name()
        );
        *table.single_parent_mut() = Some(parent);
        self.arena[parent].set_next_table(Some(id));

        let (table, parent) = (&self.arena[id], &self.arena[parent]);
        Debug::<V>::TablePlumb(table.name(), parent.name()).log();
    }

    // Connects the end of a chain to one side of an ext-int table.
    pub fn link_ext_int(
        &mut self,
        parent: TableId,
        id: TableId,
        side: ExtIntSide,
    ) {
        assert!(
            self.arena[parent].next_table().is_none(),
            "{}: table already plumbed",
            self.arena[parent].name()
        );
        let table = self.ext_int_mut(id);
        let slot = table.parent_mut(side);
        assert!(slot.is_none(), "{side:?} parent already set");
        *slot = Some(parent);
        self.arena[parent].set_next_table(Some(id));

        let (table, parent) = (&self.arena[id], &self.arena[parent]);
        Debug::<V>::TablePlumb(table.name(), parent.name()).log();
    }

    // Walks upstream (following the first parent) until a table of one of
    // the given types is found.
    pub fn track_back(
        &self,
        mut id: TableId,
        typemask: TableType,
    ) -> Option<TableId> {
        loop {
            let table = self.arena.get(id)?;
            if typemask.contains(table.table_type()) {
                return Some(id);
            }
            id = *table.parents().first()?;
        }
    }

    // Walks downstream until a table of one of the given types is found.
    pub fn track_forward(
        &self,
        mut id: TableId,
        typemask: TableType,
    ) -> Option<TableId> {
        loop {
            let table = self.arena.get(id)?;
            if typemask.contains(table.table_type()) {
                return Some(id);
            }
            id = table.next_table()?;
        }
    }

    // Returns the tables from `id` down to the end of the chain.
    pub fn chain(&self, id: TableId) -> Vec<TableId> {
        let mut chain = vec![];
        let mut next = Some(id);
        while let Some(id) = next {
            chain.push(id);
            next = self.arena.get(id).and_then(|table| table.next_table());
        }
        chain
    }

    // Describes the chain starting at the given table, e.g.
    // "igp-static -> redist-static -> policy-redist -> all".
    pub fn describe_chain(&self, id: TableId) -> String {
        self.chain(id)
            .into_iter()
            .filter_map(|id| self.arena.get(id))
            .map(|table| table.name())
            .join(" -> ")
    }

    fn origin_mut(&mut self, id: TableId) -> &mut OriginTable<V> {
        match &mut self.arena[id] {
            Table::Origin(table) => table,
            table => panic!("{}: not an origin table", table.name()),
        }
    }

    fn ext_int_mut(&mut self, id: TableId) -> &mut ExtIntTable<V> {
        match &mut self.arena[id] {
            Table::ExtInt(table) => table,
            table => panic!("{}: not an ext-int table", table.name()),
        }
    }

    // ----- origin operations -----

    pub fn origin_add_route(
        &mut self,
        id: TableId,
        route: RouteEntry<V>,
    ) -> Result<(), Error> {
        let table = self.origin_mut(id);
        let route = table.add_route(route)?;
        let next = table.next_table;
        self.forward_add_route(next, route, id);
        Ok(())
    }

    pub fn origin_delete_route(
        &mut self,
        id: TableId,
        net: &V::IpNetwork,
    ) -> Result<(), Error> {
        let table = self.origin_mut(id);
        let route = table.delete_route(net)?;
        let next = table.next_table;
        self.forward_delete_route(next, route, id);
        Ok(())
    }

    pub fn origin_replace_policytags(
        &mut self,
        id: TableId,
        net: &V::IpNetwork,
        policytags: PolicyTags,
    ) -> Result<(), Error> {
        let table = self.origin_mut(id);
        let Some((route, prevtags)) =
            table.replace_policytags(net, policytags)?
        else {
            return Ok(());
        };
        if let Some(next) = table.next_table {
            self.replace_policytags(next, route, &prevtags, id);
        }
        Ok(())
    }

    // Moves every route of the origin table into a new deletion table that
    // withdraws them in the background. The origin table keeps accepting
    // routes meanwhile.
    pub fn routing_protocol_shutdown(
        &mut self,
        id: TableId,
    ) -> Option<TableId> {
        let table = self.origin_mut(id);
        Debug::<V>::ProtocolShutdown(table.protocol).log();

        let routes = table.take_routes();
        if routes.is_empty() {
            return None;
        }
        let name = format!("deletion-{}", table.name);
        let next = table.next_table;

        Debug::<V>::DeletionStart(&name, routes.len()).log();
        let table = DeletionTable::new(name, id, next, routes);
        let deletion_id = self.insert(Table::Deletion(table));
        if let Some(next) = next {
            self.arena[next].replumb(id, deletion_id);
        }
        self.arena[id].set_next_table(Some(deletion_id));

        tasks::deletion_pass(deletion_id, &self.msg_tx);
        Some(deletion_id)
    }

    // Withdraws one route held by a deletion table, unplumbing the table
    // once it's empty.
    pub(crate) fn deletion_pass(&mut self, id: TableId) {
        let Some(Table::Deletion(table)) = self.arena.get_mut(id) else {
            return;
        };
        let next = table.next_table;
        match table.pop_route() {
            Some(route) => {
                self.forward_delete_route(next, route, id);
                tasks::deletion_pass(id, &self.msg_tx);
            }
            None => self.unplumb_deletion_table(id),
        }
    }

    fn unplumb_deletion_table(&mut self, id: TableId) {
        let Some(Table::Deletion(table)) = self.arena.remove(id) else {
            return;
        };
        self.arena[table.parent].set_next_table(table.next_table);
        if let Some(next) = table.next_table {
            self.arena[next].replumb(id, table.parent);
        }

        Debug::<V>::DeletionFinish(&table.name).log();
        Debug::<V>::TableUnplumb(&table.name).log();
    }

    // ----- route propagation -----

    fn forward_add_route(
        &mut self,
        next: Option<TableId>,
        route: Arc<RouteEntry<V>>,
        caller: TableId,
    ) {
        if let Some(next) = next {
            self.add_route(next, route, caller);
        }
    }

    fn forward_delete_route(
        &mut self,
        next: Option<TableId>,
        route: Arc<RouteEntry<V>>,
        caller: TableId,
    ) {
        if let Some(next) = next {
            self.delete_route(next, route, caller);
        }
    }

    pub(crate) fn add_route(
        &mut self,
        id: TableId,
        route: Arc<RouteEntry<V>>,
        caller: TableId,
    ) {
        let next = match &mut self.arena[id] {
            Table::Origin(table) => {
                panic!("{}: origin table has no parent", table.name);
            }
            Table::Deletion(table) => {
                debug_assert_eq!(table.parent, caller);
                let next = table.next_table;
                if let Some(old_route) = table.add_route(&route) {
                    self.forward_delete_route(next, old_route, id);
                }
                next
            }
            Table::Merged(table) => {
                let next = table.next_table;
                let (other, from_a) = table.other_parent(caller);
                if let Some(found) = self.lookup_route(other, &route.net) {
                    if !MergedTable::prefers(&route, from_a, &found) {
                        return;
                    }
                    self.forward_delete_route(next, found, id);
                }
                next
            }
            Table::ExtInt(table) => {
                let side = table.side(caller);
                self.ext_int_add_route(id, side, route);
                return;
            }
            Table::Redist(table) => {
                debug_assert_eq!(table.parent, Some(caller));
                table.add_route(&route, &mut self.redistributors);
                table.next_table
            }
            Table::PolicyRedist(table) => {
                table.add_route(&route);
                table.next_table
            }
            Table::Log(table) => {
                table.add_route(&route);
                table.next_table
            }
            Table::Expect(table) => {
                table.observe(RouteEvent::Add((*route).clone()));
                table.next_table
            }
            Table::Register(table) => {
                table.invalidate(&route.net);
                table.next_table
            }
        };
        self.forward_add_route(next, route, id);
    }

    pub(crate) fn delete_route(
        &mut self,
        id: TableId,
        route: Arc<RouteEntry<V>>,
        caller: TableId,
    ) {
        let next = match &mut self.arena[id] {
            Table::Origin(table) => {
                panic!("{}: origin table has no parent", table.name);
            }
            Table::Deletion(table) => {
                debug_assert_eq!(table.parent, caller);
                table.check_delete(&route);
                table.next_table
            }
            Table::Merged(table) => {
                let next = table.next_table;
                let (other, from_a) = table.other_parent(caller);
                let found = self.lookup_route(other, &route.net);
                if let Some(found) = &found {
                    // The deleted route was never propagated.
                    if !MergedTable::prefers(&route, from_a, found) {
                        return;
                    }
                }
                self.forward_delete_route(next, route, id);
                if let Some(found) = found {
                    self.forward_add_route(next, found, id);
                }
                return;
            }
            Table::ExtInt(table) => {
                let side = table.side(caller);
                self.ext_int_delete_route(id, side, &route);
                return;
            }
            Table::Redist(table) => {
                debug_assert_eq!(table.parent, Some(caller));
                table.delete_route(&route, &mut self.redistributors);
                table.next_table
            }
            Table::PolicyRedist(table) => {
                table.delete_route(&route);
                table.next_table
            }
            Table::Log(table) => {
                table.delete_route(&route);
                table.next_table
            }
            Table::Expect(table) => {
                table.observe(RouteEvent::Delete((*route).clone()));
                table.next_table
            }
            Table::Register(table) => {
                table.invalidate(&route.net);
                table.next_table
            }
        };
        self.forward_delete_route(next, route, id);
    }

    pub(crate) fn replace_policytags(
        &mut self,
        id: TableId,
        route: Arc<RouteEntry<V>>,
        prevtags: &PolicyTags,
        caller: TableId,
    ) {
        let next = match &mut self.arena[id] {
            Table::Origin(table) => {
                panic!("{}: origin table has no parent", table.name);
            }
            Table::Merged(table) => {
                let next = table.next_table;
                let (other, from_a) = table.other_parent(caller);
                if let Some(found) = self.lookup_route(other, &route.net) {
                    if !MergedTable::prefers(&route, from_a, &found) {
                        return;
                    }
                }
                next
            }
            Table::ExtInt(table) => {
                let side = table.side(caller);
                self.ext_int_replace_policytags(id, side, route, prevtags);
                return;
            }
            Table::PolicyRedist(table) => {
                table.replace_policytags(&route, prevtags);
                table.next_table
            }
            Table::Log(table) => {
                table.replace_policytags(&route, prevtags);
                table.next_table
            }
            Table::Expect(table) => {
                table.observe(RouteEvent::ReplacePolicyTags(
                    (*route).clone(),
                    prevtags.clone(),
                ));
                table.next_table
            }
            table => table.next_table(),
        };
        if let Some(next) = next {
            self.replace_policytags(next, route, prevtags, id);
        }
    }

    // ----- external/internal resolution -----

    fn ext_int_add_route(
        &mut self,
        id: TableId,
        side: ExtIntSide,
        route: Arc<RouteEntry<V>>,
    ) {
        match side {
            ExtIntSide::Internal => self.ext_int_add_igp_route(id, route),
            ExtIntSide::External => self.ext_int_add_egp_route(id, route),
        }
    }

    fn ext_int_delete_route(
        &mut self,
        id: TableId,
        side: ExtIntSide,
        route: &Arc<RouteEntry<V>>,
    ) {
        match side {
            ExtIntSide::Internal => self.ext_int_delete_igp_route(id, route),
            ExtIntSide::External => self.ext_int_delete_egp_route(id, route),
        }
    }

    fn ext_int_add_igp_route(
        &mut self,
        id: TableId,
        route: Arc<RouteEntry<V>>,
    ) {
        let ext_parent = self.ext_int_mut(id).ext_parent;

        // Same network learned through an EGP.
        let mut announce = true;
        if let Some(egp_route) =
            ext_parent.and_then(|parent| self.lookup_route(parent, &route.net))
        {
            if egp_route.admin_distance < route.admin_distance {
                announce = false;
            } else {
                self.ext_int_demote_egp_route(id, &egp_route.net);
            }
        }
        if announce {
            let table = self.ext_int_mut(id);
            let next = table.next_table;
            table.set_winner(route.clone());
            self.forward_add_route(next, route.clone(), id);
        }

        // EGP routes whose next-hop the new route covers more specifically
        // move over to it.
        let moved = self.ext_int_mut(id).resolved_less_specific(&route.net);
        for net in moved {
            if let Some(resolved) = self.ext_int_withdraw_resolved(id, &net) {
                self.ext_int_add_egp_route(id, resolved.egp_route);
            }
        }

        let covered = self.ext_int_mut(id).take_unresolved_covered(&route.net);
        for egp_route in covered {
            self.ext_int_add_egp_route(id, egp_route);
        }
    }

    fn ext_int_add_egp_route(
        &mut self,
        id: TableId,
        route: Arc<RouteEntry<V>>,
    ) {
        let int_parent = self.ext_int_mut(id).int_parent;

        // Same network learned through an IGP.
        if let Some(igp_route) =
            int_parent.and_then(|parent| self.lookup_route(parent, &route.net))
            && igp_route.admin_distance <= route.admin_distance
        {
            return;
        }

        let igp_route = int_parent
            .and_then(|parent| self.lookup_route_addr(parent, route.nexthop));
        let table = self.ext_int_mut(id);
        let Some(igp_route) = igp_route else {
            table.add_unresolved(route);
            return;
        };
        let next = table.next_table;
        if let Some(old_route) = table.clear_winner(&route.net) {
            self.forward_delete_route(next, old_route, id);
        }

        let table = self.ext_int_mut(id);
        let route = table.resolve(route, &igp_route);
        table.set_winner(route.clone());
        self.forward_add_route(next, route, id);
    }

    fn ext_int_delete_igp_route(
        &mut self,
        id: TableId,
        route: &Arc<RouteEntry<V>>,
    ) {
        // Withdraw the EGP routes resolved through the deleted route.
        let nets = self.ext_int_mut(id).resolved_by(&route.net);
        let egp_routes = nets
            .iter()
            .filter_map(|net| self.ext_int_withdraw_resolved(id, net))
            .map(|resolved| resolved.egp_route)
            .collect::<Vec<_>>();

        let table = self.ext_int_mut(id);
        let next = table.next_table;
        if !table.is_resolved(&route.net)
            && let Some(old_route) = table.clear_winner(&route.net)
        {
            self.forward_delete_route(next, old_route, id);
        }

        // Resolve them again through whatever is left.
        for egp_route in egp_routes {
            self.ext_int_add_egp_route(id, egp_route);
        }

        // An EGP route shadowed by the deleted route gets its turn.
        let table = self.ext_int_mut(id);
        let ext_parent = table.ext_parent;
        if table.is_resolved(&route.net) || table.is_unresolved(&route.net) {
            return;
        }
        if let Some(egp_route) =
            ext_parent.and_then(|parent| self.lookup_route(parent, &route.net))
        {
            self.ext_int_add_egp_route(id, egp_route);
        }
    }

    fn ext_int_delete_egp_route(
        &mut self,
        id: TableId,
        route: &Arc<RouteEntry<V>>,
    ) {
        let table = self.ext_int_mut(id);
        if table.take_unresolved(&route.net).is_some() {
            return;
        }
        let int_parent = table.int_parent;
        if self.ext_int_withdraw_resolved(id, &route.net).is_none() {
            return;
        }

        // An IGP route for the same network takes over.
        if let Some(igp_route) =
            int_parent.and_then(|parent| self.lookup_route(parent, &route.net))
        {
            let table = self.ext_int_mut(id);
            let next = table.next_table;
            table.set_winner(igp_route.clone());
            self.forward_add_route(next, igp_route, id);
        }
    }

    fn ext_int_replace_policytags(
        &mut self,
        id: TableId,
        side: ExtIntSide,
        route: Arc<RouteEntry<V>>,
        prevtags: &PolicyTags,
    ) {
        let table = self.ext_int_mut(id);
        let next = table.next_table;
        let route = match side {
            ExtIntSide::Internal => {
                if table.is_resolved(&route.net)
                    || table.lookup_route(&route.net).is_none()
                {
                    return;
                }
                route
            }
            ExtIntSide::External => {
                let Some(route) = table.replace_egp_route(&route) else {
                    return;
                };
                route
            }
        };
        table.set_winner(route.clone());
        if let Some(next) = next {
            self.replace_policytags(next, route, prevtags, id);
        }
    }

    // Withdraws a resolved EGP route from downstream.
    fn ext_int_withdraw_resolved(
        &mut self,
        id: TableId,
        net: &V::IpNetwork,
    ) -> Option<ResolvedRoute<V>> {
        let table = self.ext_int_mut(id);
        let resolved = table.take_resolved(net)?;
        table.clear_winner(net);
        let next = table.next_table;
        self.forward_delete_route(next, resolved.route.clone(), id);
        Some(resolved)
    }

    // Stops propagating an EGP route that lost to an IGP route.
    fn ext_int_demote_egp_route(&mut self, id: TableId, net: &V::IpNetwork) {
        if self.ext_int_withdraw_resolved(id, net).is_none() {
            self.ext_int_mut(id).take_unresolved(net);
        }
    }

    // ----- lookups -----

    // Exact-match lookup as seen from the given table.
    pub fn lookup_route(
        &self,
        id: TableId,
        net: &V::IpNetwork,
    ) -> Option<Arc<RouteEntry<V>>> {
        match &self.arena[id] {
            Table::Origin(table) => table.lookup_route(net).cloned(),
            Table::Deletion(table) => self
                .lookup_route(table.parent, net)
                .or_else(|| table.lookup_route(net).cloned()),
            Table::Merged(table) => {
                let a = self.lookup_route(table.table_a, net);
                let b = self.lookup_route(table.table_b, net);
                match (a, b) {
                    (Some(a), Some(b)) => {
                        if b.admin_distance < a.admin_distance {
                            Some(b)
                        } else {
                            Some(a)
                        }
                    }
                    (a, b) => a.or(b),
                }
            }
            Table::ExtInt(table) => table.lookup_route(net).cloned(),
            table => table
                .single_parent()
                .and_then(|parent| self.lookup_route(parent, net)),
        }
    }

    // Longest-prefix-match lookup as seen from the given table.
    pub fn lookup_route_addr(
        &self,
        id: TableId,
        addr: V::IpAddr,
    ) -> Option<Arc<RouteEntry<V>>> {
        match &self.arena[id] {
            Table::Origin(table) => table.lookup_route_addr(addr).cloned(),
            Table::Deletion(table) => best_match(
                self.lookup_route_addr(table.parent, addr),
                table.lookup_route_addr(addr).cloned(),
            ),
            Table::Merged(table) => best_match(
                self.lookup_route_addr(table.table_a, addr),
                self.lookup_route_addr(table.table_b, addr),
            ),
            Table::ExtInt(table) => table.lookup_route_addr(addr).cloned(),
            table => table
                .single_parent()
                .and_then(|parent| self.lookup_route_addr(parent, addr)),
        }
    }

    // Route range lookup as seen from the given table.
    pub fn lookup_route_range(
        &self,
        id: TableId,
        addr: V::IpAddr,
    ) -> RouteRange<V> {
        match &self.arena[id] {
            Table::Origin(table) => table.lookup_route_range(addr),
            Table::Deletion(table) => {
                let mut rr = table.lookup_route_range(addr);
                rr.merge(&self.lookup_route_range(table.parent, addr));
                rr
            }
            Table::Merged(table) => {
                let mut rr = self.lookup_route_range(table.table_a, addr);
                rr.merge(&self.lookup_route_range(table.table_b, addr));
                rr
            }
            Table::ExtInt(table) => table.lookup_route_range(addr),
            table => match table.single_parent() {
                Some(parent) => self.lookup_route_range(parent, addr),
                None => RouteRange::new(
                    addr,
                    None,
                    V::IpAddr::MIN,
                    V::IpAddr::MAX,
                ),
            },
        }
    }

    // ----- redistributors -----

    // Attaches a new redistributor to a redistribution table and starts
    // dumping the routes already present there.
    pub fn add_redistributor<F>(
        &mut self,
        table_id: TableId,
        name: impl Into<String>,
        policy: Option<Box<dyn RoutePolicy<V>>>,
        output_fn: F,
    ) -> RedistributorId
    where
        F: FnOnce(RedistEventSender) -> Box<dyn RedistOutput<V>>,
    {
        let name = name.into();
        let msg_tx = self.msg_tx.clone();
        let table = match &mut self.arena[table_id] {
            Table::Redist(table) => table,
            table => panic!("{}: not a redistribution table", table.name()),
        };
        let redist_id = self.redistributors.insert_with(|redist_id| {
            let events = RedistEventSender::new(redist_id, msg_tx.clone());
            let output = output_fn(events);
            Redistributor::new(
                redist_id, name, table_id, output, policy, msg_tx,
            )
        });
        table.redistributors.push(redist_id);

        let redist = &mut self.redistributors[redist_id];
        Debug::<V>::RedistributorAttach(&redist.name, &table.name).log();
        redist.start_dump();
        redist_id
    }

    pub fn remove_redistributor(
        &mut self,
        redist_id: RedistributorId,
    ) -> Option<Redistributor<V>> {
        let redist = self.redistributors.remove(redist_id)?;
        if let Some(Table::Redist(table)) =
            self.arena.get_mut(redist.table_id)
        {
            table.redistributors.retain(|id| *id != redist_id);
            Debug::<V>::RedistributorDetach(&redist.name, &table.name).log();
        }
        Some(redist)
    }

    pub fn find_redistributor(
        &self,
        table_id: TableId,
        name: &str,
    ) -> Option<RedistributorId> {
        let Some(Table::Redist(table)) = self.arena.get(table_id) else {
            return None;
        };
        table.redistributors.iter().copied().find(|redist_id| {
            self.redistributors
                .get(*redist_id)
                .is_some_and(|redist| redist.name == name)
        })
    }

    pub fn redistributor(
        &self,
        redist_id: RedistributorId,
    ) -> Option<&Redistributor<V>> {
        self.redistributors.get(redist_id)
    }

    pub fn redistributor_mut(
        &mut self,
        redist_id: RedistributorId,
    ) -> Option<&mut Redistributor<V>> {
        self.redistributors.get_mut(redist_id)
    }

    // Announces the next network of an ongoing route dump.
    pub(crate) fn redist_dump_step(
        &mut self,
        redist_id: RedistributorId,
        seqno: u64,
    ) {
        let Some(redist) = self.redistributors.get_mut(redist_id) else {
            return;
        };
        if !redist.take_dump_step(seqno) {
            return;
        }
        let table_id = redist.table_id;
        let last_net = redist.last_net().copied();

        let Some(Table::Redist(table)) = self.arena.get(table_id) else {
            return;
        };
        let next_net = table.index.next_after(last_net.as_ref());
        match next_net {
            Some(net) => {
                let route = self.lookup_route(table_id, &net);
                let Some(route) = route else {
                    panic!("{}: indexed route {} not found", table.name, net);
                };
                self.redistributors[redist_id].dump_route(&route);
            }
            None => self.redistributors[redist_id].finish_dump(),
        }
    }

    pub(crate) fn redist_output_event(
        &mut self,
        redist_id: RedistributorId,
        event: OutputEvent,
    ) {
        let Some(redist) = self.redistributors.get_mut(redist_id) else {
            return;
        };
        match event {
            OutputEvent::HighWater => redist.high_water(),
            OutputEvent::LowWater => redist.low_water(),
            OutputEvent::FatalError(error) => {
                error.log(&redist.name);
                self.remove_redistributor(redist_id);
            }
            event => redist.output_mut().process_event(event),
        }
    }

    // ----- scheduler -----

    pub fn process_msg(&mut self, msg: RibMsg) {
        match msg {
            RibMsg::DeletionPass(msg) => {
                self.deletion_pass(msg.table_id);
            }
            RibMsg::RedistDumpStep(msg) => {
                self.redist_dump_step(msg.redist_id, msg.seqno);
            }
            RibMsg::RedistOutputEvent(msg) => {
                self.redist_output_event(msg.redist_id, msg.event);
            }
        }
    }
}

// ===== helper functions =====

// Picks the more specific route, then the one with the lower administrative
// distance, then the first one.
fn best_match<V: Version>(
    a: Option<Arc<RouteEntry<V>>>,
    b: Option<Arc<RouteEntry<V>>>,
) -> Option<Arc<RouteEntry<V>>> {
    match (a, b) {
        (Some(a), Some(b)) => {
            if b.prefix_len() > a.prefix_len()
                || (b.prefix_len() == a.prefix_len()
                    && b.admin_distance < a.admin_distance)
            {
                Some(b)
            } else {
                Some(a)
            }
        }
        (a, b) => a.or(b),
    }
}

// ===== unit tests =====
