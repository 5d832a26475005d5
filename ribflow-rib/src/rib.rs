//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use ribflow_utils::ip::IpNetworkKind;
use ribflow_utils::policy::PolicyTags;
use ribflow_utils::protocol::{Protocol, ProtocolType};
use ribflow_utils::{UnboundedReceiver, UnboundedSender};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::RibConfig;
use crate::debug::Debug;
use crate::error::Error;
use crate::expect::ExpectTable;
use crate::extint::{ExtIntSide, ExtIntTable};
use crate::output::{RedistEventSender, RedistOutput};
use crate::policy::{RedistPolicy, RoutePolicy};
use crate::policy_redist::{PolicyRedistMsg, PolicyRedistTable};
use crate::redist::RedistributorId;
use crate::register::{RegisterTable, RouteInvalidateMsg, RouteRegister};
use crate::route::{RouteEntry, RouteRange};
use crate::table::{Table, TableId, Tables};
use crate::tasks::messages::RibMsg;
use crate::version::Version;
use crate::vif::RibVif;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RibTransport {
    Unicast,
    Multicast,
}

// Where a redistributor attaches to the table graph.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RedistSource {
    // Every route leaving the RIB.
    All,
    // Routes of one protocol, taken after protocol selection.
    AllOf(Protocol),
    // Routes of one protocol, taken right after its origin table.
    Protocol(Protocol),
}

// Tables created for one routing protocol.
#[derive(Clone, Copy, Debug)]
pub struct OriginChain {
    pub origin: TableId,
    pub redist: TableId,
    pub kind: ProtocolType,
}

// Routing information base of one address family and transport.
//
// Origin tables feed per-protocol redistribution tables. IGP and EGP
// chains are merged separately and joined by the ext-int stage, which
// resolves EGP next-hops through IGP routes. The joined chain goes through
// the policy redistribution stage and the "all" redistribution table, and
// ends with the register stage:
//
//   igp origin -> redist --+
//                          merged --+
//   igp origin -> redist --+        |
//                                   ext-int -> policy-redist -> redist(all)
//   egp origin -> redist -----------+          [-> log] -> register
pub struct Rib<V: Version> {
    pub transport: RibTransport,
    pub config: RibConfig,
    pub tables: Tables<V>,
    origin_tables: BTreeMap<Protocol, OriginChain>,
    targets: BTreeMap<String, Vec<Protocol>>,
    admin_distances: BTreeMap<Protocol, u32>,
    vifs: BTreeMap<String, RibVif<V>>,
    igp_top: Option<TableId>,
    egp_top: Option<TableId>,
    ext_int: TableId,
    policy_redist: TableId,
    redist_all: TableId,
    register: TableId,
    final_table: TableId,
    pub(crate) msg_rx: UnboundedReceiver<RibMsg>,
}

// ===== impl RibTransport =====

impl std::fmt::Display for RibTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RibTransport::Unicast => write!(f, "unicast"),
            RibTransport::Multicast => write!(f, "multicast"),
        }
    }
}

// ===== impl RedistSource =====

impl FromStr for RedistSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            return Ok(RedistSource::All);
        }
        if let Some(protocol) = s.strip_prefix("all-") {
            return Protocol::from_str(protocol)
                .map(RedistSource::AllOf)
                .map_err(|_| Error::RedistSourceNotFound(s.to_owned()));
        }
        Protocol::from_str(s)
            .map(RedistSource::Protocol)
            .map_err(|_| Error::RedistSourceNotFound(s.to_owned()))
    }
}

impl std::fmt::Display for RedistSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RedistSource::All => write!(f, "all"),
            RedistSource::AllOf(protocol) => write!(f, "all-{protocol}"),
            RedistSource::Protocol(protocol) => write!(f, "{protocol}"),
        }
    }
}

// ===== impl Rib =====

impl<V> Rib<V>
where
    V: Version,
{
    pub fn new(
        transport: RibTransport,
        config: RibConfig,
        policy_redist_tx: Option<UnboundedSender<PolicyRedistMsg>>,
        invalidate_tx: Option<UnboundedSender<RouteInvalidateMsg>>,
    ) -> Rib<V> {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let mut tables = Tables::new(msg_tx);

        let ext_int = tables.new_ext_int_table("ext-int");
        let policy_redist = tables.new_policy_redist_table(
            "policy-redist",
            None,
            transport,
            policy_redist_tx,
        );
        tables.link(ext_int, policy_redist);
        let redist_all = tables.new_redist_table("all", Some(policy_redist));
        let mut last = redist_all;
        if config.log_updates {
            last = tables.new_log_table("log", redist_all);
        }
        let register = tables.new_register_table(
            "register",
            last,
            transport,
            invalidate_tx,
        );

        let admin_distances = config.admin_distances.clone();
        Rib {
            transport,
            config,
            tables,
            origin_tables: Default::default(),
            targets: Default::default(),
            admin_distances,
            vifs: Default::default(),
            igp_top: None,
            egp_top: None,
            ext_int,
            policy_redist,
            redist_all,
            register,
            final_table: register,
            msg_rx,
        }
    }

    // Logs the error and aborts when configured to treat caller errors as
    // fatal.
    fn check<T>(&self, result: Result<T, Error>) -> Result<T, Error> {
        if let Err(error) = &result
            && self.config.errors_are_fatal
        {
            error.log();
            panic!("{}: {}", self.transport, error);
        }
        result
    }

    // ----- tables -----

    pub fn admin_distance(&self, protocol: Protocol) -> u32 {
        self.admin_distances
            .get(&protocol)
            .copied()
            .unwrap_or_else(|| protocol.default_admin_distance())
    }

    pub fn set_protocol_admin_distance(
        &mut self,
        protocol: Protocol,
        admin_distance: u32,
    ) -> Result<(), Error> {
        let result = if self.origin_tables.contains_key(&protocol) {
            Err(Error::AdminDistanceLocked(protocol))
        } else {
            self.admin_distances.insert(protocol, admin_distance);
            Ok(())
        };
        self.check(result)
    }

    pub fn add_igp_table(
        &mut self,
        protocol: Protocol,
        target: Option<String>,
    ) -> OriginChain {
        self.add_origin_table(protocol, ProtocolType::Igp, target)
    }

    pub fn add_egp_table(
        &mut self,
        protocol: Protocol,
        target: Option<String>,
    ) -> OriginChain {
        self.add_origin_table(protocol, ProtocolType::Egp, target)
    }

    fn add_origin_table(
        &mut self,
        protocol: Protocol,
        kind: ProtocolType,
        target: Option<String>,
    ) -> OriginChain {
        if let Some(chain) = self.origin_tables.get(&protocol) {
            return *chain;
        }

        let admin_distance = self.admin_distance(protocol);
        let name = format!("{kind}-{protocol}");
        let origin =
            self.tables.new_origin_table(name, protocol, admin_distance);
        let redist = self
            .tables
            .new_redist_table(format!("redist-{protocol}"), Some(origin));

        // The first chain of each kind feeds its side of the ext-int stage
        // directly. Later chains get merged with whatever feeds it.
        let (top, side) = match kind {
            ProtocolType::Igp => (&mut self.igp_top, ExtIntSide::Internal),
            ProtocolType::Egp => (&mut self.egp_top, ExtIntSide::External),
        };
        *top = Some(match *top {
            None => {
                self.tables.link_ext_int(redist, self.ext_int, side);
                redist
            }
            Some(top) => self.tables.new_merged_table(
                format!("merged-{protocol}"),
                top,
                redist,
            ),
        });

        if let Some(target) = target {
            self.targets.entry(target).or_default().push(protocol);
        }

        let chain = OriginChain {
            origin,
            redist,
            kind,
        };
        self.origin_tables.insert(protocol, chain);
        chain
    }

    pub fn origin_chain(&self, protocol: Protocol) -> Option<&OriginChain> {
        self.origin_tables.get(&protocol)
    }

    fn origin_table(&self, protocol: Protocol) -> Result<TableId, Error> {
        self.origin_tables
            .get(&protocol)
            .map(|chain| chain.origin)
            .ok_or(Error::OriginTableNotFound(protocol))
    }

    // Withdraws every route of the protocol in the background. The origin
    // table itself stays in place for when the protocol comes back.
    pub fn delete_origin_table(
        &mut self,
        protocol: Protocol,
    ) -> Result<(), Error> {
        let result = self.origin_table(protocol);
        let origin = self.check(result)?;
        self.tables.routing_protocol_shutdown(origin);
        Ok(())
    }

    // A routing protocol instance went away.
    pub fn target_death(&mut self, target: &str) -> Result<(), Error> {
        let result = self
            .targets
            .remove(target)
            .ok_or_else(|| Error::UnknownTarget(target.to_owned()));
        for protocol in self.check(result)? {
            if let Some(chain) = self.origin_tables.get(&protocol) {
                self.tables.routing_protocol_shutdown(chain.origin);
            }
        }
        Ok(())
    }

    pub fn ext_int_table(&self) -> TableId {
        self.ext_int
    }

    pub fn as_ext_int(&self) -> Option<&ExtIntTable<V>> {
        self.tables.get(self.ext_int).and_then(Table::as_ext_int)
    }

    pub fn policy_redist_table(&self) -> TableId {
        self.policy_redist
    }

    pub fn redist_all_table(&self) -> TableId {
        self.redist_all
    }

    pub fn register_table(&self) -> TableId {
        self.register
    }

    pub fn as_register(&self) -> Option<&RegisterTable<V>> {
        self.tables.get(self.register).and_then(Table::as_register)
    }

    fn register_mut(&mut self) -> &mut RegisterTable<V> {
        match self.tables.get_mut(self.register) {
            Some(Table::Register(table)) => table,
            _ => panic!("register table missing"),
        }
    }

    pub fn final_table(&self) -> TableId {
        self.final_table
    }

    pub fn find_table(&self, name: &str) -> Option<TableId> {
        self.tables
            .iter()
            .find(|(_, table)| table.name() == name)
            .map(|(id, _)| id)
    }

    // Splices a logging stage after the given table.
    pub fn insert_log_table(
        &mut self,
        name: impl Into<String>,
        after: TableId,
    ) -> TableId {
        let id = self.tables.new_log_table(name, after);
        if after == self.final_table {
            self.final_table = id;
        }
        id
    }

    // Splices an expectation stage after the given table.
    pub fn insert_expect_table(
        &mut self,
        name: impl Into<String>,
        after: TableId,
    ) -> TableId {
        let id = self.tables.new_expect_table(name, after);
        if after == self.final_table {
            self.final_table = id;
        }
        id
    }

    pub fn expect_table_mut(
        &mut self,
        id: TableId,
    ) -> Option<&mut ExpectTable<V>> {
        self.tables.get_mut(id).and_then(Table::as_expect_mut)
    }

    // ----- routes -----

    pub fn add_route(&mut self, route: RouteEntry<V>) -> Result<(), Error> {
        let result = self
            .origin_table(route.protocol)
            .and_then(|origin| self.check_nexthop(&route).map(|_| origin));
        let result = result
            .and_then(|origin| self.tables.origin_add_route(origin, route));
        self.check(result)
    }

    // IGP next-hops must be on a directly connected subnet once interfaces
    // are known.
    fn check_nexthop(&self, route: &RouteEntry<V>) -> Result<(), Error> {
        if let Some(vifname) = &route.vifname
            && !self.vifs.contains_key(vifname)
        {
            return Err(Error::VifNotFound(vifname.clone()));
        }
        if route.protocol == Protocol::DIRECT
            || route.protocol_type() != ProtocolType::Igp
        {
            return Ok(());
        }
        let Some(connected) = self.origin_tables.get(&Protocol::DIRECT) else {
            return Ok(());
        };
        let connected = self
            .tables
            .get(connected.origin)
            .and_then(Table::as_origin)
            .and_then(|table| table.lookup_route_addr(route.nexthop));
        if connected.is_none() {
            return Err(Error::NexthopNotConnected(
                route.protocol,
                route.net.into(),
                route.nexthop.into(),
            ));
        }
        Ok(())
    }

    pub fn delete_route(
        &mut self,
        protocol: Protocol,
        net: &V::IpNetwork,
    ) -> Result<(), Error> {
        let result = self
            .origin_table(protocol)
            .and_then(|origin| self.tables.origin_delete_route(origin, net));
        self.check(result)
    }

    // Replaces an existing route, announcing a delete followed by an add.
    pub fn replace_route(&mut self, route: RouteEntry<V>) -> Result<(), Error> {
        self.delete_route(route.protocol, &route.net)?;
        self.add_route(route)
    }

    pub fn set_route_policytags(
        &mut self,
        protocol: Protocol,
        net: &V::IpNetwork,
        policytags: PolicyTags,
    ) -> Result<(), Error> {
        let result = self.origin_table(protocol).and_then(|origin| {
            self.tables.origin_replace_policytags(origin, net, policytags)
        });
        self.check(result)
    }

    // Returns the route a protocol currently originates for the network.
    pub fn origin_route(
        &self,
        protocol: Protocol,
        net: &V::IpNetwork,
    ) -> Option<Arc<RouteEntry<V>>> {
        let origin = self.origin_tables.get(&protocol)?.origin;
        self.tables.get(origin)?.as_origin()?.lookup_route(net).cloned()
    }

    // Returns the next-hop of the best route covering the address.
    pub fn lookup_route(&self, addr: V::IpAddr) -> Option<V::IpAddr> {
        self.lookup_route_entry(addr).map(|route| route.nexthop)
    }

    pub fn lookup_route_entry(
        &self,
        addr: V::IpAddr,
    ) -> Option<Arc<RouteEntry<V>>> {
        self.tables.lookup_route_addr(self.final_table, addr)
    }

    pub fn lookup_route_exact(
        &self,
        net: &V::IpNetwork,
    ) -> Option<Arc<RouteEntry<V>>> {
        self.tables.lookup_route(self.final_table, net)
    }

    pub fn route_range_lookup(&self, addr: V::IpAddr) -> RouteRange<V> {
        self.tables.lookup_route_range(self.final_table, addr)
    }

    // ----- route interest -----

    // Registers a module's interest in the route covering `addr`. The
    // returned subnet is the range of addresses sharing that answer.
    pub fn register_route_range(
        &mut self,
        addr: V::IpAddr,
        module: &str,
    ) -> RouteRegister<V> {
        let rr = self.tables.lookup_route_range(self.register, addr);
        self.register_mut().register(rr, module)
    }

    pub fn deregister_route_range(
        &mut self,
        subnet: &V::IpNetwork,
        module: &str,
    ) -> Result<(), Error> {
        let result = self.register_mut().deregister(subnet, module);
        self.check(result)
    }

    // ----- interfaces -----

    pub fn vif(&self, name: &str) -> Option<&RibVif<V>> {
        self.vifs.get(name)
    }

    pub fn new_vif(&mut self, name: &str) -> Result<(), Error> {
        let result = if self.vifs.contains_key(name) {
            Err(Error::VifExists(name.to_owned()))
        } else {
            Debug::<V>::VifCreate(name).log();
            self.vifs.insert(name.to_owned(), RibVif::new(name.to_owned()));
            Ok(())
        };
        self.check(result)
    }

    // Removes the interface along with its connected routes.
    pub fn delete_vif(&mut self, name: &str) -> Result<(), Error> {
        let result = self
            .vifs
            .remove(name)
            .ok_or_else(|| Error::VifNotFound(name.to_owned()));
        let vif = self.check(result)?;
        Debug::<V>::VifDelete(name).log();
        for subnet in vif.addresses.values() {
            self.delete_route(Protocol::DIRECT, subnet)?;
        }
        Ok(())
    }

    // Adds an address to an interface, originating a connected route for
    // the attached subnet.
    pub fn add_vif_address(
        &mut self,
        name: &str,
        addr: V::IpAddr,
        subnet: V::IpNetwork,
    ) -> Result<(), Error> {
        let subnet = subnet.apply_mask();
        let result = self
            .vifs
            .get(name)
            .map(|vif| vif.connected_route(addr, subnet))
            .ok_or_else(|| Error::VifNotFound(name.to_owned()));
        let route = self.check(result)?;
        self.add_igp_table(Protocol::DIRECT, None);
        self.add_route(route)?;
        if let Some(vif) = self.vifs.get_mut(name) {
            vif.addresses.insert(addr, subnet);
        }
        Ok(())
    }

    pub fn delete_vif_address(
        &mut self,
        name: &str,
        addr: V::IpAddr,
    ) -> Result<(), Error> {
        let result = match self.vifs.get_mut(name) {
            Some(vif) => vif.addresses.remove(&addr).ok_or_else(|| {
                Error::VifAddressNotFound(name.to_owned(), addr.into())
            }),
            None => Err(Error::VifNotFound(name.to_owned())),
        };
        let subnet = self.check(result)?;
        self.delete_route(Protocol::DIRECT, &subnet)
    }

    // ----- redistribution -----

    fn redist_source(
        &self,
        source: &RedistSource,
    ) -> Result<(TableId, Option<RedistPolicy>), Error> {
        match source {
            RedistSource::All => Ok((self.redist_all, None)),
            RedistSource::AllOf(protocol) => Ok((
                self.redist_all,
                Some(RedistPolicy::Protocol(*protocol)),
            )),
            RedistSource::Protocol(protocol) => self
                .origin_tables
                .get(protocol)
                .map(|chain| (chain.redist, None))
                .ok_or_else(|| Error::RedistSourceNotFound(source.to_string())),
        }
    }

    // Attaches a redistributor. The output receives a dump of the routes
    // present at the source, followed by live updates.
    pub fn redist_enable<F>(
        &mut self,
        source: &RedistSource,
        name: &str,
        policy: Option<RedistPolicy>,
        output_fn: F,
    ) -> Result<RedistributorId, Error>
    where
        F: FnOnce(RedistEventSender) -> Box<dyn RedistOutput<V>>,
    {
        let result = self.redist_source(source).and_then(|(table_id, base)| {
            match self.tables.find_redistributor(table_id, name) {
                Some(_) => Err(Error::RedistributorExists(
                    source.to_string(),
                    name.to_owned(),
                )),
                None => Ok((table_id, base)),
            }
        });
        let (table_id, base) = self.check(result)?;

        let policy = match (base, policy) {
            (Some(base), Some(policy)) => Some(base.and(policy)),
            (base, policy) => base.or(policy),
        };
        let policy =
            policy.map(|policy| Box::new(policy) as Box<dyn RoutePolicy<V>>);
        Ok(self
            .tables
            .add_redistributor(table_id, name, policy, output_fn))
    }

    pub fn redist_disable(
        &mut self,
        source: &RedistSource,
        name: &str,
    ) -> Result<(), Error> {
        let result = self.redist_source(source).and_then(|(table_id, _)| {
            self.tables.find_redistributor(table_id, name).ok_or_else(|| {
                Error::RedistributorNotFound(
                    source.to_string(),
                    name.to_owned(),
                )
            })
        });
        let redist_id = self.check(result)?;
        self.tables.remove_redistributor(redist_id);
        Ok(())
    }

    // ----- policy redistribution -----

    fn policy_redist_mut(&mut self) -> &mut PolicyRedistTable {
        match self.tables.get_mut(self.policy_redist) {
            Some(Table::PolicyRedist(table)) => table,
            _ => panic!("policy redistribution table missing"),
        }
    }

    pub fn insert_policy_redist_tags(
        &mut self,
        protocol: Protocol,
        policytags: PolicyTags,
    ) {
        self.policy_redist_mut()
            .redist_map
            .insert(protocol, policytags);
    }

    pub fn remove_policy_redist_tags(&mut self, protocol: Protocol) {
        self.policy_redist_mut().redist_map.remove(protocol);
    }

    pub fn reset_policy_redist_tags(&mut self) {
        self.policy_redist_mut().redist_map.reset();
    }

    // ----- scheduler -----

    pub fn process_msg(&mut self, msg: RibMsg) {
        self.tables.process_msg(msg);
    }

    // Processes scheduled work until none is left. Work scheduled while
    // processing is handled in the same call.
    pub fn run_until_idle(&mut self) -> usize {
        let mut count = 0;
        while let Ok(msg) = self.msg_rx.try_recv() {
            self.tables.process_msg(msg);
            count += 1;
        }
        count
    }

    // Processes at most one scheduled message. Returns whether there was
    // one.
    pub fn run_once(&mut self) -> bool {
        match self.msg_rx.try_recv() {
            Ok(msg) => {
                self.tables.process_msg(msg);
                true
            }
            Err(_) => false,
        }
    }

    pub async fn recv_msg(&mut self) -> Option<RibMsg> {
        self.msg_rx.recv().await
    }
}
