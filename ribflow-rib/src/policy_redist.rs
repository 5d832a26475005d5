//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use ribflow_utils::UnboundedSender;
use ribflow_utils::policy::{PolicyRedistMap, PolicyTags};
use ribflow_utils::protocol::Protocol;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::debug::Debug;
use crate::rib::RibTransport;
use crate::route::RouteEntry;
use crate::table::TableId;
use crate::version::Version;

// Stage asking other protocols to redistribute routes whose policy tags they
// are interested in.
#[derive(Debug)]
pub struct PolicyRedistTable {
    pub name: String,
    pub parent: Option<TableId>,
    pub next_table: Option<TableId>,
    pub transport: RibTransport,
    pub redist_map: PolicyRedistMap,
    redist_tx: Option<UnboundedSender<PolicyRedistMsg>>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyRedistOp {
    Add,
    Delete,
}

// Redistribution request addressed to a routing protocol.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PolicyRedistMsg {
    pub protocol: Protocol,
    pub transport: RibTransport,
    pub op: PolicyRedistOp,
    pub prefix: IpNetwork,
    pub nexthop: IpAddr,
    pub origin: Protocol,
    pub metric: u32,
    pub admin_distance: u32,
    pub policytags: PolicyTags,
}

// ===== impl PolicyRedistTable =====

impl PolicyRedistTable {
    pub(crate) fn new(
        name: String,
        transport: RibTransport,
        redist_tx: Option<UnboundedSender<PolicyRedistMsg>>,
    ) -> PolicyRedistTable {
        PolicyRedistTable {
            name,
            parent: None,
            next_table: None,
            transport,
            redist_map: Default::default(),
            redist_tx,
        }
    }

    pub(crate) fn add_route<V: Version>(&self, route: &RouteEntry<V>) {
        let protocols = self.redist_map.get_protocols(&route.policytags);
        self.request(route, &route.policytags, PolicyRedistOp::Add, protocols);
    }

    pub(crate) fn delete_route<V: Version>(&self, route: &RouteEntry<V>) {
        let protocols = self.redist_map.get_protocols(&route.policytags);
        self.request(
            route,
            &route.policytags,
            PolicyRedistOp::Delete,
            protocols,
        );
    }

    // Protocols that lost interest get a delete, protocols that gained
    // interest get an add. Protocols interested before and after are left
    // alone.
    pub(crate) fn replace_policytags<V: Version>(
        &self,
        route: &RouteEntry<V>,
        prevtags: &PolicyTags,
    ) {
        let old = self.redist_map.get_protocols(prevtags);
        let new = self.redist_map.get_protocols(&route.policytags);

        let del = old.difference(&new).copied().collect();
        self.request(route, prevtags, PolicyRedistOp::Delete, del);

        let add = new.difference(&old).copied().collect();
        self.request(route, &route.policytags, PolicyRedistOp::Add, add);
    }

    fn request<V: Version>(
        &self,
        route: &RouteEntry<V>,
        policytags: &PolicyTags,
        op: PolicyRedistOp,
        protocols: BTreeSet<Protocol>,
    ) {
        for protocol in protocols {
            Debug::<V>::PolicyRedist(op, protocol, &route.net).log();

            let Some(redist_tx) = &self.redist_tx else {
                continue;
            };
            let msg = PolicyRedistMsg {
                protocol,
                transport: self.transport,
                op,
                prefix: route.net.into(),
                nexthop: route.nexthop.into(),
                origin: route.protocol,
                metric: route.metric,
                admin_distance: route.admin_distance,
                policytags: policytags.clone(),
            };
            if redist_tx.send(msg).is_err() {
                error!(%protocol, "failed to send policy redistribution msg");
            }
        }
    }
}

// ===== impl PolicyRedistOp =====

impl std::fmt::Display for PolicyRedistOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyRedistOp::Add => write!(f, "add"),
            PolicyRedistOp::Delete => write!(f, "delete"),
        }
    }
}
