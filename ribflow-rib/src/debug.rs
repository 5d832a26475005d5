//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use ribflow_utils::protocol::Protocol;
use tracing::{debug, debug_span};

use crate::policy_redist::PolicyRedistOp;
use crate::route::RouteEntry;
use crate::table::TableType;
use crate::version::Version;

// RIB debug messages.
#[derive(Debug)]
pub enum Debug<'a, V: Version> {
    TableCreate(&'a str, TableType),
    TablePlumb(&'a str, &'a str),
    TableUnplumb(&'a str),
    ProtocolShutdown(Protocol),
    DeletionStart(&'a str, usize),
    DeletionFinish(&'a str),
    RedistributorAttach(&'a str, &'a str),
    RedistributorDetach(&'a str, &'a str),
    DumpStart(&'a str),
    DumpFinish(&'a str),
    OutputHighWater(&'a str),
    OutputLowWater(&'a str),
    PolicyRedist(PolicyRedistOp, Protocol, &'a V::IpNetwork),
    LogUpdate(&'a str, u64, &'a str, &'a RouteEntry<V>),
    NexthopResolved(&'a V::IpNetwork, &'a V::IpNetwork),
    NexthopUnresolved(&'a V::IpNetwork, &'a V::IpAddr),
    RegisterInterest(&'a str, &'a V::IpNetwork),
    DeregisterInterest(&'a str, &'a V::IpNetwork),
    InvalidateInterest(&'a str, &'a V::IpNetwork),
    VifCreate(&'a str),
    VifDelete(&'a str),
}

// ===== impl Debug =====

impl<'a, V> Debug<'a, V>
where
    V: Version,
{
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        let af = V::ADDRESS_FAMILY;
        match self {
            Debug::TableCreate(table, table_type) => {
                debug!(%af, %table, ?table_type, "{}", self);
            }
            Debug::TablePlumb(table, parent) => {
                debug!(%af, %table, %parent, "{}", self);
            }
            Debug::TableUnplumb(table) => {
                debug!(%af, %table, "{}", self);
            }
            Debug::ProtocolShutdown(protocol) => {
                debug!(%af, %protocol, "{}", self);
            }
            Debug::DeletionStart(table, count) => {
                debug!(%af, %table, %count, "{}", self);
            }
            Debug::DeletionFinish(table) => {
                debug!(%af, %table, "{}", self);
            }
            Debug::RedistributorAttach(name, table)
            | Debug::RedistributorDetach(name, table) => {
                debug_span!("redistributor", %name).in_scope(|| {
                    debug!(%af, %table, "{}", self);
                });
            }
            Debug::DumpStart(name)
            | Debug::DumpFinish(name)
            | Debug::OutputHighWater(name)
            | Debug::OutputLowWater(name) => {
                debug_span!("redistributor", %name).in_scope(|| {
                    debug!(%af, "{}", self);
                });
            }
            Debug::PolicyRedist(op, protocol, prefix) => {
                debug!(%op, %protocol, %prefix, "{}", self);
            }
            Debug::LogUpdate(table, update, op, route) => {
                debug_span!("log", %table).in_scope(|| {
                    debug!(%update, %op, %route, "{}", self);
                });
            }
            Debug::NexthopResolved(prefix, igp_prefix) => {
                debug!(%af, %prefix, %igp_prefix, "{}", self);
            }
            Debug::NexthopUnresolved(prefix, nexthop) => {
                debug!(%af, %prefix, %nexthop, "{}", self);
            }
            Debug::RegisterInterest(module, subnet)
            | Debug::DeregisterInterest(module, subnet)
            | Debug::InvalidateInterest(module, subnet) => {
                debug!(%af, %module, %subnet, "{}", self);
            }
            Debug::VifCreate(vifname) | Debug::VifDelete(vifname) => {
                debug!(%af, %vifname, "{}", self);
            }
        }
    }
}

impl<'a, V> std::fmt::Display for Debug<'a, V>
where
    V: Version,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::TableCreate(..) => {
                write!(f, "table created")
            }
            Debug::TablePlumb(..) => {
                write!(f, "table plumbed")
            }
            Debug::TableUnplumb(..) => {
                write!(f, "table unplumbed")
            }
            Debug::ProtocolShutdown(..) => {
                write!(f, "routing protocol shutdown")
            }
            Debug::DeletionStart(..) => {
                write!(f, "starting background deletion")
            }
            Debug::DeletionFinish(..) => {
                write!(f, "background deletion finished")
            }
            Debug::RedistributorAttach(..) => {
                write!(f, "redistributor attached")
            }
            Debug::RedistributorDetach(..) => {
                write!(f, "redistributor detached")
            }
            Debug::DumpStart(..) => {
                write!(f, "starting route dump")
            }
            Debug::DumpFinish(..) => {
                write!(f, "route dump finished")
            }
            Debug::OutputHighWater(..) => {
                write!(f, "output reached high water mark")
            }
            Debug::OutputLowWater(..) => {
                write!(f, "output reached low water mark")
            }
            Debug::PolicyRedist(..) => {
                write!(f, "policy redistribution request")
            }
            Debug::LogUpdate(..) => {
                write!(f, "route update")
            }
            Debug::NexthopResolved(..) => {
                write!(f, "next-hop resolved")
            }
            Debug::NexthopUnresolved(..) => {
                write!(f, "next-hop unresolved")
            }
            Debug::RegisterInterest(..) => {
                write!(f, "route interest registered")
            }
            Debug::DeregisterInterest(..) => {
                write!(f, "route interest deregistered")
            }
            Debug::InvalidateInterest(..) => {
                write!(f, "route interest invalidated")
            }
            Debug::VifCreate(..) => {
                write!(f, "interface created")
            }
            Debug::VifDelete(..) => {
                write!(f, "interface deleted")
            }
        }
    }
}
