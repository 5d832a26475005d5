//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;

use ribflow_utils::ip::IpNetworkKind;
use ribflow_utils::policy::PolicyTags;
use ribflow_utils::protocol::{Protocol, ProtocolType, UNKNOWN_ADMIN_DISTANCE};

use crate::version::Version;

// Route as stored and propagated by the route tables.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouteEntry<V: Version> {
    pub net: V::IpNetwork,
    pub nexthop: V::IpAddr,
    pub ifname: Option<String>,
    pub vifname: Option<String>,
    pub protocol: Protocol,
    pub admin_distance: u32,
    pub metric: u32,
    pub policytags: PolicyTags,
}

// Answer to the question "which route covers this address, and for which
// address range does that answer hold".
#[derive(Clone, Debug)]
pub struct RouteRange<V: Version> {
    pub addr: V::IpAddr,
    pub route: Option<Arc<RouteEntry<V>>>,
    pub bottom: V::IpAddr,
    pub top: V::IpAddr,
}

// ===== impl RouteEntry =====

impl<V> RouteEntry<V>
where
    V: Version,
{
    pub fn new(
        net: V::IpNetwork,
        nexthop: V::IpAddr,
        protocol: Protocol,
        metric: u32,
    ) -> RouteEntry<V> {
        RouteEntry {
            net: net.apply_mask(),
            nexthop,
            ifname: None,
            vifname: None,
            protocol,
            admin_distance: UNKNOWN_ADMIN_DISTANCE,
            metric,
            policytags: Default::default(),
        }
    }

    #[must_use]
    pub fn with_interface(
        mut self,
        ifname: Option<String>,
        vifname: Option<String>,
    ) -> RouteEntry<V> {
        self.ifname = ifname;
        self.vifname = vifname;
        self
    }

    #[must_use]
    pub fn with_policytags(mut self, policytags: PolicyTags) -> RouteEntry<V> {
        self.policytags = policytags;
        self
    }

    pub fn prefix_len(&self) -> u8 {
        self.net.prefix()
    }

    pub fn protocol_type(&self) -> ProtocolType {
        self.protocol.protocol_type()
    }
}

impl<V> std::fmt::Display for RouteEntry<V>
where
    V: Version,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} via {} proto {} distance {} metric {}",
            self.net,
            self.nexthop,
            self.protocol,
            self.admin_distance,
            self.metric
        )?;
        if let Some(ifname) = &self.ifname {
            write!(f, " dev {ifname}")?;
        }
        if !self.policytags.is_empty() {
            write!(f, " tags {}", self.policytags)?;
        }
        Ok(())
    }
}

// ===== impl RouteRange =====

impl<V> RouteRange<V>
where
    V: Version,
{
    pub fn new(
        addr: V::IpAddr,
        route: Option<Arc<RouteEntry<V>>>,
        bottom: V::IpAddr,
        top: V::IpAddr,
    ) -> RouteRange<V> {
        RouteRange {
            addr,
            route,
            bottom,
            top,
        }
    }

    // Combines the answer of another table into this one.
    //
    // The more specific route wins, then the lower administrative distance,
    // and on a full tie this range keeps its route. The validity interval
    // shrinks to the intersection of both.
    pub fn merge(&mut self, other: &RouteRange<V>) {
        match (&self.route, &other.route) {
            (None, Some(_)) => self.route = other.route.clone(),
            (Some(mine), Some(his)) => {
                if his.prefix_len() > mine.prefix_len()
                    || (his.prefix_len() == mine.prefix_len()
                        && his.admin_distance < mine.admin_distance)
                {
                    self.route = other.route.clone();
                }
            }
            _ => (),
        }
        if self.top > other.top {
            self.top = other.top;
        }
        if self.bottom < other.bottom {
            self.bottom = other.bottom;
        }
    }

    // Returns the largest subnet containing the requested address that lies
    // entirely within the validity interval.
    pub fn minimal_subnet(&self) -> V::IpNetwork {
        for plen in 0..=V::IpNetwork::MAX_PREFIXLEN {
            if let Ok(net) = V::IpNetwork::new(self.addr, plen) {
                let net = net.apply_mask();
                if net.network() >= self.bottom && net.broadcast() <= self.top
                {
                    return net;
                }
            }
        }
        V::IpNetwork::host(self.addr)
    }
}

// ===== unit tests =====
