//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use ribflow_utils::UnboundedSender;
use ribflow_utils::ip::{IpAddrKind, IpNetworkKind};
use ribflow_utils::policy::PolicyTags;
use ribflow_utils::protocol::Protocol;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RibConfig;
use crate::error::Error;
use crate::policy_redist::PolicyRedistMsg;
use crate::register::{RouteInvalidateMsg, RouteRegister};
use crate::rib::{Rib, RibTransport};
use crate::route::RouteEntry;
use crate::version::{Ipv4, Ipv6, Version};

// Unicast and multicast RIBs of one address family.
pub struct RibSet<V: Version> {
    pub unicast: Rib<V>,
    pub multicast: Rib<V>,
}

// Owner of the four RIBs.
pub struct RibManager {
    pub ipv4: RibSet<Ipv4>,
    pub ipv6: RibSet<Ipv6>,
}

// Route carried by a request.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RouteRequest {
    pub protocol: Protocol,
    pub prefix: IpNetwork,
    pub nexthop: IpAddr,
    #[serde(default)]
    pub metric: u32,
    #[serde(default)]
    pub ifname: Option<String>,
    #[serde(default)]
    pub vifname: Option<String>,
    #[serde(default)]
    pub policytags: PolicyTags,
    #[serde(default = "default_true")]
    pub unicast: bool,
    #[serde(default)]
    pub multicast: bool,
}

// Request received from a routing protocol.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum RibRequest {
    AddIgpTable {
        protocol: Protocol,
        #[serde(default)]
        target: Option<String>,
        #[serde(default = "default_true")]
        unicast: bool,
        #[serde(default)]
        multicast: bool,
    },
    AddEgpTable {
        protocol: Protocol,
        #[serde(default)]
        target: Option<String>,
        #[serde(default = "default_true")]
        unicast: bool,
        #[serde(default)]
        multicast: bool,
    },
    DeleteTable {
        protocol: Protocol,
        #[serde(default = "default_true")]
        unicast: bool,
        #[serde(default)]
        multicast: bool,
    },
    SetAdminDistance {
        protocol: Protocol,
        admin_distance: u32,
        #[serde(default = "default_true")]
        unicast: bool,
        #[serde(default)]
        multicast: bool,
    },
    AddRoute(RouteRequest),
    ReplaceRoute(RouteRequest),
    DeleteRoute {
        protocol: Protocol,
        prefix: IpNetwork,
        #[serde(default = "default_true")]
        unicast: bool,
        #[serde(default)]
        multicast: bool,
    },
    SetPolicyTags {
        protocol: Protocol,
        prefix: IpNetwork,
        policytags: PolicyTags,
        #[serde(default = "default_true")]
        unicast: bool,
        #[serde(default)]
        multicast: bool,
    },
    LookupRoute {
        addr: IpAddr,
        #[serde(default = "default_true")]
        unicast: bool,
        #[serde(default)]
        multicast: bool,
    },
    RegisterInterest {
        addr: IpAddr,
        module: String,
        #[serde(default = "default_true")]
        unicast: bool,
        #[serde(default)]
        multicast: bool,
    },
    DeregisterInterest {
        subnet: IpNetwork,
        module: String,
        #[serde(default = "default_true")]
        unicast: bool,
        #[serde(default)]
        multicast: bool,
    },
    NewVif {
        vifname: String,
        #[serde(default = "default_true")]
        unicast: bool,
        #[serde(default)]
        multicast: bool,
    },
    DeleteVif {
        vifname: String,
        #[serde(default = "default_true")]
        unicast: bool,
        #[serde(default)]
        multicast: bool,
    },
    AddVifAddress {
        vifname: String,
        addr: IpAddr,
        subnet: IpNetwork,
        #[serde(default = "default_true")]
        unicast: bool,
        #[serde(default)]
        multicast: bool,
    },
    DeleteVifAddress {
        vifname: String,
        addr: IpAddr,
        #[serde(default = "default_true")]
        unicast: bool,
        #[serde(default)]
        multicast: bool,
    },
    InsertPolicyRedistTags {
        protocol: Protocol,
        policytags: PolicyTags,
    },
    RemovePolicyRedistTags {
        protocol: Protocol,
    },
    ResetPolicyRedistTags,
    TargetDeath {
        target: String,
    },
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RibResponse {
    Done,
    Lookup(Option<IpAddr>),
    Registered {
        subnet: IpNetwork,
        nexthop: Option<IpAddr>,
    },
}

// ===== impl RibSet =====

impl<V> RibSet<V>
where
    V: Version,
{
    fn new(
        config: &RibConfig,
        policy_redist_tx: Option<UnboundedSender<PolicyRedistMsg>>,
        invalidate_tx: Option<UnboundedSender<RouteInvalidateMsg>>,
    ) -> RibSet<V> {
        RibSet {
            unicast: Rib::new(
                RibTransport::Unicast,
                config.clone(),
                policy_redist_tx.clone(),
                invalidate_tx.clone(),
            ),
            multicast: Rib::new(
                RibTransport::Multicast,
                config.clone(),
                policy_redist_tx,
                invalidate_tx,
            ),
        }
    }

    pub fn get(&self, transport: RibTransport) -> &Rib<V> {
        match transport {
            RibTransport::Unicast => &self.unicast,
            RibTransport::Multicast => &self.multicast,
        }
    }

    pub fn get_mut(&mut self, transport: RibTransport) -> &mut Rib<V> {
        match transport {
            RibTransport::Unicast => &mut self.unicast,
            RibTransport::Multicast => &mut self.multicast,
        }
    }

    fn ribs_mut(
        &mut self,
        unicast: bool,
        multicast: bool,
    ) -> impl Iterator<Item = &mut Rib<V>> {
        [
            unicast.then_some(&mut self.unicast),
            multicast.then_some(&mut self.multicast),
        ]
        .into_iter()
        .flatten()
    }

    pub fn add_route(
        &mut self,
        route: RouteEntry<V>,
        unicast: bool,
        multicast: bool,
    ) -> Result<(), Error> {
        check_transport(unicast, multicast)?;
        if unicast {
            self.unicast.add_route(route.clone())?;
        }
        if multicast
            && let Err(error) = self.multicast.add_route(route.clone())
        {
            if unicast {
                if let Err(error) =
                    self.unicast.delete_route(route.protocol, &route.net)
                {
                    error.log();
                }
            }
            return Err(error);
        }
        Ok(())
    }

    pub fn replace_route(
        &mut self,
        route: RouteEntry<V>,
        unicast: bool,
        multicast: bool,
    ) -> Result<(), Error> {
        check_transport(unicast, multicast)?;
        let old = self.unicast.origin_route(route.protocol, &route.net);
        if unicast {
            self.unicast.replace_route(route.clone())?;
        }
        if multicast
            && let Err(error) = self.multicast.replace_route(route.clone())
        {
            if unicast && let Some(old) = old {
                if let Err(error) = self.unicast.replace_route((*old).clone())
                {
                    error.log();
                }
            }
            return Err(error);
        }
        Ok(())
    }

    pub fn delete_route(
        &mut self,
        protocol: Protocol,
        net: &V::IpNetwork,
        unicast: bool,
        multicast: bool,
    ) -> Result<(), Error> {
        check_transport(unicast, multicast)?;
        let old = self.unicast.origin_route(protocol, net);
        if unicast {
            self.unicast.delete_route(protocol, net)?;
        }
        if multicast
            && let Err(error) = self.multicast.delete_route(protocol, net)
        {
            if unicast && let Some(old) = old {
                if let Err(error) = self.unicast.add_route((*old).clone()) {
                    error.log();
                }
            }
            return Err(error);
        }
        Ok(())
    }

    pub fn set_route_policytags(
        &mut self,
        protocol: Protocol,
        net: &V::IpNetwork,
        policytags: PolicyTags,
        unicast: bool,
        multicast: bool,
    ) -> Result<(), Error> {
        check_transport(unicast, multicast)?;
        let old = self.unicast.origin_route(protocol, net);
        if unicast {
            self.unicast
                .set_route_policytags(protocol, net, policytags.clone())?;
        }
        if multicast
            && let Err(error) =
                self.multicast.set_route_policytags(protocol, net, policytags)
        {
            if unicast && let Some(old) = old {
                let prevtags = old.policytags.clone();
                if let Err(error) =
                    self.unicast.set_route_policytags(protocol, net, prevtags)
                {
                    error.log();
                }
            }
            return Err(error);
        }
        Ok(())
    }

    fn run_until_idle(&mut self) -> usize {
        self.unicast.run_until_idle() + self.multicast.run_until_idle()
    }
}

// ===== impl RibManager =====

impl RibManager {
    pub fn new(
        config: &RibConfig,
        policy_redist_tx: Option<UnboundedSender<PolicyRedistMsg>>,
        invalidate_tx: Option<UnboundedSender<RouteInvalidateMsg>>,
    ) -> RibManager {
        RibManager {
            ipv4: RibSet::new(
                config,
                policy_redist_tx.clone(),
                invalidate_tx.clone(),
            ),
            ipv6: RibSet::new(config, policy_redist_tx, invalidate_tx),
        }
    }

    pub fn process_request(
        &mut self,
        request: RibRequest,
    ) -> Result<RibResponse, Error> {
        debug!(?request, "processing request");

        match request {
            RibRequest::AddIgpTable {
                protocol,
                target,
                unicast,
                multicast,
            } => {
                check_transport(unicast, multicast)?;
                for rib in self.ipv4.ribs_mut(unicast, multicast) {
                    rib.add_igp_table(protocol, target.clone());
                }
                for rib in self.ipv6.ribs_mut(unicast, multicast) {
                    rib.add_igp_table(protocol, target.clone());
                }
            }
            RibRequest::AddEgpTable {
                protocol,
                target,
                unicast,
                multicast,
            } => {
                check_transport(unicast, multicast)?;
                for rib in self.ipv4.ribs_mut(unicast, multicast) {
                    rib.add_egp_table(protocol, target.clone());
                }
                for rib in self.ipv6.ribs_mut(unicast, multicast) {
                    rib.add_egp_table(protocol, target.clone());
                }
            }
            RibRequest::DeleteTable {
                protocol,
                unicast,
                multicast,
            } => {
                check_transport(unicast, multicast)?;
                for rib in self.ipv4.ribs_mut(unicast, multicast) {
                    rib.delete_origin_table(protocol)?;
                }
                for rib in self.ipv6.ribs_mut(unicast, multicast) {
                    rib.delete_origin_table(protocol)?;
                }
            }
            RibRequest::SetAdminDistance {
                protocol,
                admin_distance,
                unicast,
                multicast,
            } => {
                check_transport(unicast, multicast)?;
                for rib in self.ipv4.ribs_mut(unicast, multicast) {
                    rib.set_protocol_admin_distance(protocol, admin_distance)?;
                }
                for rib in self.ipv6.ribs_mut(unicast, multicast) {
                    rib.set_protocol_admin_distance(protocol, admin_distance)?;
                }
            }
            RibRequest::AddRoute(req) => match req.prefix {
                IpNetwork::V4(_) => {
                    let route = route_entry(&req)?;
                    self.ipv4.add_route(route, req.unicast, req.multicast)?;
                }
                IpNetwork::V6(_) => {
                    let route = route_entry(&req)?;
                    self.ipv6.add_route(route, req.unicast, req.multicast)?;
                }
            },
            RibRequest::ReplaceRoute(req) => match req.prefix {
                IpNetwork::V4(_) => {
                    let route = route_entry(&req)?;
                    self.ipv4.replace_route(
                        route,
                        req.unicast,
                        req.multicast,
                    )?;
                }
                IpNetwork::V6(_) => {
                    let route = route_entry(&req)?;
                    self.ipv6.replace_route(
                        route,
                        req.unicast,
                        req.multicast,
                    )?;
                }
            },
            RibRequest::DeleteRoute {
                protocol,
                prefix,
                unicast,
                multicast,
            } => match prefix {
                IpNetwork::V4(net) => {
                    let net = net.apply_mask();
                    self.ipv4.delete_route(protocol, &net, unicast, multicast)?;
                }
                IpNetwork::V6(net) => {
                    let net = net.apply_mask();
                    self.ipv6.delete_route(protocol, &net, unicast, multicast)?;
                }
            },
            RibRequest::SetPolicyTags {
                protocol,
                prefix,
                policytags,
                unicast,
                multicast,
            } => match prefix {
                IpNetwork::V4(net) => {
                    self.ipv4.set_route_policytags(
                        protocol,
                        &net.apply_mask(),
                        policytags,
                        unicast,
                        multicast,
                    )?;
                }
                IpNetwork::V6(net) => {
                    self.ipv6.set_route_policytags(
                        protocol,
                        &net.apply_mask(),
                        policytags,
                        unicast,
                        multicast,
                    )?;
                }
            },
            RibRequest::LookupRoute {
                addr,
                unicast,
                multicast,
            } => {
                let transport = single_transport(unicast, multicast)?;
                let nexthop = match addr {
                    IpAddr::V4(addr) => self
                        .ipv4
                        .get(transport)
                        .lookup_route(addr)
                        .map(IpAddr::from),
                    IpAddr::V6(addr) => self
                        .ipv6
                        .get(transport)
                        .lookup_route(addr)
                        .map(IpAddr::from),
                };
                return Ok(RibResponse::Lookup(nexthop));
            }
            RibRequest::RegisterInterest {
                addr,
                module,
                unicast,
                multicast,
            } => {
                let transport = single_transport(unicast, multicast)?;
                return Ok(match addr {
                    IpAddr::V4(addr) => registered_response(
                        self.ipv4
                            .get_mut(transport)
                            .register_route_range(addr, &module),
                    ),
                    IpAddr::V6(addr) => registered_response(
                        self.ipv6
                            .get_mut(transport)
                            .register_route_range(addr, &module),
                    ),
                });
            }
            RibRequest::DeregisterInterest {
                subnet,
                module,
                unicast,
                multicast,
            } => {
                let transport = single_transport(unicast, multicast)?;
                match subnet {
                    IpNetwork::V4(subnet) => self
                        .ipv4
                        .get_mut(transport)
                        .deregister_route_range(&subnet, &module)?,
                    IpNetwork::V6(subnet) => self
                        .ipv6
                        .get_mut(transport)
                        .deregister_route_range(&subnet, &module)?,
                }
            }
            RibRequest::NewVif {
                vifname,
                unicast,
                multicast,
            } => {
                check_transport(unicast, multicast)?;
                for rib in self.ipv4.ribs_mut(unicast, multicast) {
                    rib.new_vif(&vifname)?;
                }
                for rib in self.ipv6.ribs_mut(unicast, multicast) {
                    rib.new_vif(&vifname)?;
                }
            }
            RibRequest::DeleteVif {
                vifname,
                unicast,
                multicast,
            } => {
                check_transport(unicast, multicast)?;
                for rib in self.ipv4.ribs_mut(unicast, multicast) {
                    rib.delete_vif(&vifname)?;
                }
                for rib in self.ipv6.ribs_mut(unicast, multicast) {
                    rib.delete_vif(&vifname)?;
                }
            }
            RibRequest::AddVifAddress {
                vifname,
                addr,
                subnet,
                unicast,
                multicast,
            } => {
                check_transport(unicast, multicast)?;
                match (addr, subnet) {
                    (IpAddr::V4(addr), IpNetwork::V4(subnet)) => {
                        for rib in self.ipv4.ribs_mut(unicast, multicast) {
                            rib.add_vif_address(&vifname, addr, subnet)?;
                        }
                    }
                    (IpAddr::V6(addr), IpNetwork::V6(subnet)) => {
                        for rib in self.ipv6.ribs_mut(unicast, multicast) {
                            rib.add_vif_address(&vifname, addr, subnet)?;
                        }
                    }
                    _ => return Err(Error::AddressFamilyMismatch),
                }
            }
            RibRequest::DeleteVifAddress {
                vifname,
                addr,
                unicast,
                multicast,
            } => {
                check_transport(unicast, multicast)?;
                match addr {
                    IpAddr::V4(addr) => {
                        for rib in self.ipv4.ribs_mut(unicast, multicast) {
                            rib.delete_vif_address(&vifname, addr)?;
                        }
                    }
                    IpAddr::V6(addr) => {
                        for rib in self.ipv6.ribs_mut(unicast, multicast) {
                            rib.delete_vif_address(&vifname, addr)?;
                        }
                    }
                }
            }
            RibRequest::InsertPolicyRedistTags {
                protocol,
                policytags,
            } => {
                for rib in self.ipv4.ribs_mut(true, true) {
                    rib.insert_policy_redist_tags(protocol, policytags.clone());
                }
                for rib in self.ipv6.ribs_mut(true, true) {
                    rib.insert_policy_redist_tags(protocol, policytags.clone());
                }
            }
            RibRequest::RemovePolicyRedistTags { protocol } => {
                for rib in self.ipv4.ribs_mut(true, true) {
                    rib.remove_policy_redist_tags(protocol);
                }
                for rib in self.ipv6.ribs_mut(true, true) {
                    rib.remove_policy_redist_tags(protocol);
                }
            }
            RibRequest::ResetPolicyRedistTags => {
                for rib in self.ipv4.ribs_mut(true, true) {
                    rib.reset_policy_redist_tags();
                }
                for rib in self.ipv6.ribs_mut(true, true) {
                    rib.reset_policy_redist_tags();
                }
            }
            RibRequest::TargetDeath { target } => {
                // Targets register per RIB, so only some of them may know it.
                let found = [
                    self.ipv4.unicast.target_death(&target).is_ok(),
                    self.ipv4.multicast.target_death(&target).is_ok(),
                    self.ipv6.unicast.target_death(&target).is_ok(),
                    self.ipv6.multicast.target_death(&target).is_ok(),
                ];
                if !found.contains(&true) {
                    return Err(Error::UnknownTarget(target));
                }
            }
        }

        Ok(RibResponse::Done)
    }

    // Processes scheduled work of every RIB until none is left.
    pub fn run_until_idle(&mut self) -> usize {
        let mut total = 0;
        loop {
            let count =
                self.ipv4.run_until_idle() + self.ipv6.run_until_idle();
            if count == 0 {
                return total;
            }
            total += count;
        }
    }

    // Waits for the next scheduled message of any RIB and processes it.
    pub async fn process_next_msg(&mut self) {
        tokio::select! {
            Some(msg) = self.ipv4.unicast.msg_rx.recv() => {
                self.ipv4.unicast.process_msg(msg);
            }
            Some(msg) = self.ipv4.multicast.msg_rx.recv() => {
                self.ipv4.multicast.process_msg(msg);
            }
            Some(msg) = self.ipv6.unicast.msg_rx.recv() => {
                self.ipv6.unicast.process_msg(msg);
            }
            Some(msg) = self.ipv6.multicast.msg_rx.recv() => {
                self.ipv6.multicast.process_msg(msg);
            }
        }
    }
}

// ===== helper functions =====

fn default_true() -> bool {
    true
}

fn check_transport(unicast: bool, multicast: bool) -> Result<(), Error> {
    if !unicast && !multicast {
        return Err(Error::InvalidTransport);
    }
    Ok(())
}

// Lookups and route interest address exactly one RIB.
fn single_transport(
    unicast: bool,
    multicast: bool,
) -> Result<RibTransport, Error> {
    match (unicast, multicast) {
        (true, false) => Ok(RibTransport::Unicast),
        (false, true) => Ok(RibTransport::Multicast),
        _ => Err(Error::InvalidTransport),
    }
}

fn registered_response<V: Version>(
    registration: RouteRegister<V>,
) -> RibResponse {
    RibResponse::Registered {
        subnet: registration.subnet.into(),
        nexthop: registration.route.map(|route| route.nexthop.into()),
    }
}

fn route_entry<V: Version>(req: &RouteRequest) -> Result<RouteEntry<V>, Error> {
    let net =
        V::IpNetwork::get(req.prefix).ok_or(Error::AddressFamilyMismatch)?;
    let nexthop =
        V::IpAddr::get(req.nexthop).ok_or(Error::AddressFamilyMismatch)?;
    let route = RouteEntry::new(net, nexthop, req.protocol, req.metric)
        .with_interface(req.ifname.clone(), req.vifname.clone())
        .with_policytags(req.policytags.clone());
    Ok(route)
}
