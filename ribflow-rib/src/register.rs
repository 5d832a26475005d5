//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ipnetwork::IpNetwork;
use ribflow_utils::UnboundedSender;
use ribflow_utils::ip::IpNetworkKind;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::debug::Debug;
use crate::error::Error;
use crate::rib::RibTransport;
use crate::route::{RouteEntry, RouteRange};
use crate::table::TableId;
use crate::version::Version;

// Final stage. Modules register interest in the route covering an address
// and get told once a route change makes that answer stale.
#[derive(Debug)]
pub struct RegisterTable<V: Version> {
    pub name: String,
    pub parent: Option<TableId>,
    pub next_table: Option<TableId>,
    pub transport: RibTransport,
    registrations: BTreeMap<V::IpNetwork, RouteRegister<V>>,
    invalidate_tx: Option<UnboundedSender<RouteInvalidateMsg>>,
}

// Interest of one or more modules in a subnet over which the answer to a
// route lookup doesn't change.
#[derive(Clone, Debug)]
pub struct RouteRegister<V: Version> {
    pub subnet: V::IpNetwork,
    pub route: Option<Arc<RouteEntry<V>>>,
    pub modules: BTreeSet<String>,
}

// Tells a module that the answer it registered for no longer holds. The
// registration is gone and the module has to register again.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RouteInvalidateMsg {
    pub module: String,
    pub transport: RibTransport,
    pub subnet: IpNetwork,
}

// ===== impl RegisterTable =====

impl<V> RegisterTable<V>
where
    V: Version,
{
    pub(crate) fn new(
        name: String,
        transport: RibTransport,
        invalidate_tx: Option<UnboundedSender<RouteInvalidateMsg>>,
    ) -> RegisterTable<V> {
        RegisterTable {
            name,
            parent: None,
            next_table: None,
            transport,
            registrations: Default::default(),
            invalidate_tx,
        }
    }

    pub fn registration(
        &self,
        subnet: &V::IpNetwork,
    ) -> Option<&RouteRegister<V>> {
        self.registrations.get(&subnet.apply_mask())
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.len()
    }

    // Registers `module` for the minimal subnet of the given lookup answer.
    pub(crate) fn register(
        &mut self,
        rr: RouteRange<V>,
        module: &str,
    ) -> RouteRegister<V> {
        let subnet = rr.minimal_subnet();
        Debug::<V>::RegisterInterest(module, &subnet).log();

        let registration = self.registrations.entry(subnet).or_insert_with(|| {
            RouteRegister {
                subnet,
                route: rr.route,
                modules: Default::default(),
            }
        });
        registration.modules.insert(module.to_owned());
        registration.clone()
    }

    pub(crate) fn deregister(
        &mut self,
        subnet: &V::IpNetwork,
        module: &str,
    ) -> Result<(), Error> {
        let subnet = subnet.apply_mask();
        let registration = self
            .registrations
            .get_mut(&subnet)
            .filter(|registration| registration.modules.contains(module))
            .ok_or_else(|| {
                Error::RegistrationNotFound(module.to_owned(), subnet.into())
            })?;
        Debug::<V>::DeregisterInterest(module, &subnet).log();

        registration.modules.remove(module);
        if registration.modules.is_empty() {
            self.registrations.remove(&subnet);
        }
        Ok(())
    }

    // A route for `net` appeared or went away. Every registration
    // overlapping it is dropped and its modules notified.
    pub(crate) fn invalidate(&mut self, net: &V::IpNetwork) {
        let subnets = self
            .registrations
            .keys()
            .filter(|subnet| {
                subnet.contains(net.network()) || net.contains(subnet.network())
            })
            .copied()
            .collect::<Vec<_>>();

        for subnet in subnets {
            let Some(registration) = self.registrations.remove(&subnet) else {
                continue;
            };
            for module in registration.modules {
                Debug::<V>::InvalidateInterest(&module, &subnet).log();

                let Some(invalidate_tx) = &self.invalidate_tx else {
                    continue;
                };
                let msg = RouteInvalidateMsg {
                    module,
                    transport: self.transport,
                    subnet: subnet.into(),
                };
                if invalidate_tx.send(msg).is_err() {
                    error!(%subnet, "failed to send route invalidation msg");
                }
            }
        }
    }
}

// ===== unit tests =====
