//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use ribflow_utils::protocol::{Protocol, ProtocolType};
use serde::{Deserialize, Serialize};

use crate::route::RouteEntry;
use crate::version::Version;

// Predicate deciding whether a route is handed to a redistribution output.
pub trait RoutePolicy<V: Version>: Send {
    fn accept(&self, route: &RouteEntry<V>) -> bool;
}

// Redistribution policy expression.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RedistPolicy {
    Any,
    Protocol(Protocol),
    Igp,
    Egp,
    Not(Box<RedistPolicy>),
    And(Box<RedistPolicy>, Box<RedistPolicy>),
    Or(Box<RedistPolicy>, Box<RedistPolicy>),
}

// ===== impl RedistPolicy =====

impl RedistPolicy {
    #[must_use]
    pub fn and(self, other: RedistPolicy) -> RedistPolicy {
        RedistPolicy::And(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn or(self, other: RedistPolicy) -> RedistPolicy {
        RedistPolicy::Or(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn not(self) -> RedistPolicy {
        RedistPolicy::Not(Box::new(self))
    }
}

impl<V> RoutePolicy<V> for RedistPolicy
where
    V: Version,
{
    fn accept(&self, route: &RouteEntry<V>) -> bool {
        match self {
            RedistPolicy::Any => true,
            RedistPolicy::Protocol(protocol) => route.protocol == *protocol,
            RedistPolicy::Igp => route.protocol_type() == ProtocolType::Igp,
            RedistPolicy::Egp => route.protocol_type() == ProtocolType::Egp,
            RedistPolicy::Not(policy) => {
                !RoutePolicy::<V>::accept(policy.as_ref(), route)
            }
            RedistPolicy::And(a, b) => {
                RoutePolicy::<V>::accept(a.as_ref(), route)
                    && RoutePolicy::<V>::accept(b.as_ref(), route)
            }
            RedistPolicy::Or(a, b) => {
                RoutePolicy::<V>::accept(a.as_ref(), route)
                    || RoutePolicy::<V>::accept(b.as_ref(), route)
            }
        }
    }
}

// ===== unit tests =====
