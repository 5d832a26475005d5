//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use ribflow_utils::protocol::Protocol;
use tracing::{error, warn};

// RIB errors.
#[derive(Debug)]
pub enum Error {
    RouteExists(Protocol, IpNetwork),
    RouteNotFound(Protocol, IpNetwork),
    OriginTableNotFound(Protocol),
    AdminDistanceLocked(Protocol),
    InvalidTransport,
    AddressFamilyMismatch,
    RedistSourceNotFound(String),
    RedistributorExists(String, String),
    RedistributorNotFound(String, String),
    UnknownTarget(String),
    NexthopNotConnected(Protocol, IpNetwork, IpAddr),
    VifExists(String),
    VifNotFound(String),
    VifAddressNotFound(String, IpAddr),
    RegistrationNotFound(String, IpNetwork),
    InvalidConfig(&'static str),
}

// Errors reported by redistribution outputs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OutputError {
    CommandFailed(String),
    Fatal(String),
    ChannelClosed,
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::RouteExists(protocol, prefix)
            | Error::RouteNotFound(protocol, prefix) => {
                warn!(%protocol, %prefix, "{}", self);
            }
            Error::OriginTableNotFound(protocol)
            | Error::AdminDistanceLocked(protocol) => {
                warn!(%protocol, "{}", self);
            }
            Error::InvalidTransport | Error::AddressFamilyMismatch => {
                warn!("{}", self);
            }
            Error::RedistSourceNotFound(source) => {
                warn!(%source, "{}", self);
            }
            Error::RedistributorExists(source, name)
            | Error::RedistributorNotFound(source, name) => {
                warn!(%source, %name, "{}", self);
            }
            Error::UnknownTarget(target) => {
                warn!(%target, "{}", self);
            }
            Error::NexthopNotConnected(protocol, prefix, nexthop) => {
                warn!(%protocol, %prefix, %nexthop, "{}", self);
            }
            Error::VifExists(vifname) | Error::VifNotFound(vifname) => {
                warn!(%vifname, "{}", self);
            }
            Error::VifAddressNotFound(vifname, addr) => {
                warn!(%vifname, %addr, "{}", self);
            }
            Error::RegistrationNotFound(module, subnet) => {
                warn!(%module, %subnet, "{}", self);
            }
            Error::InvalidConfig(..) => {
                warn!("{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::RouteExists(..) => {
                write!(f, "route already exists")
            }
            Error::RouteNotFound(..) => {
                write!(f, "route not found")
            }
            Error::OriginTableNotFound(..) => {
                write!(f, "no route table registered for protocol")
            }
            Error::AdminDistanceLocked(..) => {
                write!(
                    f,
                    "administrative distance can't change once the table exists"
                )
            }
            Error::InvalidTransport => {
                write!(f, "neither unicast nor multicast selected")
            }
            Error::AddressFamilyMismatch => {
                write!(f, "address family mismatch")
            }
            Error::RedistSourceNotFound(..) => {
                write!(f, "redistribution source not found")
            }
            Error::RedistributorExists(..) => {
                write!(f, "redistributor already exists")
            }
            Error::RedistributorNotFound(..) => {
                write!(f, "redistributor not found")
            }
            Error::UnknownTarget(..) => {
                write!(f, "unknown routing protocol target")
            }
            Error::NexthopNotConnected(..) => {
                write!(f, "no directly connected interface toward next-hop")
            }
            Error::VifExists(..) => {
                write!(f, "interface already exists")
            }
            Error::VifNotFound(..) => {
                write!(f, "no such network interface")
            }
            Error::VifAddressNotFound(..) => {
                write!(f, "interface address not found")
            }
            Error::RegistrationNotFound(..) => {
                write!(f, "route interest registration not found")
            }
            Error::InvalidConfig(reason) => {
                write!(f, "invalid configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for Error {}

// ===== impl OutputError =====

impl OutputError {
    pub fn log(&self, redistributor: &str) {
        match self {
            OutputError::CommandFailed(reason) => {
                warn!(%redistributor, %reason, "{}", self);
            }
            OutputError::Fatal(reason) => {
                error!(%redistributor, %reason, "{}", self);
            }
            OutputError::ChannelClosed => {
                error!(%redistributor, "{}", self);
            }
        }
    }

    // Returns whether the output must be torn down.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, OutputError::CommandFailed(..))
    }
}

impl std::fmt::Display for OutputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputError::CommandFailed(..) => {
                write!(f, "redistribution request rejected by target")
            }
            OutputError::Fatal(..) => {
                write!(f, "redistribution output failed")
            }
            OutputError::ChannelClosed => {
                write!(f, "redistribution target went away")
            }
        }
    }
}

impl std::error::Error for OutputError {}
