//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::str::FromStr;

use serde::{Deserialize, Serialize};

// Administrative distance assigned to protocols without a configured value.
pub const UNKNOWN_ADMIN_DISTANCE: u32 = 255;

// Routing protocols that can originate routes into the RIB.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    DIRECT,
    STATIC,
    RIPV2,
    RIPNG,
    OSPFV2,
    OSPFV3,
    ISIS,
    EBGP,
    IBGP,
}

// Interior or exterior gateway protocol.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    Igp,
    Egp,
}

// ===== impl Protocol =====

impl Protocol {
    // Returns whether this is an interior or exterior gateway protocol.
    pub fn protocol_type(&self) -> ProtocolType {
        match self {
            Protocol::EBGP | Protocol::IBGP => ProtocolType::Egp,
            _ => ProtocolType::Igp,
        }
    }

    // Returns the default administrative distance of the protocol.
    pub fn default_admin_distance(&self) -> u32 {
        match self {
            Protocol::DIRECT => 0,
            Protocol::STATIC => 1,
            Protocol::EBGP => 20,
            Protocol::OSPFV2 | Protocol::OSPFV3 => 110,
            Protocol::ISIS => 115,
            Protocol::RIPV2 | Protocol::RIPNG => 120,
            Protocol::IBGP => 200,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::DIRECT => write!(f, "direct"),
            Protocol::STATIC => write!(f, "static"),
            Protocol::RIPV2 => write!(f, "ripv2"),
            Protocol::RIPNG => write!(f, "ripng"),
            Protocol::OSPFV2 => write!(f, "ospfv2"),
            Protocol::OSPFV3 => write!(f, "ospfv3"),
            Protocol::ISIS => write!(f, "isis"),
            Protocol::EBGP => write!(f, "ebgp"),
            Protocol::IBGP => write!(f, "ibgp"),
        }
    }
}

impl FromStr for Protocol {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_ref() {
            "direct" | "connected" => Ok(Protocol::DIRECT),
            "static" => Ok(Protocol::STATIC),
            "ripv2" => Ok(Protocol::RIPV2),
            "ripng" => Ok(Protocol::RIPNG),
            "ospfv2" => Ok(Protocol::OSPFV2),
            "ospfv3" => Ok(Protocol::OSPFV3),
            "isis" => Ok(Protocol::ISIS),
            "ebgp" => Ok(Protocol::EBGP),
            "ibgp" => Ok(Protocol::IBGP),
            _ => Err(()),
        }
    }
}

// ===== impl ProtocolType =====

impl std::fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolType::Igp => write!(f, "igp"),
            ProtocolType::Egp => write!(f, "egp"),
        }
    }
}

// ===== unit tests =====
