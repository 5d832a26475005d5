//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(clippy::derivable_impls)]

use std::collections::BTreeMap;

use ribflow_utils::protocol::Protocol;
use serde::Deserialize;

use crate::error::Error;

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RibConfig {
    // Overrides of the default administrative distances.
    pub admin_distances: BTreeMap<Protocol, u32>,
    // Panic on caller-input errors instead of returning them.
    pub errors_are_fatal: bool,
    // Splice a logging stage after the final redistribution table.
    pub log_updates: bool,
    pub redist_output: RedistOutputCfg,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedistOutputCfg {
    pub hi_water: usize,
    pub lo_water: usize,
    pub retry_pause_ms: u64,
    pub channel_size: usize,
}

// ===== impl RibConfig =====

impl RibConfig {
    pub fn validate(&self) -> Result<(), Error> {
        self.redist_output.validate()
    }
}

impl Default for RibConfig {
    fn default() -> RibConfig {
        RibConfig {
            admin_distances: Default::default(),
            errors_are_fatal: false,
            log_updates: false,
            redist_output: Default::default(),
        }
    }
}

// ===== impl RedistOutputCfg =====

impl RedistOutputCfg {
    pub fn validate(&self) -> Result<(), Error> {
        if self.channel_size == 0 {
            return Err(Error::InvalidConfig("channel_size must be positive"));
        }
        if self.lo_water >= self.hi_water {
            return Err(Error::InvalidConfig(
                "lo_water must be below hi_water",
            ));
        }
        Ok(())
    }
}

impl Default for RedistOutputCfg {
    fn default() -> RedistOutputCfg {
        RedistOutputCfg {
            hi_water: 100,
            lo_water: 5,
            retry_pause_ms: 10,
            channel_size: 1024,
        }
    }
}

// ===== unit tests =====
