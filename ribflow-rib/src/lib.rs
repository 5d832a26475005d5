//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![warn(rust_2018_idioms)]

pub mod config;
pub mod debug;
pub mod deletion;
pub mod error;
pub mod expect;
pub mod extint;
pub mod log;
pub mod manager;
pub mod merged;
pub mod origin;
pub mod output;
pub mod policy;
pub mod policy_redist;
pub mod redist;
pub mod register;
pub mod rib;
pub mod route;
pub mod table;
pub mod tasks;
pub mod trie;
pub mod version;
pub mod vif;
