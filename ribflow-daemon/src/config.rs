//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(clippy::derivable_impls)]

use std::collections::BTreeMap;

use ipnetwork::IpNetwork;
use ribflow_rib::config::RibConfig;
use ribflow_rib::policy::RedistPolicy;
use ribflow_rib::rib::RibTransport;
use ribflow_utils::protocol::{Protocol, ProtocolType};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub logging: Logging,
    pub rib: RibConfig,
    pub tables: Vec<Table>,
    pub policy_redist: BTreeMap<Protocol, Vec<u32>>,
    pub redist: Vec<Redist>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Logging {
    pub file: LoggingFile,
    pub stdout: LoggingStdout,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFile {
    pub enabled: bool,
    pub dir: String,
    pub name: String,
    pub rotation: LoggingFileRotation,
    #[serde(flatten)]
    pub fmt: LoggingFmt,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingStdout {
    pub enabled: bool,
    #[serde(flatten)]
    pub fmt: LoggingFmt,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFmt {
    pub style: LoggingFmtStyle,
    pub colors: bool,
    pub show_thread_id: bool,
    pub show_source: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFileRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFmtStyle {
    Compact,
    Full,
    Json,
    Pretty,
}

// Origin table created at startup.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Table {
    pub protocol: Protocol,
    pub kind: ProtocolType,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default = "default_true")]
    pub unicast: bool,
    #[serde(default)]
    pub multicast: bool,
}

// Redistribution subscription. The address family follows `prefix`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Redist {
    pub name: String,
    pub source: String,
    pub prefix: IpNetwork,
    #[serde(default = "default_transport")]
    pub transport: RibTransport,
    #[serde(default)]
    pub policy: Option<RedistPolicy>,
}

// ===== impl Config =====

impl Config {
    const DFLT_FILEPATH: &'static str = "/etc/ribflowd.toml";

    pub(crate) fn load(config_file: Option<&str>) -> Config {
        let config_file = config_file.unwrap_or(Config::DFLT_FILEPATH);

        match std::fs::read_to_string(config_file) {
            Ok(config_str) => Config::parse(&config_str)
                .expect("Failed to parse configuration file"),
            Err(err) => {
                eprintln!("Failed to load configuration file: {err}");
                eprintln!("Falling back to default configuration...");
                Config::default()
            }
        }
    }

    fn parse(config_str: &str) -> Result<Config, String> {
        let config: Config =
            toml::from_str(config_str).map_err(|error| error.to_string())?;
        config.rib.validate().map_err(|error| error.to_string())?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            logging: Default::default(),
            rib: Default::default(),
            tables: vec![],
            policy_redist: Default::default(),
            redist: vec![],
        }
    }
}

// ===== impl LoggingFile =====

impl Default for LoggingFile {
    fn default() -> LoggingFile {
        LoggingFile {
            enabled: false,
            dir: "/var/log".to_owned(),
            name: "ribflowd.log".to_owned(),
            rotation: Default::default(),
            fmt: Default::default(),
        }
    }
}

// ===== impl LoggingStdout =====

impl Default for LoggingStdout {
    fn default() -> LoggingStdout {
        LoggingStdout {
            enabled: true,
            fmt: Default::default(),
        }
    }
}

// ===== impl LoggingFmt =====

impl Default for LoggingFmt {
    fn default() -> LoggingFmt {
        LoggingFmt {
            style: LoggingFmtStyle::Full,
            colors: false,
            show_thread_id: false,
            show_source: false,
        }
    }
}

// ===== helper functions =====

fn default_true() -> bool {
    true
}

fn default_transport() -> RibTransport {
    RibTransport::Unicast
}

// ===== unit tests =====
