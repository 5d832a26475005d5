//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod config;

use std::io::BufRead;
use std::str::FromStr;

use clap::{App, Arg};
use config::{Config, LoggingFileRotation, LoggingFmtStyle, Redist, Table};
use ribflow_rib::error::Error;
use ribflow_rib::manager::{RibManager, RibRequest};
use ribflow_rib::output::{
    RedistOp, RedistOutput, RedistQueueOutput, RedistRequest,
};
use ribflow_rib::policy_redist::PolicyRedistMsg;
use ribflow_rib::register::RouteInvalidateMsg;
use ribflow_rib::rib::{RedistSource, Rib};
use ribflow_rib::version::{Ipv4, Ipv6, Version};
use ribflow_utils::ip::IpNetworkKind;
use ribflow_utils::protocol::ProtocolType;
use ribflow_utils::task::Task;
use ribflow_utils::{Receiver, UnboundedReceiver, UnboundedSender};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::level_filters::LevelFilter;
use tracing::{Instrument, debug, debug_span, error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::prelude::*;

fn init_tracing(config: &config::Logging) {
    // Enable logging to a file.
    let file = config.file.enabled.then(|| {
        let file_appender = match config.file.rotation {
            LoggingFileRotation::Never => {
                rolling::never(&config.file.dir, &config.file.name)
            }
            LoggingFileRotation::Hourly => {
                rolling::hourly(&config.file.dir, &config.file.name)
            }
            LoggingFileRotation::Daily => {
                rolling::daily(&config.file.dir, &config.file.name)
            }
        };

        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(false)
            .with_thread_ids(config.file.fmt.show_thread_id)
            .with_file(config.file.fmt.show_source)
            .with_line_number(config.file.fmt.show_source)
            .with_ansi(config.file.fmt.colors);
        let layer = match config.file.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    // Enable logging to stdout.
    let stdout = config.stdout.enabled.then(|| {
        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(config.stdout.fmt.show_thread_id)
            .with_file(config.stdout.fmt.show_source)
            .with_line_number(config.stdout.fmt.show_source)
            .with_ansi(config.stdout.fmt.colors);
        let layer = match config.stdout.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(
            "ribflow=debug".parse().expect("invalid default directive"),
        )
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(file)
        .with(stdout)
        .init();
}

fn signal_listener() -> Receiver<()> {
    let (signal_tx, signal_rx) = mpsc::channel(1);

    tokio::task::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).unwrap();
        let mut sigterm = signal(SignalKind::terminate()).unwrap();

        tokio::select! {
            _ = sigint.recv() => {
                info!("received SIGINT");
                let _ = signal_tx.send(()).await;
            },
            _ = sigterm.recv() => {
                info!("received SIGTERM");
                let _ = signal_tx.send(()).await;
            }
        }
    });

    signal_rx
}

// Reads one JSON request per line from the given file, or from stdin.
//
// Blocking reads run on a dedicated thread. The channel closes once the
// input is exhausted.
fn request_reader(path: Option<String>) -> UnboundedReceiver<RibRequest> {
    let (request_tx, request_rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let reader: Box<dyn BufRead> = match &path {
            Some(path) => match std::fs::File::open(path) {
                Ok(file) => Box::new(std::io::BufReader::new(file)),
                Err(error) => {
                    error!(%path, %error, "failed to open request file");
                    return;
                }
            },
            None => Box::new(std::io::stdin().lock()),
        };
        read_requests(reader, &request_tx);
    });

    request_rx
}

fn read_requests(
    reader: impl BufRead,
    request_tx: &UnboundedSender<RibRequest>,
) {
    for (lineno, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(error) => {
                error!(%error, "failed to read request");
                return;
            }
        };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match serde_json::from_str::<RibRequest>(line) {
            Ok(request) => {
                if request_tx.send(request).is_err() {
                    return;
                }
            }
            Err(error) => {
                warn!(line = lineno + 1, %error, "invalid request");
            }
        }
    }
}

// Spawns the redistribution target of a subscription. Every request is
// logged and acknowledged.
fn spawn_redist_target<V>(
    name: &str,
    mut request_rx: Receiver<RedistRequest<V>>,
) -> Task<()>
where
    V: Version,
{
    let span = debug_span!("redist-target", %name);
    Task::spawn(
        async move {
            while let Some(request) = request_rx.recv().await {
                match &request.op {
                    RedistOp::AddRoute(route) => {
                        info!(cookie = %request.cookie, %route, "add");
                    }
                    RedistOp::DeleteRoute(route) => {
                        info!(cookie = %request.cookie, %route, "delete");
                    }
                    RedistOp::StartingRouteDump => {
                        debug!(cookie = %request.cookie, "dump starting");
                    }
                    RedistOp::FinishingRouteDump => {
                        debug!(cookie = %request.cookie, "dump finished");
                    }
                }
                let _ = request.responder.send(Ok(()));
            }
        }
        .instrument(span),
    )
}

// Subscribes a target to a redistribution source of the given RIB.
fn subscribe<V>(rib: &mut Rib<V>, redist: &Redist) -> Result<(), Error>
where
    V: Version,
{
    let Some(prefix) = V::IpNetwork::get(redist.prefix) else {
        return Err(Error::AddressFamilyMismatch);
    };
    let source = RedistSource::from_str(&redist.source)?;
    let config = rib.config.redist_output.clone();
    let (request_tx, request_rx) = mpsc::channel(config.channel_size);

    let policy = redist.policy.clone();
    rib.redist_enable(&source, &redist.name, policy, |events| {
        let output = RedistQueueOutput::new(
            redist.name.clone(),
            redist.source.clone(),
            prefix,
            config,
            events,
            request_tx,
        );
        Box::new(output) as Box<dyn RedistOutput<V>>
    })?;

    let mut target = spawn_redist_target(&redist.name, request_rx);
    target.detach();
    Ok(())
}

// Applies the startup configuration to the RIBs.
fn configure(manager: &mut RibManager, config: &Config) {
    for table in &config.tables {
        let request = match table.kind {
            ProtocolType::Igp => RibRequest::AddIgpTable {
                protocol: table.protocol,
                target: table.target.clone(),
                unicast: table.unicast,
                multicast: table.multicast,
            },
            ProtocolType::Egp => RibRequest::AddEgpTable {
                protocol: table.protocol,
                target: table.target.clone(),
                unicast: table.unicast,
                multicast: table.multicast,
            },
        };
        if let Err(error) = manager.process_request(request) {
            error.log();
        }
    }

    for (protocol, tags) in &config.policy_redist {
        let request = RibRequest::InsertPolicyRedistTags {
            protocol: *protocol,
            policytags: tags.iter().copied().collect(),
        };
        if let Err(error) = manager.process_request(request) {
            error.log();
        }
    }

    for redist in &config.redist {
        let result = if redist.prefix.is_ipv4() {
            subscribe::<Ipv4>(manager.ipv4.get_mut(redist.transport), redist)
        } else {
            subscribe::<Ipv6>(manager.ipv6.get_mut(redist.transport), redist)
        };
        if let Err(error) = result {
            error!(name = %redist.name, %error, "failed to subscribe");
        }
    }

    for table in &config.tables {
        log_chain(&manager.ipv4.unicast, table);
        log_chain(&manager.ipv4.multicast, table);
        log_chain(&manager.ipv6.unicast, table);
        log_chain(&manager.ipv6.multicast, table);
    }
}

fn log_chain<V>(rib: &Rib<V>, table: &Table)
where
    V: Version,
{
    if let Some(chain) = rib.origin_chain(table.protocol) {
        debug!(
            family = %V::ADDRESS_FAMILY,
            transport = %rib.transport,
            chain = %rib.tables.describe_chain(chain.origin),
            "table chain"
        );
    }
}

// Logs a route selected for redistribution by policy.
fn policy_redist(msg: PolicyRedistMsg) {
    info!(
        protocol = %msg.protocol,
        transport = %msg.transport,
        op = ?msg.op,
        prefix = %msg.prefix,
        nexthop = %msg.nexthop,
        origin = %msg.origin,
        metric = %msg.metric,
        "policy redistribution"
    );
}

// Logs a route interest registration that no longer holds.
fn route_invalidate(msg: RouteInvalidateMsg) {
    info!(
        module = %msg.module,
        transport = %msg.transport,
        subnet = %msg.subnet,
        "route interest invalidated"
    );
}

async fn run(config: Config, requests: Option<String>, exit_on_eof: bool) {
    // Spawn signal listener.
    let mut signal_rx = signal_listener();

    let (policy_redist_tx, mut policy_redist_rx) = mpsc::unbounded_channel();
    let (invalidate_tx, mut invalidate_rx) = mpsc::unbounded_channel();
    let mut manager = RibManager::new(
        &config.rib,
        Some(policy_redist_tx),
        Some(invalidate_tx),
    );
    configure(&mut manager, &config);

    let mut request_rx = request_reader(requests);
    let mut requests_open = true;
    loop {
        tokio::select! {
            request = request_rx.recv(), if requests_open => {
                match request {
                    Some(request) => {
                        match manager.process_request(request) {
                            Ok(response) => debug!(?response, "request done"),
                            Err(error) => error.log(),
                        }
                    }
                    None => {
                        info!("end of requests");
                        requests_open = false;
                        if exit_on_eof {
                            manager.run_until_idle();
                            return;
                        }
                    }
                }
            }
            _ = manager.process_next_msg() => {}
            Some(msg) = policy_redist_rx.recv() => {
                policy_redist(msg);
            }
            Some(msg) = invalidate_rx.recv() => {
                route_invalidate(msg);
            }
            _ = signal_rx.recv() => {
                return;
            }
        }
    }
}

fn build_version() -> String {
    env!("CARGO_PKG_VERSION").to_owned()
}

// ===== main =====

fn main() {
    // Parse command-line parameters.
    let version = build_version();
    let matches = App::new("RIB route-table pipeline daemon")
        .version(version.as_str())
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("file")
                .help("Specify an alternative configuration file."),
        )
        .arg(
            Arg::with_name("exit-on-eof")
                .short("x")
                .long("exit-on-eof")
                .help("Exit once all requests were processed."),
        )
        .arg(
            Arg::with_name("requests")
                .value_name("requests")
                .help("File of JSON requests, one per line (default: stdin)."),
        )
        .get_matches();

    // Read configuration file.
    let config_file = matches.value_of("config");
    let config = Config::load(config_file);
    let requests = matches.value_of("requests").map(str::to_owned);
    let exit_on_eof = matches.is_present("exit-on-eof");

    // Initialize tracing.
    init_tracing(&config.logging);

    // We're ready to go!
    info!("starting up");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create async runtime")
        .block_on(run(config, requests, exit_on_eof));

    info!("exiting");
}

// ===== unit tests =====
