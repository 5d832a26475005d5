//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;
use std::str::FromStr;

use ipnetwork::IpNetwork;
use ribflow_rib::config::RibConfig;
use ribflow_rib::error::Error;
use ribflow_rib::manager::{RibManager, RibRequest, RibResponse};
use ribflow_rib::policy_redist::{PolicyRedistMsg, PolicyRedistOp};
use ribflow_rib::register::RouteInvalidateMsg;
use ribflow_rib::rib::RibTransport;
use ribflow_utils::UnboundedReceiver;
use ribflow_utils::policy::PolicyTags;
use ribflow_utils::protocol::Protocol;
use serde_json::json;
use tokio::sync::mpsc;

fn new_manager() -> RibManager {
    RibManager::new(&RibConfig::default(), None, None)
}

fn request(
    manager: &mut RibManager,
    request: serde_json::Value,
) -> Result<RibResponse, Error> {
    let request: RibRequest = serde_json::from_value(request).unwrap();
    manager.process_request(request)
}

fn lookup(
    manager: &mut RibManager,
    addr: &str,
    multicast: bool,
) -> Option<IpAddr> {
    let response = request(
        manager,
        json!({
            "op": "lookup-route",
            "addr": addr,
            "unicast": !multicast,
            "multicast": multicast,
        }),
    )
    .unwrap();
    match response {
        RibResponse::Lookup(nexthop) => nexthop,
        response => panic!("unexpected response: {response:?}"),
    }
}

fn ip(s: &str) -> IpAddr {
    IpAddr::from_str(s).unwrap()
}

#[test]
fn request_parsing() {
    let req: RibRequest = serde_json::from_str(
        r#"{"op": "add-route", "protocol": "ospfv2",
            "prefix": "10.0.0.0/8", "nexthop": "192.0.2.1",
            "metric": 20, "policytags": [1, 2]}"#,
    )
    .unwrap();
    let RibRequest::AddRoute(route) = req else {
        panic!("unexpected request: {req:?}");
    };
    assert_eq!(route.protocol, Protocol::OSPFV2);
    assert_eq!(route.metric, 20);
    assert!(route.unicast);
    assert!(!route.multicast);
    assert_eq!(route.policytags, PolicyTags::from_iter([1, 2]));

    let req: RibRequest =
        serde_json::from_str(r#"{"op": "reset-policy-redist-tags"}"#)
            .unwrap();
    assert!(matches!(req, RibRequest::ResetPolicyRedistTags));

    assert!(
        serde_json::from_str::<RibRequest>(r#"{"op": "add-table"}"#).is_err()
    );
}

#[test]
fn route_lifecycle() {
    let mut manager = new_manager();
    request(
        &mut manager,
        json!({"op": "add-igp-table", "protocol": "static"}),
    )
    .unwrap();
    let response = request(
        &mut manager,
        json!({
            "op": "add-route",
            "protocol": "static",
            "prefix": "10.0.0.0/8",
            "nexthop": "192.0.2.1",
        }),
    )
    .unwrap();
    assert_eq!(response, RibResponse::Done);
    assert_eq!(lookup(&mut manager, "10.1.1.1", false), Some(ip("192.0.2.1")));
    assert_eq!(lookup(&mut manager, "10.1.1.1", true), None);

    request(
        &mut manager,
        json!({
            "op": "replace-route",
            "protocol": "static",
            "prefix": "10.0.0.0/8",
            "nexthop": "192.0.2.2",
        }),
    )
    .unwrap();
    assert_eq!(lookup(&mut manager, "10.1.1.1", false), Some(ip("192.0.2.2")));

    // Host bits in the request are ignored.
    request(
        &mut manager,
        json!({
            "op": "delete-route",
            "protocol": "static",
            "prefix": "10.1.2.3/8",
        }),
    )
    .unwrap();
    assert_eq!(lookup(&mut manager, "10.1.1.1", false), None);
}

#[test]
fn ipv6_routes() {
    let mut manager = new_manager();
    request(
        &mut manager,
        json!({"op": "add-igp-table", "protocol": "ripng"}),
    )
    .unwrap();
    request(
        &mut manager,
        json!({
            "op": "add-route",
            "protocol": "ripng",
            "prefix": "2001:db8::/32",
            "nexthop": "fe80::1",
        }),
    )
    .unwrap();

    assert_eq!(lookup(&mut manager, "2001:db8::1", false), Some(ip("fe80::1")));
    assert_eq!(lookup(&mut manager, "10.0.0.1", false), None);
    assert!(manager.ipv4.unicast.origin_chain(Protocol::RIPNG).is_some());
}

#[test]
fn invalid_requests() {
    let mut manager = new_manager();
    request(
        &mut manager,
        json!({"op": "add-igp-table", "protocol": "static"}),
    )
    .unwrap();

    let error = request(
        &mut manager,
        json!({
            "op": "add-route",
            "protocol": "static",
            "prefix": "10.0.0.0/8",
            "nexthop": "192.0.2.1",
            "unicast": false,
        }),
    )
    .unwrap_err();
    assert!(matches!(error, Error::InvalidTransport));

    let error = request(
        &mut manager,
        json!({
            "op": "add-route",
            "protocol": "static",
            "prefix": "10.0.0.0/8",
            "nexthop": "2001:db8::1",
        }),
    )
    .unwrap_err();
    assert!(matches!(error, Error::AddressFamilyMismatch));

    let error = request(
        &mut manager,
        json!({
            "op": "lookup-route",
            "addr": "10.0.0.1",
            "multicast": true,
        }),
    )
    .unwrap_err();
    assert!(matches!(error, Error::InvalidTransport));

    let error = request(
        &mut manager,
        json!({"op": "target-death", "target": "nobody"}),
    )
    .unwrap_err();
    assert!(matches!(error, Error::UnknownTarget(..)));
}

#[test]
fn multicast_failure_rolls_back_unicast() {
    let mut manager = new_manager();
    request(
        &mut manager,
        json!({"op": "add-igp-table", "protocol": "static"}),
    )
    .unwrap();

    // No multicast table for the protocol.
    let error = request(
        &mut manager,
        json!({
            "op": "add-route",
            "protocol": "static",
            "prefix": "10.0.0.0/8",
            "nexthop": "192.0.2.1",
            "multicast": true,
        }),
    )
    .unwrap_err();
    assert!(matches!(error, Error::OriginTableNotFound(Protocol::STATIC)));
    assert_eq!(lookup(&mut manager, "10.0.0.1", false), None);

    request(
        &mut manager,
        json!({
            "op": "add-igp-table",
            "protocol": "static",
            "multicast": true,
        }),
    )
    .unwrap();
    request(
        &mut manager,
        json!({
            "op": "add-route",
            "protocol": "static",
            "prefix": "10.0.0.0/8",
            "nexthop": "192.0.2.1",
            "multicast": true,
        }),
    )
    .unwrap();
    assert_eq!(lookup(&mut manager, "10.0.0.1", false), Some(ip("192.0.2.1")));
    assert_eq!(lookup(&mut manager, "10.0.0.1", true), Some(ip("192.0.2.1")));
}

#[test]
fn policy_redist_tags_apply_everywhere() {
    let (redist_tx, mut redist_rx): (_, UnboundedReceiver<PolicyRedistMsg>) =
        mpsc::unbounded_channel();
    let mut manager =
        RibManager::new(&RibConfig::default(), Some(redist_tx), None);
    request(
        &mut manager,
        json!({
            "op": "add-igp-table",
            "protocol": "static",
            "unicast": false,
            "multicast": true,
        }),
    )
    .unwrap();
    request(
        &mut manager,
        json!({
            "op": "insert-policy-redist-tags",
            "protocol": "isis",
            "policytags": [7],
        }),
    )
    .unwrap();
    request(
        &mut manager,
        json!({
            "op": "add-route",
            "protocol": "static",
            "prefix": "2001:db8::/32",
            "nexthop": "2001:db8::1",
            "policytags": [7],
            "unicast": false,
            "multicast": true,
        }),
    )
    .unwrap();

    let msg = redist_rx.try_recv().unwrap();
    assert_eq!(msg.protocol, Protocol::ISIS);
    assert_eq!(msg.transport, RibTransport::Multicast);
    assert_eq!(msg.op, PolicyRedistOp::Add);
    assert!(redist_rx.try_recv().is_err());

    request(&mut manager, json!({"op": "reset-policy-redist-tags"})).unwrap();
    request(
        &mut manager,
        json!({
            "op": "delete-route",
            "protocol": "static",
            "prefix": "2001:db8::/32",
            "unicast": false,
            "multicast": true,
        }),
    )
    .unwrap();
    assert!(redist_rx.try_recv().is_err());
}

#[tokio::test]
async fn background_work() {
    let mut manager = new_manager();
    request(
        &mut manager,
        json!({
            "op": "add-igp-table",
            "protocol": "ripv2",
            "target": "rip-main",
        }),
    )
    .unwrap();
    request(
        &mut manager,
        json!({
            "op": "add-route",
            "protocol": "ripv2",
            "prefix": "10.0.0.0/8",
            "nexthop": "192.0.2.1",
        }),
    )
    .unwrap();

    request(
        &mut manager,
        json!({"op": "target-death", "target": "rip-main"}),
    )
    .unwrap();

    // The first pass withdraws the route, the second one unplumbs the
    // deletion table.
    assert_eq!(lookup(&mut manager, "10.0.0.1", false), Some(ip("192.0.2.1")));
    manager.process_next_msg().await;
    assert_eq!(lookup(&mut manager, "10.0.0.1", false), None);
    manager.process_next_msg().await;
    assert_eq!(manager.run_until_idle(), 0);
}

#[test]
fn route_interest() {
    let (invalidate_tx, mut invalidate_rx): (
        _,
        UnboundedReceiver<RouteInvalidateMsg>,
    ) = mpsc::unbounded_channel();
    let mut manager =
        RibManager::new(&RibConfig::default(), None, Some(invalidate_tx));
    request(
        &mut manager,
        json!({"op": "add-igp-table", "protocol": "static"}),
    )
    .unwrap();
    request(
        &mut manager,
        json!({
            "op": "add-route",
            "protocol": "static",
            "prefix": "10.0.0.0/8",
            "nexthop": "192.0.2.1",
        }),
    )
    .unwrap();

    let response = request(
        &mut manager,
        json!({
            "op": "register-interest",
            "addr": "10.1.1.1",
            "module": "bgp",
        }),
    )
    .unwrap();
    let subnet = IpNetwork::from_str("10.0.0.0/8").unwrap();
    assert_eq!(
        response,
        RibResponse::Registered {
            subnet,
            nexthop: Some(ip("192.0.2.1")),
        }
    );

    request(
        &mut manager,
        json!({
            "op": "add-route",
            "protocol": "static",
            "prefix": "10.1.0.0/16",
            "nexthop": "192.0.2.2",
        }),
    )
    .unwrap();
    let msg = invalidate_rx.try_recv().unwrap();
    assert_eq!(msg.module, "bgp");
    assert_eq!(msg.subnet, subnet);
    assert_eq!(msg.transport, RibTransport::Unicast);

    // The invalidated registration is gone.
    let error = request(
        &mut manager,
        json!({
            "op": "deregister-interest",
            "subnet": "10.0.0.0/8",
            "module": "bgp",
        }),
    )
    .unwrap_err();
    assert!(matches!(error, Error::RegistrationNotFound(..)));

    let error = request(
        &mut manager,
        json!({
            "op": "register-interest",
            "addr": "10.1.1.1",
            "module": "bgp",
            "multicast": true,
        }),
    )
    .unwrap_err();
    assert!(matches!(error, Error::InvalidTransport));
}

#[test]
fn interfaces() {
    let mut manager = new_manager();
    request(
        &mut manager,
        json!({"op": "add-igp-table", "protocol": "ospfv2"}),
    )
    .unwrap();
    request(&mut manager, json!({"op": "new-vif", "vifname": "eth0"}))
        .unwrap();
    request(
        &mut manager,
        json!({
            "op": "add-vif-address",
            "vifname": "eth0",
            "addr": "192.0.2.10",
            "subnet": "192.0.2.0/24",
        }),
    )
    .unwrap();
    assert_eq!(
        lookup(&mut manager, "192.0.2.99", false),
        Some(ip("192.0.2.10"))
    );

    let error = request(
        &mut manager,
        json!({
            "op": "add-route",
            "protocol": "ospfv2",
            "prefix": "10.0.0.0/8",
            "nexthop": "198.51.100.1",
        }),
    )
    .unwrap_err();
    assert!(matches!(error, Error::NexthopNotConnected(..)));

    let error = request(
        &mut manager,
        json!({
            "op": "add-vif-address",
            "vifname": "eth0",
            "addr": "2001:db8::1",
            "subnet": "192.0.2.0/24",
        }),
    )
    .unwrap_err();
    assert!(matches!(error, Error::AddressFamilyMismatch));

    request(
        &mut manager,
        json!({
            "op": "delete-vif-address",
            "vifname": "eth0",
            "addr": "192.0.2.10",
        }),
    )
    .unwrap();
    assert_eq!(lookup(&mut manager, "192.0.2.99", false), None);
    request(&mut manager, json!({"op": "delete-vif", "vifname": "eth0"}))
        .unwrap();
    let error =
        request(&mut manager, json!({"op": "delete-vif", "vifname": "eth0"}))
            .unwrap_err();
    assert!(matches!(error, Error::VifNotFound(..)));
}
