//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use ribflow_rib::error::Error;

use super::*;

#[test]
fn duplicate_add_rejected() {
    let mut rib = new_rib();
    let chain = rib.add_igp_table(Protocol::STATIC, None);

    rib.add_route(route("10.0.0.0/8", Protocol::STATIC)).unwrap();
    let error = rib
        .add_route(route("10.0.0.0/8", Protocol::STATIC))
        .unwrap_err();
    assert!(matches!(error, Error::RouteExists(Protocol::STATIC, _)));

    // Host bits don't make a different network.
    let error = rib
        .add_route(route("10.1.2.3/8", Protocol::STATIC))
        .unwrap_err();
    assert!(matches!(error, Error::RouteExists(..)));

    let origin = rib
        .tables
        .get(chain.origin)
        .and_then(Table::as_origin)
        .unwrap();
    assert_eq!(origin.route_count(), 1);
    assert_eq!(indexed(&rib, rib.redist_all_table()).len(), 1);
}

#[test]
fn caller_errors() {
    let mut rib = new_rib();

    let error = rib
        .add_route(route("10.0.0.0/8", Protocol::STATIC))
        .unwrap_err();
    assert!(matches!(error, Error::OriginTableNotFound(Protocol::STATIC)));

    rib.add_igp_table(Protocol::STATIC, None);
    let error = rib
        .delete_route(Protocol::STATIC, &net("10.0.0.0/8"))
        .unwrap_err();
    assert!(matches!(error, Error::RouteNotFound(..)));

    let error = rib
        .set_route_policytags(
            Protocol::STATIC,
            &net("10.0.0.0/8"),
            [1].into_iter().collect(),
        )
        .unwrap_err();
    assert!(matches!(error, Error::RouteNotFound(..)));
}

#[test]
#[should_panic]
fn caller_errors_fatal() {
    let config = RibConfig {
        errors_are_fatal: true,
        ..Default::default()
    };
    let mut rib = Rib::<Ipv4>::new(RibTransport::Unicast, config, None, None);
    rib.add_igp_table(Protocol::STATIC, None);
    let _ = rib.delete_route(Protocol::STATIC, &net("10.0.0.0/8"));
}

#[test]
fn add_table_twice() {
    let mut rib = new_rib();
    let first = rib.add_igp_table(Protocol::STATIC, None);
    let second = rib.add_igp_table(Protocol::STATIC, None);
    assert_eq!(first.origin, second.origin);
    assert_eq!(first.redist, second.redist);
}

#[test]
fn longest_prefix_match() {
    let mut rib = new_rib();
    rib.add_igp_table(Protocol::STATIC, None);
    rib.add_route(route_via("10.0.0.0/8", "192.0.2.1", Protocol::STATIC))
        .unwrap();
    rib.add_route(route_via("10.3.0.0/16", "192.0.2.2", Protocol::STATIC))
        .unwrap();

    assert_eq!(rib.lookup_route(addr("10.3.5.5")), Some(addr("192.0.2.2")));
    assert_eq!(rib.lookup_route(addr("10.1.1.1")), Some(addr("192.0.2.1")));
    assert_eq!(rib.lookup_route(addr("11.0.0.1")), None);

    let found = rib.lookup_route_exact(&net("10.3.0.0/16")).unwrap();
    assert_eq!(found.nexthop, addr("192.0.2.2"));
    assert!(rib.lookup_route_exact(&net("10.3.0.0/24")).is_none());
}

#[test]
fn route_ranges() {
    let mut rib = new_rib();
    rib.add_igp_table(Protocol::STATIC, None);
    rib.add_route(route("10.0.0.0/8", Protocol::STATIC)).unwrap();
    rib.add_route(route("10.3.0.0/16", Protocol::STATIC)).unwrap();

    let rr = rib.route_range_lookup(addr("10.1.1.1"));
    assert_eq!(rr.route.as_ref().unwrap().net, net("10.0.0.0/8"));
    assert_eq!(rr.bottom, addr("10.0.0.0"));
    assert_eq!(rr.top, addr("10.2.255.255"));

    let rr = rib.route_range_lookup(addr("10.3.5.5"));
    assert_eq!(rr.route.as_ref().unwrap().net, net("10.3.0.0/16"));
    assert_eq!(rr.minimal_subnet(), net("10.3.0.0/16"));

    // Uncovered address: the range stops at the nearest stored prefix.
    let rr = rib.route_range_lookup(addr("9.1.1.1"));
    assert!(rr.route.is_none());
    assert_eq!(rr.bottom, addr("0.0.0.0"));
    assert_eq!(rr.top, addr("9.255.255.255"));
}

#[test]
fn admin_distance() {
    let mut rib = new_rib();
    rib.set_protocol_admin_distance(Protocol::STATIC, 5).unwrap();
    rib.add_igp_table(Protocol::STATIC, None);
    rib.add_igp_table(Protocol::OSPFV2, None);
    rib.add_route(route("10.0.0.0/8", Protocol::STATIC)).unwrap();
    rib.add_route(route("10.1.0.0/16", Protocol::OSPFV2)).unwrap();

    let found = rib.lookup_route_entry(addr("10.0.0.1")).unwrap();
    assert_eq!(found.admin_distance, 5);
    let found = rib.lookup_route_entry(addr("10.1.0.1")).unwrap();
    assert_eq!(found.admin_distance, 110);

    let error = rib
        .set_protocol_admin_distance(Protocol::STATIC, 10)
        .unwrap_err();
    assert!(matches!(error, Error::AdminDistanceLocked(Protocol::STATIC)));
}

#[test]
fn replace_route() {
    let (mut rib, expect) = new_rib_with_expect();
    rib.add_igp_table(Protocol::STATIC, None);
    rib.add_route(route_via("10.0.0.0/8", "192.0.2.1", Protocol::STATIC))
        .unwrap();
    take_events(&mut rib, expect);

    rib.replace_route(route_via("10.0.0.0/8", "192.0.2.9", Protocol::STATIC))
        .unwrap();
    let events = take_events(&mut rib, expect);
    assert_eq!(events.len(), 2);
    let RouteEvent::Delete(deleted) = &events[0] else {
        panic!("unexpected event: {:?}", events[0]);
    };
    assert_eq!(deleted.nexthop, addr("192.0.2.1"));
    let RouteEvent::Add(added) = &events[1] else {
        panic!("unexpected event: {:?}", events[1]);
    };
    assert_eq!(added.nexthop, addr("192.0.2.9"));
    assert_eq!(rib.lookup_route(addr("10.0.0.1")), Some(addr("192.0.2.9")));

    // Replacing a missing route fails without side effects.
    assert!(
        rib.replace_route(route("10.9.0.0/16", Protocol::STATIC))
            .is_err()
    );
    assert!(take_events(&mut rib, expect).is_empty());
}

#[test]
fn expected_updates() {
    let (mut rib, expect) = new_rib_with_expect();
    rib.add_igp_table(Protocol::STATIC, None);

    let mut added = route("10.0.0.0/8", Protocol::STATIC);
    added.admin_distance = 1;
    let table = rib.expect_table_mut(expect).unwrap();
    table.expect_add(added.clone());
    table.expect_delete(added);

    rib.add_route(route("10.0.0.0/8", Protocol::STATIC)).unwrap();
    rib.delete_route(Protocol::STATIC, &net("10.0.0.0/8")).unwrap();
    assert!(rib.expect_table_mut(expect).unwrap().expected_done());
}
