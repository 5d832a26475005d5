//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use ribflow_rib::extint::ExtIntTable;
use ribflow_utils::policy::PolicyTags;

use super::*;

const EGP_NET: &str = "172.16.0.0/12";
const EGP_NH: &str = "10.1.1.1";
const STATIC_NH: &str = "192.0.2.1";

fn setup() -> (Rib<Ipv4>, TableId) {
    let (mut rib, expect) = new_rib_with_expect();
    rib.add_igp_table(Protocol::STATIC, None);
    rib.add_egp_table(Protocol::EBGP, None);
    (rib, expect)
}

fn ext_int(rib: &Rib<Ipv4>) -> &ExtIntTable<Ipv4> {
    rib.as_ext_int().unwrap()
}

fn assert_event(
    event: &RouteEvent<Ipv4>,
    add: bool,
    prefix: &str,
    nexthop: &str,
) {
    assert_eq!(event.is_add(), add, "unexpected event: {event:?}");
    assert_eq!(event.route().net, net(prefix));
    assert_eq!(event.route().nexthop, addr(nexthop));
}

#[test]
fn egp_route_waits_for_nexthop() {
    let (mut rib, expect) = setup();

    rib.add_route(route_via(EGP_NET, EGP_NH, Protocol::EBGP))
        .unwrap();
    assert!(take_events(&mut rib, expect).is_empty());
    assert!(ext_int(&rib).is_unresolved(&net(EGP_NET)));
    assert_eq!(rib.lookup_route(addr("172.16.1.1")), None);

    // An IGP route that doesn't cover the next-hop changes nothing.
    rib.add_route(route_via("10.2.0.0/16", STATIC_NH, Protocol::STATIC))
        .unwrap();
    let events = take_events(&mut rib, expect);
    assert_eq!(events.len(), 1);
    assert_event(&events[0], true, "10.2.0.0/16", STATIC_NH);
    assert!(ext_int(&rib).is_unresolved(&net(EGP_NET)));
}

#[test]
fn egp_route_announced_once_resolved() {
    let (mut rib, expect) = setup();
    rib.add_route(route_via(EGP_NET, EGP_NH, Protocol::EBGP))
        .unwrap();

    rib.add_route(route_via("10.0.0.0/8", STATIC_NH, Protocol::STATIC))
        .unwrap();
    let events = take_events(&mut rib, expect);
    assert_eq!(events.len(), 2);
    assert_event(&events[0], true, "10.0.0.0/8", STATIC_NH);
    assert_event(&events[1], true, EGP_NET, STATIC_NH);
    assert_eq!(events[1].route().protocol, Protocol::EBGP);

    let resolved = ext_int(&rib).resolved_route(&net(EGP_NET)).unwrap();
    assert_eq!(resolved.igp_net, net("10.0.0.0/8"));
    assert_eq!(resolved.egp_route.nexthop, addr(EGP_NH));
    assert_eq!(ext_int(&rib).unresolved_count(), 0);
    assert_eq!(rib.lookup_route(addr("172.16.1.1")), Some(addr(STATIC_NH)));

    // Added after the IGP route, it resolves right away.
    rib.add_route(route_via("172.32.0.0/12", EGP_NH, Protocol::EBGP))
        .unwrap();
    let events = take_events(&mut rib, expect);
    assert_eq!(events.len(), 1);
    assert_event(&events[0], true, "172.32.0.0/12", STATIC_NH);
}

#[test]
fn egp_route_withdrawn_with_igp_route() {
    let (mut rib, expect) = setup();
    rib.add_route(route_via("10.0.0.0/8", STATIC_NH, Protocol::STATIC))
        .unwrap();
    rib.add_route(route_via(EGP_NET, EGP_NH, Protocol::EBGP))
        .unwrap();
    take_events(&mut rib, expect);

    rib.delete_route(Protocol::STATIC, &net("10.0.0.0/8")).unwrap();
    let events = take_events(&mut rib, expect);
    assert_eq!(events.len(), 2);
    assert_event(&events[0], false, EGP_NET, STATIC_NH);
    assert_event(&events[1], false, "10.0.0.0/8", STATIC_NH);
    assert!(ext_int(&rib).is_unresolved(&net(EGP_NET)));
    assert_eq!(rib.lookup_route(addr("172.16.1.1")), None);

    // Deleting a route still waiting for its next-hop is silent.
    rib.delete_route(Protocol::EBGP, &net(EGP_NET)).unwrap();
    assert!(take_events(&mut rib, expect).is_empty());
    assert_eq!(ext_int(&rib).unresolved_count(), 0);
}

#[test]
fn more_specific_igp_route_takes_over() {
    let (mut rib, expect) = setup();
    rib.add_route(route_via("10.0.0.0/8", STATIC_NH, Protocol::STATIC))
        .unwrap();
    rib.add_route(route_via(EGP_NET, EGP_NH, Protocol::EBGP))
        .unwrap();
    take_events(&mut rib, expect);

    rib.add_route(route_via("10.1.0.0/16", "192.0.2.2", Protocol::STATIC))
        .unwrap();
    let events = take_events(&mut rib, expect);
    assert_eq!(events.len(), 3);
    assert_event(&events[0], true, "10.1.0.0/16", "192.0.2.2");
    assert_event(&events[1], false, EGP_NET, STATIC_NH);
    assert_event(&events[2], true, EGP_NET, "192.0.2.2");
    let resolved = ext_int(&rib).resolved_route(&net(EGP_NET)).unwrap();
    assert_eq!(resolved.igp_net, net("10.1.0.0/16"));

    // Back to the less specific route.
    rib.delete_route(Protocol::STATIC, &net("10.1.0.0/16")).unwrap();
    let events = take_events(&mut rib, expect);
    assert_eq!(events.len(), 3);
    assert_event(&events[0], false, EGP_NET, "192.0.2.2");
    assert_event(&events[1], false, "10.1.0.0/16", "192.0.2.2");
    assert_event(&events[2], true, EGP_NET, STATIC_NH);
}

#[test]
fn admin_distance_across_sides() {
    let (mut rib, expect) = new_rib_with_expect();
    rib.add_igp_table(Protocol::RIPV2, None);
    rib.add_egp_table(Protocol::EBGP, None);
    let rip_nh = "192.0.2.120";
    rib.add_route(route_via("203.0.113.0/24", rip_nh, Protocol::RIPV2))
        .unwrap();
    take_events(&mut rib, expect);

    // EBGP beats RIP for the same network.
    rib.add_route(route_via("10.0.0.0/8", "203.0.113.1", Protocol::EBGP))
        .unwrap();
    rib.add_route(route_via("10.0.0.0/8", rip_nh, Protocol::RIPV2))
        .unwrap();
    let events = take_events(&mut rib, expect);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].route().protocol, Protocol::EBGP);

    rib.delete_route(Protocol::EBGP, &net("10.0.0.0/8")).unwrap();
    let events = take_events(&mut rib, expect);
    assert_eq!(events.len(), 2);
    assert!(!events[0].is_add());
    assert_eq!(events[0].route().protocol, Protocol::EBGP);
    assert!(events[1].is_add());
    assert_eq!(events[1].route().protocol, Protocol::RIPV2);

    rib.add_route(route_via("10.0.0.0/8", "203.0.113.1", Protocol::EBGP))
        .unwrap();
    let events = take_events(&mut rib, expect);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].route().protocol, Protocol::RIPV2);
    assert_eq!(events[1].route().protocol, Protocol::EBGP);
    let found = rib.lookup_route_exact(&net("10.0.0.0/8")).unwrap();
    assert_eq!(found.protocol, Protocol::EBGP);
}

#[test]
fn ties_go_to_igp() {
    let (mut rib, expect) = new_rib_with_expect();
    rib.set_protocol_admin_distance(Protocol::EBGP, 1).unwrap();
    rib.add_igp_table(Protocol::STATIC, None);
    rib.add_egp_table(Protocol::EBGP, None);
    rib.add_route(route_via("10.0.0.0/8", STATIC_NH, Protocol::STATIC))
        .unwrap();
    take_events(&mut rib, expect);

    rib.add_route(route_via("10.0.0.0/8", EGP_NH, Protocol::EBGP))
        .unwrap();
    assert!(take_events(&mut rib, expect).is_empty());
    let found = rib.lookup_route_exact(&net("10.0.0.0/8")).unwrap();
    assert_eq!(found.protocol, Protocol::STATIC);
}

#[test]
fn policytags_follow_resolution() {
    let (mut rib, expect) = setup();
    rib.add_route(route_via(EGP_NET, EGP_NH, Protocol::EBGP))
        .unwrap();
    let tags = [5].into_iter().collect::<PolicyTags>();

    // Nothing downstream knows the unresolved route.
    rib.set_route_policytags(Protocol::EBGP, &net(EGP_NET), tags.clone())
        .unwrap();
    assert!(take_events(&mut rib, expect).is_empty());

    // The tags survive resolution.
    rib.add_route(route_via("10.0.0.0/8", STATIC_NH, Protocol::STATIC))
        .unwrap();
    let events = take_events(&mut rib, expect);
    assert_eq!(events[1].route().policytags, tags);

    let tags = [6].into_iter().collect::<PolicyTags>();
    rib.set_route_policytags(Protocol::EBGP, &net(EGP_NET), tags.clone())
        .unwrap();
    let events = take_events(&mut rib, expect);
    assert_eq!(events.len(), 1);
    let RouteEvent::ReplacePolicyTags(route, prevtags) = &events[0] else {
        panic!("unexpected event: {:?}", events[0]);
    };
    assert_eq!(route.nexthop, addr(STATIC_NH));
    assert_eq!(route.policytags, tags);
    assert!(prevtags.contains(5));
}
