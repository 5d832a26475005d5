//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use ribflow_rib::error::Error;
use ribflow_rib::table::TableType;

use super::*;

fn count_events(
    events: &[RouteEvent<Ipv4>],
    prefix: &str,
) -> (usize, usize) {
    let prefix = net(prefix);
    let adds = events
        .iter()
        .filter(|event| event.is_add() && event.route().net == prefix)
        .count();
    let deletes = events
        .iter()
        .filter(|event| event.is_delete() && event.route().net == prefix)
        .count();
    (adds, deletes)
}

#[test]
fn restart_preserves_availability() {
    let (mut rib, expect) = new_rib_with_expect();
    rib.add_igp_table(Protocol::STATIC, None);
    for prefix in ["10.0.0.0/8", "10.1.0.0/16", "10.2.0.0/16"] {
        rib.add_route(route_via(prefix, "192.0.2.1", Protocol::STATIC))
            .unwrap();
    }
    take_events(&mut rib, expect);

    rib.delete_origin_table(Protocol::STATIC).unwrap();

    // The route comes back before the background deletion reaches it.
    rib.add_route(route_via("10.1.0.0/16", "192.0.2.2", Protocol::STATIC))
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
    assert_eq!(added.nexthop, addr("192.0.2.2"));

    rib.run_until_idle();
    let events = take_events(&mut rib, expect);
    assert_eq!(count_events(&events, "10.0.0.0/8"), (0, 1));
    assert_eq!(count_events(&events, "10.1.0.0/16"), (0, 0));
    assert_eq!(count_events(&events, "10.2.0.0/16"), (0, 1));

    assert_eq!(
        rib.lookup_route(addr("10.1.0.1")),
        Some(addr("192.0.2.2"))
    );
    assert_eq!(rib.lookup_route(addr("10.2.0.1")), None);
    assert_eq!(
        indexed(&rib, rib.redist_all_table()),
        nets(&["10.1.0.0/16"])
    );
}

#[test]
fn background_deletion_terminates() {
    const N: usize = 64;

    let (mut rib, expect) = new_rib_with_expect();
    let chain = rib.add_igp_table(Protocol::STATIC, None);
    for i in 0..N {
        let prefix = format!("10.{i}.0.0/16");
        rib.add_route(route(&prefix, Protocol::STATIC)).unwrap();
    }
    take_events(&mut rib, expect);

    rib.delete_origin_table(Protocol::STATIC).unwrap();
    let deletion = rib.tables.get(chain.origin).unwrap().next_table().unwrap();
    assert_eq!(rib.tables.table_type(deletion), Some(TableType::DELETION));
    assert_eq!(
        rib.tables.get(chain.redist).unwrap().parents(),
        vec![deletion]
    );

    // Routes are withdrawn from the lookup path only once their deletion
    // is processed.
    assert!(rib.lookup_route(addr("10.0.0.1")).is_some());
    assert!(take_events(&mut rib, expect).is_empty());

    // One route per scheduler turn.
    assert!(rib.run_once());
    assert_eq!(take_events(&mut rib, expect).len(), 1);

    rib.run_until_idle();
    let events = take_events(&mut rib, expect);
    assert_eq!(events.len(), N - 1);
    assert!(events.iter().all(|event| event.is_delete()));

    // The deletion table unplumbed itself.
    assert!(rib.tables.get(deletion).is_none());
    let parents = rib.tables.get(chain.redist).unwrap().parents();
    assert_eq!(parents, vec![chain.origin]);
    assert_eq!(rib.tables.table_type(parents[0]), Some(TableType::ORIGIN));
    assert_eq!(
        rib.tables.get(chain.origin).unwrap().next_table(),
        Some(chain.redist)
    );
    assert!(indexed(&rib, rib.redist_all_table()).is_empty());
}

#[test]
fn new_routes_during_deletion() {
    let (mut rib, expect) = new_rib_with_expect();
    rib.add_igp_table(Protocol::STATIC, None);
    rib.add_route(route("10.0.0.0/8", Protocol::STATIC)).unwrap();
    rib.add_route(route("10.1.0.0/16", Protocol::STATIC)).unwrap();
    rib.delete_origin_table(Protocol::STATIC).unwrap();
    take_events(&mut rib, expect);

    // Routes unrelated to the pending deletions flow straight through.
    rib.add_route(route("172.16.0.0/12", Protocol::STATIC)).unwrap();
    rib.delete_route(Protocol::STATIC, &net("172.16.0.0/12"))
        .unwrap();
    let events = take_events(&mut rib, expect);
    assert_eq!(count_events(&events, "172.16.0.0/12"), (1, 1));

    // Stale routes can't be deleted by the restarted protocol.
    let error = rib
        .delete_route(Protocol::STATIC, &net("10.0.0.0/8"))
        .unwrap_err();
    assert!(matches!(error, Error::RouteNotFound(..)));

    rib.run_until_idle();
    assert!(
        rib.tables
            .iter()
            .all(|(_, table)| table.table_type() != TableType::DELETION)
    );
}

#[test]
fn restart_twice() {
    let (mut rib, expect) = new_rib_with_expect();
    rib.add_igp_table(Protocol::STATIC, None);
    rib.add_route(route("10.0.0.0/8", Protocol::STATIC)).unwrap();
    rib.add_route(route("10.1.0.0/16", Protocol::STATIC)).unwrap();
    rib.delete_origin_table(Protocol::STATIC).unwrap();

    // Second restart before the first deletion finished.
    rib.add_route(route("10.2.0.0/16", Protocol::STATIC)).unwrap();
    rib.delete_origin_table(Protocol::STATIC).unwrap();
    take_events(&mut rib, expect);

    rib.run_until_idle();
    let events = take_events(&mut rib, expect);
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|event| event.is_delete()));
    assert!(indexed(&rib, rib.redist_all_table()).is_empty());
    assert_eq!(
        rib.tables
            .iter()
            .filter(|(_, table)| table.table_type() == TableType::DELETION)
            .count(),
        0
    );
}

#[test]
fn shutdown_empty_table() {
    let mut rib = new_rib();
    let chain = rib.add_igp_table(Protocol::STATIC, None);
    rib.delete_origin_table(Protocol::STATIC).unwrap();
    assert_eq!(
        rib.tables.get(chain.origin).unwrap().next_table(),
        Some(chain.redist)
    );
    assert_eq!(rib.run_until_idle(), 0);
}

#[test]
fn target_death() {
    let mut rib = new_rib();
    rib.add_igp_table(Protocol::RIPV2, Some("rip-main".to_owned()));
    rib.add_route(route("10.0.0.0/8", Protocol::RIPV2)).unwrap();

    rib.target_death("rip-main").unwrap();
    rib.run_until_idle();
    assert_eq!(rib.lookup_route(addr("10.0.0.1")), None);

    let error = rib.target_death("rip-main").unwrap_err();
    assert!(matches!(error, Error::UnknownTarget(..)));
}
