//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use ribflow_rib::error::{Error, OutputError};

use super::*;

const A: &str = "10.0.0.0/8";
const B: &str = "10.1.0.0/16";
const C: &str = "10.2.0.0/16";

// RIB holding routes {A, B, C}, in this dump order.
fn setup() -> Rib<Ipv4> {
    let mut rib = new_rib();
    rib.add_igp_table(Protocol::STATIC, None);
    for prefix in [A, B, C] {
        rib.add_route(route(prefix, Protocol::STATIC)).unwrap();
    }
    rib
}

fn is_dumping(rib: &Rib<Ipv4>, redist_id: RedistributorId) -> bool {
    rib.tables.redistributor(redist_id).unwrap().is_dumping()
}

fn assert_consistent(rib: &Rib<Ipv4>, log: &OutputLog) {
    assert_eq!(log.live(), indexed(rib, rib.redist_all_table()));
}

#[test]
fn dump_existing_routes() {
    let mut rib = setup();
    let (redist_id, log) = attach(&mut rib, &RedistSource::All, "out", false);
    assert!(is_dumping(&rib, redist_id));
    assert_eq!(log.ops(), vec![OutputOp::StartDump]);

    // One route per scheduler turn.
    assert!(rib.run_once());
    assert_eq!(log.ops().len(), 2);

    rib.run_until_idle();
    assert!(!is_dumping(&rib, redist_id));
    assert_eq!(
        log.ops(),
        vec![
            OutputOp::StartDump,
            OutputOp::Add(net(A)),
            OutputOp::Add(net(B)),
            OutputOp::Add(net(C)),
            OutputOp::FinishDump,
        ]
    );

    // Live updates once the dump is over.
    log.clear();
    rib.add_route(route("10.3.0.0/16", Protocol::STATIC)).unwrap();
    rib.delete_route(Protocol::STATIC, &net(A)).unwrap();
    assert_eq!(
        log.ops(),
        vec![OutputOp::Add(net("10.3.0.0/16")), OutputOp::Delete(net(A))]
    );
}

#[test]
fn delete_not_yet_scanned() {
    let (mut rib, expect) = {
        let mut rib = setup();
        let expect = rib.insert_expect_table("expect", rib.final_table());
        (rib, expect)
    };
    let (_, log) = attach(&mut rib, &RedistSource::All, "out", false);
    rib.run_once();
    assert_eq!(log.adds(A), 1);

    rib.delete_route(Protocol::STATIC, &net(B)).unwrap();

    // The table sees one delete; the output never heard of B.
    let events = take_events(&mut rib, expect);
    assert_eq!(events.len(), 1);
    assert!(events[0].is_delete());
    assert_eq!(events[0].route().net, net(B));

    rib.run_until_idle();
    assert_eq!(log.adds(B), 0);
    assert_eq!(log.deletes(B), 0);
    assert_consistent(&rib, &log);
}

#[test]
fn delete_last_dumped() {
    let mut rib = setup();
    let (redist_id, log) = attach(&mut rib, &RedistSource::All, "out", false);
    rib.run_once();
    rib.run_once();
    let redist = rib.tables.redistributor(redist_id).unwrap();
    assert_eq!(redist.last_net(), Some(&net(B)));

    rib.delete_route(Protocol::STATIC, &net(B)).unwrap();
    let redist = rib.tables.redistributor(redist_id).unwrap();
    assert_eq!(redist.last_net(), Some(&net(A)));
    assert_eq!(log.deletes(B), 1);

    rib.run_until_idle();
    assert!(!is_dumping(&rib, redist_id));
    assert_eq!(log.adds(C), 1);
    assert_consistent(&rib, &log);
}

#[test]
fn delete_first_dumped() {
    let mut rib = setup();
    let (redist_id, log) = attach(&mut rib, &RedistSource::All, "out", false);
    rib.run_once();

    // Stepping back from the first network restarts from the beginning.
    rib.delete_route(Protocol::STATIC, &net(A)).unwrap();
    let redist = rib.tables.redistributor(redist_id).unwrap();
    assert_eq!(redist.last_net(), None);

    rib.run_until_idle();
    assert_eq!(log.adds(B), 1);
    assert_eq!(log.adds(C), 1);
    assert_consistent(&rib, &log);
}

#[test]
fn add_after_scan_position() {
    let mut rib = setup();
    let (_, log) = attach(&mut rib, &RedistSource::All, "out", false);
    rib.run_once();

    rib.add_route(route("10.9.0.0/16", Protocol::STATIC)).unwrap();
    assert_eq!(log.adds("10.9.0.0/16"), 0);

    rib.run_until_idle();
    assert_eq!(log.adds("10.9.0.0/16"), 1);
    assert_consistent(&rib, &log);
}

#[test]
fn add_before_scan_position() {
    let mut rib = setup();
    let (_, log) = attach(&mut rib, &RedistSource::All, "out", false);
    rib.run_once();
    rib.run_once();

    // Sorts between A and B: the scan already passed it.
    rib.add_route(route("10.0.0.0/16", Protocol::STATIC)).unwrap();
    assert_eq!(log.adds("10.0.0.0/16"), 1);

    rib.run_until_idle();
    assert_eq!(log.adds("10.0.0.0/16"), 1);
    assert_consistent(&rib, &log);
}

#[test]
fn add_before_scan_starts() {
    let mut rib = setup();
    let (_, log) = attach(&mut rib, &RedistSource::All, "out", false);

    rib.add_route(route("9.0.0.0/8", Protocol::STATIC)).unwrap();
    assert_eq!(log.adds("9.0.0.0/8"), 0);

    rib.run_until_idle();
    assert_eq!(log.adds("9.0.0.0/8"), 1);
    assert_consistent(&rib, &log);
}

#[test]
fn churn_during_dump() {
    let mut rib = setup();
    let (_, log) = attach(&mut rib, &RedistSource::All, "out", false);
    rib.run_once();

    rib.delete_route(Protocol::STATIC, &net(B)).unwrap();
    rib.add_route(route("10.5.0.0/16", Protocol::STATIC)).unwrap();
    rib.run_once();
    rib.add_route(route(B, Protocol::STATIC)).unwrap();
    rib.delete_route(Protocol::STATIC, &net(C)).unwrap();
    rib.add_route(route("10.0.0.0/9", Protocol::STATIC)).unwrap();

    rib.run_until_idle();
    assert_consistent(&rib, &log);
}

#[test]
fn drip_flow_control() {
    const N: usize = 5;

    let mut rib = new_rib();
    rib.add_igp_table(Protocol::STATIC, None);
    for i in 0..N {
        let prefix = format!("10.{i}.0.0/16");
        rib.add_route(route(&prefix, Protocol::STATIC)).unwrap();
    }
    let (redist_id, log) = attach(&mut rib, &RedistSource::All, "out", true);
    let added = |log: &OutputLog| {
        log.ops()
            .iter()
            .filter(|op| matches!(op, OutputOp::Add(_)))
            .count()
    };

    // The output blocks after every route.
    rib.run_until_idle();
    assert_eq!(added(&log), 1);
    assert!(rib.tables.redistributor(redist_id).unwrap().is_blocked());

    for i in 1..N {
        log.low_water();
        rib.run_until_idle();
        assert_eq!(added(&log), i + 1);
        assert!(is_dumping(&rib, redist_id));
    }

    // One more unblock to notice the end of the table.
    log.low_water();
    rib.run_until_idle();
    assert!(!is_dumping(&rib, redist_id));
    assert_eq!(log.ops().last(), Some(&OutputOp::FinishDump));
    assert_consistent(&rib, &log);
}

#[test]
fn fatal_output_error() {
    let mut rib = setup();
    let (redist_id, log) = attach(&mut rib, &RedistSource::All, "out", false);
    rib.run_until_idle();

    log.fatal_error(OutputError::Fatal("connection reset".to_owned()));
    rib.run_until_idle();
    assert!(rib.tables.redistributor(redist_id).is_none());

    log.clear();
    rib.add_route(route("10.3.0.0/16", Protocol::STATIC)).unwrap();
    assert!(log.ops().is_empty());

    // The name can be reused.
    attach(&mut rib, &RedistSource::All, "out", false);
}

#[test]
fn redist_sources() {
    let mut rib = setup();
    rib.add_igp_table(Protocol::OSPFV2, None);
    rib.add_route(route("172.16.0.0/12", Protocol::OSPFV2)).unwrap();

    let (_, all) = attach(&mut rib, &RedistSource::All, "all", false);
    let (_, ospf) =
        attach(&mut rib, &RedistSource::Protocol(Protocol::OSPFV2), "o", false);
    let (_, all_static) =
        attach(&mut rib, &RedistSource::AllOf(Protocol::STATIC), "s", false);
    rib.run_until_idle();

    assert_eq!(all.live().len(), 4);
    assert_eq!(ospf.live(), nets(&["172.16.0.0/12"]));
    assert_eq!(all_static.live().len(), 3);
    assert!(!all_static.live().contains(&net("172.16.0.0/12")));

    let error = rib
        .redist_enable(&RedistSource::All, "all", None, |_| unreachable!())
        .unwrap_err();
    assert!(matches!(error, Error::RedistributorExists(..)));
    let error = rib
        .redist_enable(
            &RedistSource::Protocol(Protocol::ISIS),
            "isis",
            None,
            |_| unreachable!(),
        )
        .unwrap_err();
    assert!(matches!(error, Error::RedistSourceNotFound(..)));

    rib.redist_disable(&RedistSource::All, "all").unwrap();
    let error = rib.redist_disable(&RedistSource::All, "all").unwrap_err();
    assert!(matches!(error, Error::RedistributorNotFound(..)));

    all.clear();
    rib.add_route(route("192.168.0.0/16", Protocol::STATIC)).unwrap();
    assert!(all.ops().is_empty());
    assert_eq!(all_static.adds("192.168.0.0/16"), 1);
}

#[test]
fn redist_with_policy() {
    let mut rib = setup();
    rib.add_egp_table(Protocol::EBGP, None);
    rib.add_route(route_via("172.16.0.0/12", "10.0.0.1", Protocol::EBGP))
        .unwrap();

    let policy = Some(RedistPolicy::Egp);
    let (_, log) =
        attach_with_policy(&mut rib, &RedistSource::All, "egp", policy, false);
    rib.run_until_idle();

    assert_eq!(log.live(), nets(&["172.16.0.0/12"]));
}

#[test]
fn redist_source_names() {
    use std::str::FromStr;

    assert_eq!(RedistSource::from_str("all").unwrap(), RedistSource::All);
    assert_eq!(
        RedistSource::from_str("all-ospfv2").unwrap(),
        RedistSource::AllOf(Protocol::OSPFV2)
    );
    assert_eq!(
        RedistSource::from_str("connected").unwrap(),
        RedistSource::Protocol(Protocol::DIRECT)
    );
    assert!(RedistSource::from_str("all-bogus").is_err());
    assert_eq!(RedistSource::AllOf(Protocol::ISIS).to_string(), "all-isis");
}
