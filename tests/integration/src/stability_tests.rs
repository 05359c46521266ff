//! Stability as seen through the node facade

use crate::test_utils::{init_tracing, memory_node, TestDag};
use dagchain_consensus::{ConsensusError, UnitState};
use dagchain_domain::Address;

#[test]
fn test_majority_on_top_makes_prefix_stable() {
    init_tracing();

    let mut dag = TestDag::new();
    let node = memory_node(&dag.witnesses);
    let units = dag.linear_chain(30);
    for unit in &units {
        node.ingest(unit.clone()).unwrap();
    }

    let later = [units[29].unit.clone()];
    // level k needs a later unit at level k + 13
    for (k, unit) in units.iter().enumerate() {
        assert_eq!(
            node.query_stability(&unit.unit, &later).unwrap(),
            k + 13 <= 29,
            "unit at level {}",
            k
        );
    }

    assert_eq!(node.advance_stability().unwrap(), Some(16));
    assert!(matches!(
        node.unit_state(&units[16].unit).unwrap(),
        UnitState::Stable { mci: 16, on_main_chain: true }
    ));
    assert!(matches!(
        node.unit_state(&units[17].unit).unwrap(),
        UnitState::Assigned { mci: 17, .. }
    ));
}

#[test]
fn test_stability_is_monotonic_as_dag_grows() {
    let mut dag = TestDag::new();
    let node = memory_node(&dag.witnesses);
    let mut units = dag.linear_chain(20);
    for unit in &units {
        node.ingest(unit.clone()).unwrap();
    }
    node.advance_stability().unwrap();

    let stable_now: Vec<String> = units
        .iter()
        .filter(|u| node.query_stability(&u.unit, &[units[19].unit.clone()]).unwrap())
        .map(|u| u.unit.clone())
        .collect();
    assert!(!stable_now.is_empty());

    // a competing branch off genesis and more chain growth
    let side = dag.child(&[&units[0]], 3);
    node.ingest(side.clone()).unwrap();
    dag.extend_chain(&mut units, 10);
    for unit in &units[20..] {
        node.ingest(unit.clone()).unwrap();
    }

    let wider = [units[19].unit.clone(), units[29].unit.clone(), side.unit.clone()];
    for unit in &stable_now {
        assert!(node.query_stability(unit, &wider).unwrap());
    }
    assert!(!node.query_stability(&side.unit, &wider).unwrap());
}

#[test]
fn test_marked_units_survive_witness_rotation() {
    let mut dag = TestDag::new();
    let node = memory_node(&dag.witnesses);
    let units = dag.linear_chain(20);
    for unit in &units {
        node.ingest(unit.clone()).unwrap();
    }
    let last_stable = node.advance_stability().unwrap().unwrap();

    // replace most witnesses with addresses that authored nothing
    for (i, old) in dag.witnesses[..8].iter().enumerate() {
        let new = Address::from_definition(format!("idle-{}", i).as_bytes());
        node.propose_replacement(old.as_str(), new.as_str()).unwrap();
    }

    let later = [units[19].unit.clone()];
    for unit in &units[..=last_stable as usize] {
        assert!(node.query_stability(&unit.unit, &later).unwrap());
    }
    // not yet marked: evaluated against the new snapshot, no majority left
    assert!(!node
        .query_stability(&units[last_stable as usize + 1].unit, &[units[19].unit.clone()])
        .unwrap());
    assert_eq!(node.advance_stability().unwrap(), Some(last_stable));
}

#[test]
fn test_query_edge_cases() {
    let mut dag = TestDag::new();
    let node = memory_node(&dag.witnesses);
    let units = dag.linear_chain(3);
    for unit in &units {
        node.ingest(unit.clone()).unwrap();
    }

    assert!(!node.query_stability(&units[0].unit, &[]).unwrap());
    assert!(matches!(
        node.query_stability("unknown", &[units[2].unit.clone()]),
        Err(ConsensusError::NotFound { .. })
    ));
    assert!(node
        .query_stability(&units[0].unit, &[units[1].unit.clone()])
        .unwrap());
}

#[test]
fn test_marked_unit_needs_an_including_later_unit() {
    let mut dag = TestDag::new();
    let node = memory_node(&dag.witnesses);
    let units = dag.linear_chain(21);
    for unit in &units {
        node.ingest(unit.clone()).unwrap();
    }
    let side = dag.child_by(&[&units[1]], Address::from_definition(b"branch-author"));
    node.ingest(side.clone()).unwrap();
    assert_eq!(node.advance_stability().unwrap(), Some(7));

    let side_view = [side.unit.clone()];
    assert!(matches!(
        node.unit_state(&units[5].unit).unwrap(),
        UnitState::Stable { mci: 5, .. }
    ));
    assert!(!node.query_stability(&units[5].unit, &side_view).unwrap());
    assert!(node.query_stability(&units[1].unit, &side_view).unwrap());
    assert!(node
        .query_stability(&units[5].unit, &[units[20].unit.clone()])
        .unwrap());
}
