//! Node restart from persisted SQLite state

use crate::test_utils::{init_tracing, sqlite_config, TestDag};
use dagchain_consensus::{ConsensusNode, IngestOutcome, MainChainIndex, UnitState};
use dagchain_domain::Address;

#[test]
fn test_restart_preserves_graph_stability_and_witnesses() {
    init_tracing();

    let mut dag = TestDag::new();
    let (config, data_dir) = sqlite_config(&dag.witnesses);
    let mut units = dag.linear_chain(26);
    let fresh = Address::from_definition(b"restart-fresh");

    let (status, indices) = {
        let node = ConsensusNode::open(&config).unwrap();
        for unit in &units {
            node.ingest(unit.clone()).unwrap();
        }
        assert_eq!(node.advance_stability().unwrap(), Some(12));
        node.propose_replacement(dag.witnesses[11].as_str(), fresh.as_str())
            .unwrap();

        let indices: Vec<MainChainIndex> = units
            .iter()
            .map(|u| node.main_chain_index(&u.unit).unwrap())
            .collect();
        (node.status().unwrap(), indices)
    };

    let node = ConsensusNode::open(&config).unwrap();
    let reopened = node.status().unwrap();
    assert_eq!(reopened.units, status.units);
    assert_eq!(reopened.tip, status.tip);
    assert_eq!(reopened.last_stable_mci, Some(12));
    assert_eq!(reopened.witnesses, status.witnesses);
    assert!(reopened.witnesses.contains(&fresh.to_string()));

    for (unit, expected) in units.iter().zip(&indices) {
        assert_eq!(node.main_chain_index(&unit.unit).unwrap(), *expected);
    }
    assert!(matches!(
        node.unit_state(&units[12].unit).unwrap(),
        UnitState::Stable { mci: 12, .. }
    ));

    // ingestion continues where it left off
    assert!(matches!(
        node.ingest(units[25].clone()).unwrap(),
        IngestOutcome::AlreadyKnown { .. }
    ));
    dag.extend_chain(&mut units, 3);
    for unit in &units[26..] {
        node.ingest(unit.clone()).unwrap();
    }
    assert_eq!(
        node.main_chain_index(&units[28].unit).unwrap(),
        MainChainIndex::Assigned(28)
    );

    drop(node);
    std::fs::remove_dir_all(data_dir).ok();
}

#[test]
fn test_initial_witnesses_ignored_once_persisted() {
    let dag = TestDag::new();
    let (mut config, data_dir) = sqlite_config(&dag.witnesses);

    {
        let node = ConsensusNode::open(&config).unwrap();
        assert_eq!(node.get_current_witnesses().unwrap().addresses(), dag.witnesses.as_slice());
    }

    config.witnesses.initial.clear();
    let node = ConsensusNode::open(&config).unwrap();
    assert_eq!(node.get_current_witnesses().unwrap().addresses(), dag.witnesses.as_slice());

    drop(node);
    std::fs::remove_dir_all(data_dir).ok();
}
