//! Main-chain determinism across nodes and arrival orders

use crate::test_utils::{init_tracing, memory_node, TestDag};
use dagchain_consensus::{IngestOutcome, MainChainIndex};
use dagchain_domain::Unit;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Random DAG where each unit references 1-3 of the six most recent units
fn random_dag(dag: &mut TestDag, rng: &mut StdRng, size: usize) -> Vec<Unit> {
    let mut units = vec![dag.genesis()];
    for _ in 0..size {
        let window = units.len().min(6);
        let recent = &units[units.len() - window..];
        let count = rng.gen_range(1..=window.min(3));
        let parents: Vec<&Unit> = recent.choose_multiple(rng, count).collect();
        let author = rng.gen_range(0..dag.witnesses.len());
        let unit = dag.child(&parents, author);
        units.push(unit);
    }
    units
}

fn indices(node: &dagchain_consensus::ConsensusNode, units: &[Unit]) -> Vec<MainChainIndex> {
    units
        .iter()
        .map(|u| node.main_chain_index(&u.unit).unwrap())
        .collect()
}

#[test]
fn test_same_units_any_order_same_indices() {
    init_tracing();

    let mut dag = TestDag::new();
    let mut rng = StdRng::seed_from_u64(0xDA6);
    let units = random_dag(&mut dag, &mut rng, 80);

    let reference = memory_node(&dag.witnesses);
    for unit in &units {
        assert!(matches!(
            reference.ingest(unit.clone()).unwrap(),
            IngestOutcome::Accepted { .. }
        ));
    }
    let expected = indices(&reference, &units);

    for round in 0..5 {
        let mut order = units.clone();
        order.shuffle(&mut rng);

        let node = memory_node(&dag.witnesses);
        for unit in order {
            node.ingest(unit).unwrap();
        }

        assert_eq!(node.status().unwrap().deferred_units, 0, "round {}", round);
        assert_eq!(indices(&node, &units), expected, "round {}", round);
        assert_eq!(node.status().unwrap().tip, reference.status().unwrap().tip);
    }
}

#[test]
fn test_every_unit_assigned_once_merged() {
    let mut dag = TestDag::new();
    let mut rng = StdRng::seed_from_u64(42);
    let mut units = random_dag(&mut dag, &mut rng, 40);

    // one unit referencing every free unit includes the whole DAG
    let node = memory_node(&dag.witnesses);
    for unit in &units {
        node.ingest(unit.clone()).unwrap();
    }
    let has_child = |u: &Unit| units.iter().any(|c| c.parent_units.contains(&u.unit));
    let free: Vec<&Unit> = units.iter().filter(|u| !has_child(u)).collect();
    let merge = dag.child(&free, 0);
    node.ingest(merge.clone()).unwrap();
    units.push(merge);

    let assigned = indices(&node, &units);
    assert!(assigned.iter().all(|m| matches!(m, MainChainIndex::Assigned(_))));

    // indices never decrease along parent links
    for unit in &units {
        let MainChainIndex::Assigned(child_mci) = node.main_chain_index(&unit.unit).unwrap() else {
            unreachable!()
        };
        for parent in &unit.parent_units {
            let MainChainIndex::Assigned(parent_mci) = node.main_chain_index(parent).unwrap() else {
                unreachable!()
            };
            assert!(parent_mci <= child_mci);
        }
    }
}
