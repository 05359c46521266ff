//! Test utilities for DagChain integration tests

use dagchain_consensus::ConsensusNode;
use dagchain_core::Config;
use dagchain_domain::{Address, Unit, COUNT_WITNESSES};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp in milliseconds
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// Deterministic witness list `W0..W11`
pub fn witness_list() -> Vec<Address> {
    (0..COUNT_WITNESSES)
        .map(|i| Address::from_definition(format!("integration-witness-{}", i).as_bytes()))
        .collect()
}

/// Builds sealed units on top of a fixed witness list
pub struct TestDag {
    pub witnesses: Vec<Address>,
    clock: u64,
}

impl TestDag {
    pub fn new() -> Self {
        Self {
            witnesses: witness_list(),
            clock: current_timestamp_ms(),
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Genesis authored by `W0`, declaring the witness list
    pub fn genesis(&mut self) -> Unit {
        let ts = self.tick();
        Unit::new(vec![], vec![self.witnesses[0].clone()], Some(self.witnesses.clone()), ts)
            .seal()
            .unwrap()
    }

    /// Unit authored by witness `author`
    pub fn child(&mut self, parents: &[&Unit], author: usize) -> Unit {
        let author = self.witnesses[author].clone();
        self.child_by(parents, author)
    }

    pub fn child_by(&mut self, parents: &[&Unit], author: Address) -> Unit {
        let ts = self.tick();
        Unit::new(parents.iter().map(|p| p.unit.clone()).collect(), vec![author], None, ts)
            .seal()
            .unwrap()
    }

    /// Genesis plus `len - 1` units; unit `k` is authored by `W(k % 12)`
    pub fn linear_chain(&mut self, len: usize) -> Vec<Unit> {
        let mut units = vec![self.genesis()];
        self.extend_chain(&mut units, len.saturating_sub(1));
        units
    }

    pub fn extend_chain(&mut self, units: &mut Vec<Unit>, count: usize) {
        for _ in 0..count {
            let k = units.len();
            let unit = self.child(&[&units[k - 1]], k % COUNT_WITNESSES);
            units.push(unit);
        }
    }
}

impl Default for TestDag {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory node bootstrapped with `witnesses`
pub fn memory_node(witnesses: &[Address]) -> ConsensusNode {
    let mut config = Config::in_memory();
    config.witnesses.initial = witnesses.iter().map(|w| w.to_string()).collect();
    ConsensusNode::open(&config).unwrap()
}

/// SQLite-backed config under a fresh temp directory
pub fn sqlite_config(witnesses: &[Address]) -> (Config, PathBuf) {
    let data_dir = std::env::temp_dir().join(format!("dagchain_{}", uuid::Uuid::new_v4()));
    let mut config = Config::default_config();
    config.storage.data_dir = data_dir.clone();
    config.witnesses.initial = witnesses.iter().map(|w| w.to_string()).collect();
    (config, data_dir)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}
