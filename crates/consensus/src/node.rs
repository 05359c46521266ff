//! Consensus node facade
//!
//! Wires the unit store, witness registry, chain builder and stability
//! oracle together behind the operations a node exposes. The builder sits
//! behind an `RwLock`: ingestion and stability advancement take it
//! exclusively, queries share it. Stability queries take their registry
//! snapshot before touching the graph so a concurrent witness replacement
//! cannot change the answer halfway through.

use crate::main_chain::{IngestOutcome, MainChainBuilder, MainChainIndex, UnitState};
use crate::sqlite_store::SqliteUnitStore;
use crate::stability::StabilityOracle;
use crate::store::{MemoryUnitStore, UnitStore};
use crate::{ConsensusError, Result};
use dagchain_core::Config;
use dagchain_domain::{Address, Unit, UnitHash};
use dagchain_witness::{
    MemoryWitnessStore, RegistryError, SqliteWitnessStore, WitnessRegistry, WitnessSet,
    WitnessStore,
};
use serde::Serialize;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

/// Point-in-time summary of a node
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub units: usize,
    pub deferred_units: usize,
    pub main_chain_length: usize,
    pub tip: Option<UnitHash>,
    pub last_stable_mci: Option<u64>,
    pub witness_set_version: u64,
    pub witnesses: Vec<String>,
}

pub struct ConsensusNode {
    builder: RwLock<MainChainBuilder>,
    registry: Arc<WitnessRegistry>,
    oracle: StabilityOracle,
}

impl ConsensusNode {
    /// Open stores as configured and rebuild the graph
    pub fn open(config: &Config) -> Result<Self> {
        config.validate()?;

        let initial = config
            .witnesses
            .initial
            .iter()
            .map(|text| {
                Address::parse(text).map_err(|source| RegistryError::InvalidIdentifier {
                    text: text.clone(),
                    source,
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let (unit_store, witness_store): (Arc<dyn UnitStore>, Box<dyn WitnessStore>) =
            if config.storage.in_memory {
                (
                    Arc::new(MemoryUnitStore::new()),
                    Box::new(MemoryWitnessStore::new()),
                )
            } else {
                (
                    Arc::new(SqliteUnitStore::open(config.storage.units_path())?),
                    Box::new(SqliteWitnessStore::open(config.storage.witnesses_path())?),
                )
            };

        let registry = Arc::new(WitnessRegistry::open(witness_store, &initial)?);
        let builder = MainChainBuilder::open(unit_store)?;

        info!(
            in_memory = config.storage.in_memory,
            units = builder.unit_count(),
            "Consensus node opened"
        );
        Ok(Self::with_parts(builder, registry))
    }

    pub fn with_parts(builder: MainChainBuilder, registry: Arc<WitnessRegistry>) -> Self {
        Self {
            builder: RwLock::new(builder),
            registry,
            oracle: StabilityOracle::new(),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MainChainBuilder>> {
        self.builder
            .read()
            .map_err(|e| ConsensusError::Lock(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MainChainBuilder>> {
        self.builder
            .write()
            .map_err(|e| ConsensusError::Lock(e.to_string()))
    }

    pub fn registry(&self) -> &Arc<WitnessRegistry> {
        &self.registry
    }

    /// Make this node's registry the process-wide one.
    ///
    /// Once per process; later calls fail with `Inconsistent`.
    pub fn install_global_registry(&self) -> Result<()> {
        dagchain_witness::init_global(Arc::clone(&self.registry))?;
        Ok(())
    }

    pub fn get_current_witnesses(&self) -> Result<Arc<WitnessSet>> {
        Ok(self.registry.current()?)
    }

    pub fn propose_replacement(&self, old: &str, new: &str) -> Result<Arc<WitnessSet>> {
        Ok(self.registry.propose_replacement(old, new)?)
    }

    pub fn ingest(&self, unit: Unit) -> Result<IngestOutcome> {
        self.write()?.ingest(unit)
    }

    pub fn main_chain_index(&self, unit: &str) -> Result<MainChainIndex> {
        self.read()?.main_chain_index(unit)
    }

    pub fn unit_state(&self, unit: &str) -> Result<UnitState> {
        self.read()?.unit_state(unit)
    }

    pub fn query_stability(&self, earlier: &str, later: &[UnitHash]) -> Result<bool> {
        let witnesses = self.registry.current()?;
        let builder = self.read()?;
        self.oracle.is_stable(&builder, &witnesses, earlier, later)
    }

    /// Freeze every main-chain index that is stable from the current tip
    pub fn advance_stability(&self) -> Result<Option<u64>> {
        let witnesses = self.registry.current()?;
        let mut builder = self.write()?;
        let before = builder.last_stable_mci();
        let after = self.oracle.advance(&mut builder, &witnesses)?;
        if after != before {
            info!(
                last_stable_mci = ?after,
                witness_set_version = witnesses.version(),
                "Stability advanced"
            );
        }
        Ok(after)
    }

    pub fn status(&self) -> Result<NodeStatus> {
        let witnesses = self.registry.current()?;
        let builder = self.read()?;
        Ok(NodeStatus {
            units: builder.unit_count(),
            deferred_units: builder.deferred_count(),
            main_chain_length: builder.main_chain().len(),
            tip: builder.tip().cloned(),
            last_stable_mci: builder.last_stable_mci(),
            witness_set_version: witnesses.version(),
            witnesses: witnesses.iter().map(|w| w.to_string()).collect(),
        })
    }
}
