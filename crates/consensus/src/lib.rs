//! Consensus core for the DagChain ledger
//!
//! - Unit graph storage (SQLite and in-memory)
//! - Main-chain selection and main-chain index assignment
//! - Stability oracle driven by the witness registry
//! - [`ConsensusNode`], the facade tying them together

pub mod error;
pub mod main_chain;
pub mod node;
pub mod sqlite_store;
pub mod stability;
pub mod store;

#[cfg(test)]
mod test_support;

pub use error::{ConsensusError, Result};
pub use main_chain::{
    compare_candidates, BuilderMetrics, IngestOutcome, MainChainBuilder, MainChainIndex,
    UnitState,
};
pub use node::{ConsensusNode, NodeStatus};
pub use sqlite_store::SqliteUnitStore;
pub use stability::StabilityOracle;
pub use store::{MemoryUnitStore, StableAssignment, UnitStore};
