//! Witness Registry
//!
//! The small, consensus-anchoring set of witness addresses consulted by the
//! stability oracle, together with its persistence.

pub mod error;
pub mod registry;
pub mod storage;

pub use error::{RegistryError, Result};
pub use registry::{global, init_global, WitnessRegistry, WitnessSet};
pub use storage::{MemoryWitnessStore, SqliteWitnessStore, WitnessStore};
