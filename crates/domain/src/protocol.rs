//! Protocol constants
//!
//! These are consensus-critical: changing any of them forks the network.

/// Number of witnesses in every witness list and in the registry
pub const COUNT_WITNESSES: usize = 12;

/// Distinct witnesses needed for a witnessed level or a stability decision
pub const MAJORITY_OF_WITNESSES: usize = COUNT_WITNESSES / 2 + 1;

/// Level of the genesis unit
pub const GENESIS_LEVEL: u64 = 0;
