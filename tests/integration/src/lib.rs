//! Integration tests for the DagChain ledger core
//!
//! This test suite validates:
//! - Linearizable witness replacement under concurrent proposals
//! - Deterministic main-chain assignment regardless of arrival order
//! - Stability under witness majority, competing branches and registry changes
//! - Restart from persisted SQLite state
//! - Canonical identifier enforcement at the registry boundary

pub mod test_utils;


#[cfg(test)]
mod chain_determinism_tests;

#[cfg(test)]
mod stability_tests;

#[cfg(test)]
mod restart_tests;

#[cfg(test)]
mod identifier_tests;
