//! Consensus errors

use dagchain_core::CoreError;
use dagchain_domain::DomainError;
use dagchain_witness::RegistryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Referenced unit is not in the graph
    #[error("Unit not found: {unit}")]
    NotFound { unit: String },

    /// Structurally invalid unit; permanently rejected
    #[error("Invalid unit: {0}")]
    InvalidUnit(String),

    /// Internal invariant broken; indicates corruption
    #[error("Consensus state inconsistent: {0}")]
    Inconsistent(String),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Configuration error: {0}")]
    Config(#[from] CoreError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Lock error: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
