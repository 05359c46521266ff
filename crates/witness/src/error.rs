//! Witness registry errors

use dagchain_domain::AddressError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// The proposed entry failed strict canonical validation
    #[error("Invalid identifier {text:?}: {source}")]
    InvalidIdentifier { text: String, source: AddressError },

    /// The entry to replace is not in the registry
    #[error("Witness not found: {address}")]
    NotFound { address: String },

    /// The proposed entry is already in the registry
    #[error("Duplicate witness: {address}")]
    DuplicateEntry { address: String },

    /// Registry invariant broken; indicates corruption
    #[error("Witness registry inconsistent: {0}")]
    Inconsistent(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Lock error: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
