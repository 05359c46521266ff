//! Domain errors
//!
//! Pure domain errors with no infrastructure dependencies

use crate::address::AddressError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(#[from] AddressError),

    #[error("Invalid unit: {0}")]
    InvalidUnit(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
