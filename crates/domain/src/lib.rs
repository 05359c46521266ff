//! Domain module for the DagChain ledger core
//!
//! This crate contains pure domain logic with no I/O dependencies:
//! - Address codec (canonical identifiers with embedded checksum)
//! - Unit model and structural validation
//! - Protocol constants

pub mod address;
pub mod error;
pub mod protocol;
pub mod unit;

pub use address::{
    decode_lenient, decode_strict, encode, is_valid_address, Address, AddressError, Payload,
    ADDRESS_LENGTH, PAYLOAD_LEN,
};
pub use error::{DomainError, Result};
pub use protocol::{COUNT_WITNESSES, GENESIS_LEVEL, MAJORITY_OF_WITNESSES};
pub use unit::{validate_witness_list, Unit, UnitHash, UnitProps};
