//! Core functionality shared by every DagChain crate.
//!
//! Configuration loading, logging initialization and the shared error type.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, LoggingConfig, StorageConfig, WitnessConfig};
pub use error::{CoreError, Result};
