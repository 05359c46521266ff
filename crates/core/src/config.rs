//! Configuration management for DagChain nodes.

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub witnesses: WitnessConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the SQLite databases
    pub data_dir: PathBuf,
    /// File name of the unit graph database
    pub units_db: String,
    /// File name of the witness registry database
    pub witnesses_db: String,
    /// Keep everything in memory (tests, ephemeral nodes)
    #[serde(default)]
    pub in_memory: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WitnessConfig {
    /// Bootstrap witness list, only used while the persisted registry is empty
    #[serde(default)]
    pub initial: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl StorageConfig {
    pub fn units_path(&self) -> PathBuf {
        self.data_dir.join(&self.units_db)
    }

    pub fn witnesses_path(&self) -> PathBuf {
        self.data_dir.join(&self.witnesses_db)
    }
}

impl Config {
    #[cfg(feature = "toml")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            storage: StorageConfig {
                data_dir: PathBuf::from("data"),
                units_db: "units.sqlite".to_string(),
                witnesses_db: "witnesses.sqlite".to_string(),
                in_memory: false,
            },
            witnesses: WitnessConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Reject settings the node cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.storage.in_memory {
            if self.storage.units_db.is_empty() || self.storage.witnesses_db.is_empty() {
                return Err(CoreError::Config(
                    "storage database file names must not be empty".to_string(),
                ));
            }
            if self.storage.units_db == self.storage.witnesses_db {
                return Err(CoreError::Config(format!(
                    "units and witnesses share the database file {}",
                    self.storage.units_db
                )));
            }
        }
        if self.logging.level.trim().is_empty() {
            return Err(CoreError::Config("logging level must not be empty".to_string()));
        }
        Ok(())
    }

    /// Same as [`Config::default_config`] but never touches the disk.
    pub fn in_memory() -> Self {
        let mut config = Self::default_config();
        config.storage.in_memory = true;
        config
    }
}
