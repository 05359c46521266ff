//! Unit Domain Model
//!
//! Units are the immutable nodes of the ledger DAG. A unit is identified by
//! the BLAKE3 hash of its canonical content, references its parents, names
//! its authors and optionally declares a witness list.

use crate::address::Address;
use crate::protocol::COUNT_WITNESSES;
use crate::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Unit hash type (BLAKE3 hash as hex string)
pub type UnitHash = String;

/// A ledger unit as received from ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Content hash, computed by [`Unit::seal`]
    pub unit: UnitHash,

    /// Parent unit hashes, sorted ascending; empty only for genesis
    pub parent_units: Vec<UnitHash>,

    /// Addresses that authored the unit
    pub authors: Vec<Address>,

    /// Declared witness list; inherited from the best parent when absent
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub witnesses: Option<Vec<Address>>,

    /// Unix epoch timestamp in milliseconds
    pub timestamp: u64,

    /// Opaque application payload
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub payload: Option<String>,
}

impl Unit {
    /// Build an unsealed unit. Parents are sorted and deduplicated.
    pub fn new(
        mut parent_units: Vec<UnitHash>,
        authors: Vec<Address>,
        witnesses: Option<Vec<Address>>,
        timestamp: u64,
    ) -> Self {
        parent_units.sort();
        parent_units.dedup();
        Self {
            unit: String::new(),
            parent_units,
            authors,
            witnesses,
            timestamp,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Compute the content hash and store it in `unit`
    pub fn seal(mut self) -> Result<Self> {
        self.unit = self.compute_hash()?;
        Ok(self)
    }

    /// BLAKE3 hash of the canonical representation (excludes `unit`)
    pub fn compute_hash(&self) -> Result<UnitHash> {
        let canonical = self.to_canonical_json()?;
        let hash = blake3::hash(canonical.as_bytes());
        Ok(hex::encode(hash.as_bytes()))
    }

    /// Serialize to canonical JSON (sorted keys, excludes the unit hash)
    pub fn to_canonical_json(&self) -> Result<String> {
        let mut map = BTreeMap::new();
        map.insert("authors", to_json_value(&self.authors)?);
        map.insert("parent_units", to_json_value(&self.parent_units)?);
        map.insert("timestamp", to_json_value(&self.timestamp)?);
        if let Some(ref witnesses) = self.witnesses {
            map.insert("witnesses", to_json_value(witnesses)?);
        }
        if let Some(ref payload) = self.payload {
            map.insert("payload", to_json_value(payload)?);
        }

        serde_json::to_string(&map).map_err(|e| DomainError::SerializationError(e.to_string()))
    }

    /// Verify the stored hash matches the content
    pub fn verify_hash(&self) -> Result<bool> {
        Ok(self.compute_hash()? == self.unit)
    }

    pub fn is_genesis(&self) -> bool {
        self.parent_units.is_empty()
    }

    /// Context-free structural checks. Failing units are rejected for good.
    pub fn validate_structure(&self) -> Result<()> {
        if !self.verify_hash()? {
            return Err(DomainError::InvalidUnit(format!(
                "hash mismatch for unit {}",
                self.unit
            )));
        }

        if self.authors.is_empty() {
            return Err(DomainError::InvalidUnit("unit has no authors".to_string()));
        }

        if self.parent_units.windows(2).any(|w| w[0] >= w[1]) {
            return Err(DomainError::InvalidUnit(
                "parent units must be sorted and unique".to_string(),
            ));
        }

        if self.parent_units.iter().any(|p| *p == self.unit) {
            return Err(DomainError::InvalidUnit(
                "unit references itself as parent".to_string(),
            ));
        }

        if self.is_genesis() && self.witnesses.is_none() {
            return Err(DomainError::InvalidUnit(
                "genesis unit must declare a witness list".to_string(),
            ));
        }

        if let Some(ref witnesses) = self.witnesses {
            validate_witness_list(witnesses)?;
        }

        Ok(())
    }
}

/// A witness list must hold exactly [`COUNT_WITNESSES`] distinct addresses.
pub fn validate_witness_list(witnesses: &[Address]) -> Result<()> {
    if witnesses.len() != COUNT_WITNESSES {
        return Err(DomainError::InvalidUnit(format!(
            "witness list must have {} entries, got {}",
            COUNT_WITNESSES,
            witnesses.len()
        )));
    }

    let distinct: HashSet<&Address> = witnesses.iter().collect();
    if distinct.len() != witnesses.len() {
        return Err(DomainError::InvalidUnit(
            "witness list contains duplicates".to_string(),
        ));
    }

    Ok(())
}

/// Properties derived for a unit once it is in the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitProps {
    pub unit: UnitHash,
    pub level: u64,
    pub witnessed_level: u64,
    /// None only for genesis
    pub best_parent: Option<UnitHash>,
    /// Effective witness list (declared or inherited)
    pub witnesses: Vec<Address>,
    pub authors: Vec<Address>,
}

fn to_json_value<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| DomainError::SerializationError(e.to_string()))
}
