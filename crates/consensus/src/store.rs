//! Unit Graph Store
//!
//! Read access to committed units plus the few writes the chain builder
//! needs: appending a unit with its derived properties and freezing stable
//! main-chain assignments. How units are persisted is up to the implementor.

use crate::{ConsensusError, Result};
use dagchain_domain::{Address, Unit, UnitHash, UnitProps};
use std::collections::HashMap;
use std::sync::RwLock;

/// A frozen main-chain assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StableAssignment {
    pub unit: UnitHash,
    pub main_chain_index: u64,
    pub is_on_main_chain: bool,
}

/// Storage contract for the unit graph
pub trait UnitStore: Send + Sync {
    fn get_unit(&self, unit: &str) -> Result<Unit>;

    /// Parent hashes in ascending order
    fn get_parents(&self, unit: &str) -> Result<Vec<UnitHash>>;

    /// Declared witness list; empty when the unit inherits its list
    fn get_declared_witnesses(&self, unit: &str) -> Result<Vec<Address>>;

    fn get_props(&self, unit: &str) -> Result<UnitProps>;

    fn contains(&self, unit: &str) -> Result<bool>;

    /// Append a unit. Units are never updated or deleted afterwards.
    fn insert(&self, unit: &Unit, props: &UnitProps) -> Result<()>;

    /// Every unit with its properties, in insertion order
    fn load_all(&self) -> Result<Vec<(Unit, UnitProps)>>;

    /// Freeze the units assigned to `mci`. `main_chain_unit` is the one on the chain.
    fn mark_stable(&self, mci: u64, main_chain_unit: &str, units: &[UnitHash]) -> Result<()>;

    fn stable_assignments(&self) -> Result<Vec<StableAssignment>>;
}

#[derive(Default)]
struct MemoryInner {
    units: HashMap<UnitHash, (Unit, UnitProps)>,
    order: Vec<UnitHash>,
    stable: HashMap<UnitHash, StableAssignment>,
}

/// Volatile unit store
#[derive(Default)]
pub struct MemoryUnitStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryUnitStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&MemoryInner) -> Result<T>) -> Result<T> {
        let inner = self
            .inner
            .read()
            .map_err(|e| ConsensusError::Lock(e.to_string()))?;
        f(&inner)
    }

    fn entry<'a>(inner: &'a MemoryInner, unit: &str) -> Result<&'a (Unit, UnitProps)> {
        inner.units.get(unit).ok_or_else(|| ConsensusError::NotFound {
            unit: unit.to_string(),
        })
    }
}

impl UnitStore for MemoryUnitStore {
    fn get_unit(&self, unit: &str) -> Result<Unit> {
        self.read(|inner| Ok(Self::entry(inner, unit)?.0.clone()))
    }

    fn get_parents(&self, unit: &str) -> Result<Vec<UnitHash>> {
        self.read(|inner| Ok(Self::entry(inner, unit)?.0.parent_units.clone()))
    }

    fn get_declared_witnesses(&self, unit: &str) -> Result<Vec<Address>> {
        self.read(|inner| {
            Ok(Self::entry(inner, unit)?
                .0
                .witnesses
                .clone()
                .unwrap_or_default())
        })
    }

    fn get_props(&self, unit: &str) -> Result<UnitProps> {
        self.read(|inner| Ok(Self::entry(inner, unit)?.1.clone()))
    }

    fn contains(&self, unit: &str) -> Result<bool> {
        self.read(|inner| Ok(inner.units.contains_key(unit)))
    }

    fn insert(&self, unit: &Unit, props: &UnitProps) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| ConsensusError::Lock(e.to_string()))?;
        if inner.units.contains_key(&unit.unit) {
            return Err(ConsensusError::Inconsistent(format!(
                "unit {} already stored",
                unit.unit
            )));
        }
        inner.order.push(unit.unit.clone());
        inner
            .units
            .insert(unit.unit.clone(), (unit.clone(), props.clone()));
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<(Unit, UnitProps)>> {
        self.read(|inner| {
            inner
                .order
                .iter()
                .map(|u| Self::entry(inner, u).cloned())
                .collect()
        })
    }

    fn mark_stable(&self, mci: u64, main_chain_unit: &str, units: &[UnitHash]) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| ConsensusError::Lock(e.to_string()))?;

        for unit in units {
            if !inner.units.contains_key(unit) || inner.stable.contains_key(unit) {
                return Err(ConsensusError::Inconsistent(format!(
                    "cannot mark unit {} stable at mci {}",
                    unit, mci
                )));
            }
        }
        for unit in units {
            inner.stable.insert(
                unit.clone(),
                StableAssignment {
                    unit: unit.clone(),
                    main_chain_index: mci,
                    is_on_main_chain: unit == main_chain_unit,
                },
            );
        }
        Ok(())
    }

    fn stable_assignments(&self) -> Result<Vec<StableAssignment>> {
        self.read(|inner| {
            let mut all: Vec<StableAssignment> = inner.stable.values().cloned().collect();
            all.sort_by(|a, b| {
                (a.main_chain_index, &a.unit).cmp(&(b.main_chain_index, &b.unit))
            });
            Ok(all)
        })
    }
}
