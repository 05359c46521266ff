//! Witness Registry
//!
//! The registry is the node's current ordered set of [`COUNT_WITNESSES`]
//! trusted witness addresses. Readers get immutable, versioned snapshots;
//! writers go through [`WitnessRegistry::replace`], which is linearizable:
//! replacements are serialized, each one verifies and mutates as a unit, and
//! the new snapshot is published as soon as the store confirmed exactly one
//! changed entry. [`WitnessRegistry::verify_consistency`] re-reads the store
//! to check the two copies still agree.

use crate::storage::WitnessStore;
use crate::{RegistryError, Result};
use dagchain_domain::{validate_witness_list, Address, COUNT_WITNESSES};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use tracing::{info, warn};

/// Immutable view of the registry at one version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessSet {
    version: u64,
    witnesses: Vec<Address>,
}

impl WitnessSet {
    fn new(version: u64, witnesses: Vec<Address>) -> Result<Self> {
        check_invariants(&witnesses)?;
        Ok(Self { version, witnesses })
    }

    /// Monotonically increasing; bumped by every successful replacement
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn addresses(&self) -> &[Address] {
        &self.witnesses
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.witnesses.contains(address)
    }

    pub fn len(&self) -> usize {
        self.witnesses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.witnesses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.witnesses.iter()
    }
}

fn check_invariants(witnesses: &[Address]) -> Result<()> {
    validate_witness_list(witnesses).map_err(|e| RegistryError::Inconsistent(e.to_string()))
}

/// The mutable witness registry
pub struct WitnessRegistry {
    store: Box<dyn WitnessStore>,
    current: RwLock<Arc<WitnessSet>>,
    /// Serializes replacements; readers never take it
    mutation: Mutex<()>,
}

impl WitnessRegistry {
    /// Load the registry from `store`, bootstrapping it with `initial` when the
    /// store is empty.
    pub fn open(store: Box<dyn WitnessStore>, initial: &[Address]) -> Result<Self> {
        let mut witnesses = store.load()?;

        if witnesses.is_empty() {
            if initial.is_empty() {
                return Err(RegistryError::Inconsistent(
                    "witness store is empty and no initial witnesses were given".to_string(),
                ));
            }
            check_invariants(initial)?;
            store.insert_initial(initial)?;
            info!(count = initial.len(), "Witness registry bootstrapped");
            witnesses = store.load()?;
        }

        let set = WitnessSet::new(0, witnesses)?;
        info!(
            count = set.len(),
            version = set.version(),
            "Witness registry loaded"
        );

        Ok(Self {
            store,
            current: RwLock::new(Arc::new(set)),
            mutation: Mutex::new(()),
        })
    }

    /// Consistent snapshot of the current witness set
    pub fn current(&self) -> Result<Arc<WitnessSet>> {
        let guard = self
            .current
            .read()
            .map_err(|e| RegistryError::Lock(e.to_string()))?;
        Ok(Arc::clone(&guard))
    }

    /// Atomically substitute `new` for `old`.
    ///
    /// Returns the snapshot that contains the change. Concurrent calls with
    /// the same `old` are serialized: exactly one succeeds, the rest observe
    /// `old` as absent and fail with `NotFound`.
    pub fn replace(&self, old: &Address, new: &Address) -> Result<Arc<WitnessSet>> {
        let _serial = self
            .mutation
            .lock()
            .map_err(|e| RegistryError::Lock(e.to_string()))?;

        let snapshot = self.current()?;

        if !snapshot.contains(old) {
            warn!(old = %old, new = %new, "Witness replacement rejected: old entry absent");
            return Err(RegistryError::NotFound {
                address: old.to_string(),
            });
        }
        if snapshot.contains(new) {
            warn!(old = %old, new = %new, "Witness replacement rejected: new entry present");
            return Err(RegistryError::DuplicateEntry {
                address: new.to_string(),
            });
        }

        let witnesses: Vec<Address> = snapshot
            .iter()
            .map(|w| if w == old { new.clone() } else { w.clone() })
            .collect();
        let next = Arc::new(WitnessSet::new(snapshot.version() + 1, witnesses)?);

        // Once the store has committed, the new snapshot must be published.
        // A poisoned lock still holds a valid `Arc`, so recover it.
        self.store.replace(old, new)?;
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = Arc::clone(&next);
        drop(current);

        info!(
            old = %old,
            new = %new,
            version = next.version(),
            "Witness replaced"
        );
        Ok(next)
    }

    /// Text-facing replacement: `new` must pass strict canonical decoding.
    ///
    /// A non-canonical `old` cannot be in the registry and yields `NotFound`.
    pub fn propose_replacement(&self, old: &str, new: &str) -> Result<Arc<WitnessSet>> {
        let new = Address::parse(new).map_err(|source| RegistryError::InvalidIdentifier {
            text: new.to_string(),
            source,
        })?;
        let old = Address::parse(old).map_err(|_| RegistryError::NotFound {
            address: old.to_string(),
        })?;
        self.replace(&old, &new)
    }

    /// Re-read the store and verify the in-memory view still matches it
    pub fn verify_consistency(&self) -> Result<()> {
        let persisted = self.store.load()?;
        let snapshot = self.current()?;

        if persisted.len() != COUNT_WITNESSES {
            return Err(RegistryError::Inconsistent(format!(
                "persisted registry holds {} entries, expected {}",
                persisted.len(),
                COUNT_WITNESSES
            )));
        }
        let distinct: HashSet<&Address> = persisted.iter().collect();
        if distinct.len() != persisted.len() || persisted != snapshot.addresses() {
            return Err(RegistryError::Inconsistent(
                "persisted witnesses diverged from the registry".to_string(),
            ));
        }
        Ok(())
    }
}

static GLOBAL_REGISTRY: OnceLock<Arc<WitnessRegistry>> = OnceLock::new();

/// Install the process-wide registry. Fails if one is already installed.
///
/// The installed registry is shared, not copied: replacements made through
/// any handle are visible through [`global`].
pub fn init_global(registry: Arc<WitnessRegistry>) -> Result<Arc<WitnessRegistry>> {
    GLOBAL_REGISTRY
        .set(registry)
        .map_err(|_| RegistryError::Inconsistent("global registry already initialized".to_string()))?;
    info!("Global witness registry installed");
    global()
}

/// The process-wide registry installed by [`init_global`]
pub fn global() -> Result<Arc<WitnessRegistry>> {
    GLOBAL_REGISTRY
        .get()
        .cloned()
        .ok_or_else(|| RegistryError::Inconsistent("global registry not initialized".to_string()))
}
