//! Main-Chain Builder
//!
//! Maintains the in-memory view of the unit DAG and derives from it:
//! - per-unit level, witnessed level and best parent (fixed at ingestion)
//! - the main chain: best-parent chain of the best free unit
//! - main-chain indices (MCI) for every unit included by the chain
//!
//! Best-parent order is total and uses only unit content, so every node that
//! sees the same unit set converges on the same chain: higher witnessed level
//! first, then smaller `level - witnessed_level`, then the smaller unit hash.
//!
//! Indices up to the last stable MCI are frozen: they are persisted when
//! marked stable and never recomputed.

use crate::store::UnitStore;
use crate::{ConsensusError, Result};
use dagchain_domain::{Address, Unit, UnitHash, UnitProps, GENESIS_LEVEL, MAJORITY_OF_WITNESSES};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of handing a unit to [`MainChainBuilder::ingest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Unit is in the graph, along with previously deferred descendants it released
    Accepted {
        unit: UnitHash,
        released: Vec<UnitHash>,
    },
    /// Some parents are unknown; the unit is parked until they arrive
    Deferred {
        unit: UnitHash,
        missing: Vec<UnitHash>,
    },
    /// Unit was already in the graph
    AlreadyKnown { unit: UnitHash },
}

/// Position of a unit relative to the main chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MainChainIndex {
    /// Not yet included by the chain tip
    Pending,
    Assigned(u64),
}

/// Per-unit lifecycle: `Ingested -> Assigned -> Stable`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnitState {
    /// Waiting for parents; not part of the graph yet
    Deferred,
    Ingested,
    /// Has an MCI that may still be revised
    Assigned { mci: u64, on_main_chain: bool },
    /// Terminal
    Stable { mci: u64, on_main_chain: bool },
}

/// Builder counters
#[derive(Debug, Default, Clone, Serialize)]
pub struct BuilderMetrics {
    pub units_ingested_total: u64,
    pub units_deferred_total: u64,
    pub units_rejected_total: u64,
    pub retips_total: u64,
}

#[derive(Debug, Clone)]
struct GraphNode {
    props: UnitProps,
    parents: Vec<UnitHash>,
    children: Vec<UnitHash>,
    main_chain_index: Option<u64>,
    is_on_main_chain: bool,
    is_stable: bool,
}

/// Order candidates for best parent / chain tip. `Greater` means better.
pub fn compare_candidates(a: &UnitProps, b: &UnitProps) -> Ordering {
    a.witnessed_level
        .cmp(&b.witnessed_level)
        .then_with(|| (b.level - b.witnessed_level).cmp(&(a.level - a.witnessed_level)))
        .then_with(|| b.unit.cmp(&a.unit))
}

pub struct MainChainBuilder {
    store: Arc<dyn UnitStore>,
    nodes: HashMap<UnitHash, GraphNode>,
    genesis: Option<UnitHash>,
    /// Indexed by MCI
    main_chain: Vec<UnitHash>,
    last_stable_mci: Option<u64>,
    deferred: HashMap<UnitHash, Unit>,
    /// Missing parent -> deferred units waiting for it
    waiting: HashMap<UnitHash, HashSet<UnitHash>>,
    rejected: HashSet<UnitHash>,
    metrics: BuilderMetrics,
}

impl MainChainBuilder {
    /// Rebuild the graph from `store`, restoring frozen stable assignments
    pub fn open(store: Arc<dyn UnitStore>) -> Result<Self> {
        let mut builder = Self {
            store: Arc::clone(&store),
            nodes: HashMap::new(),
            genesis: None,
            main_chain: Vec::new(),
            last_stable_mci: None,
            deferred: HashMap::new(),
            waiting: HashMap::new(),
            rejected: HashSet::new(),
            metrics: BuilderMetrics::default(),
        };

        for (unit, props) in store.load_all()? {
            builder.attach(&unit, props)?;
        }

        for assignment in store.stable_assignments()? {
            let mci = assignment.main_chain_index;
            let node = builder.nodes.get_mut(&assignment.unit).ok_or_else(|| {
                ConsensusError::Inconsistent(format!(
                    "stable unit {} missing from graph",
                    assignment.unit
                ))
            })?;
            node.main_chain_index = Some(mci);
            node.is_stable = true;
            node.is_on_main_chain = assignment.is_on_main_chain;

            if assignment.is_on_main_chain {
                if mci != builder.main_chain.len() as u64 {
                    return Err(ConsensusError::Inconsistent(format!(
                        "stable main chain has a gap before mci {}",
                        mci
                    )));
                }
                builder.main_chain.push(assignment.unit.clone());
            }
        }

        if !builder.main_chain.is_empty() {
            let last = builder.main_chain.len() as u64 - 1;
            if builder
                .nodes
                .values()
                .any(|n| n.is_stable && n.main_chain_index.map_or(true, |m| m > last))
            {
                return Err(ConsensusError::Inconsistent(
                    "stable unit above the last stable main chain index".to_string(),
                ));
            }
            builder.last_stable_mci = Some(last);
        }

        builder.update_main_chain()?;

        info!(
            units = builder.nodes.len(),
            main_chain_length = builder.main_chain.len(),
            last_stable_mci = ?builder.last_stable_mci,
            "Main chain builder opened"
        );
        Ok(builder)
    }

    /// Incorporate a unit, deferring it while parents are missing.
    ///
    /// Structurally invalid units are rejected permanently, together with any
    /// deferred descendants.
    pub fn ingest(&mut self, unit: Unit) -> Result<IngestOutcome> {
        let hash = unit.unit.clone();

        if self.nodes.contains_key(&hash) {
            return Ok(IngestOutcome::AlreadyKnown { unit: hash });
        }
        if self.deferred.contains_key(&hash) {
            let missing = self.missing_parents(&unit);
            return Ok(IngestOutcome::Deferred {
                unit: hash,
                missing,
            });
        }
        if self.rejected.contains(&hash) {
            return Err(ConsensusError::InvalidUnit(format!(
                "unit {} was rejected earlier",
                hash
            )));
        }

        // a forged hash must not poison the real unit with that hash
        if !unit.verify_hash()? {
            return Err(ConsensusError::InvalidUnit(format!(
                "hash mismatch for unit {}",
                hash
            )));
        }

        if let Err(e) = self.check_structure(&unit) {
            self.reject(&hash);
            return Err(e);
        }

        if let Some(parent) = unit.parent_units.iter().find(|p| self.rejected.contains(*p)) {
            let reason = format!("unit {} references rejected parent {}", hash, parent);
            self.reject(&hash);
            return Err(ConsensusError::InvalidUnit(reason));
        }

        let missing = self.missing_parents(&unit);
        if !missing.is_empty() {
            for parent in &missing {
                self.waiting
                    .entry(parent.clone())
                    .or_default()
                    .insert(hash.clone());
            }
            self.deferred.insert(hash.clone(), unit);
            self.metrics.units_deferred_total += 1;
            debug!(unit = %hash, missing = missing.len(), "Unit deferred until parents arrive");
            return Ok(IngestOutcome::Deferred {
                unit: hash,
                missing,
            });
        }

        self.incorporate(unit)?;
        let released = self.release_waiting(&hash)?;
        self.update_main_chain()?;

        Ok(IngestOutcome::Accepted {
            unit: hash,
            released,
        })
    }

    fn check_structure(&self, unit: &Unit) -> Result<()> {
        unit.validate_structure()
            .map_err(|e| ConsensusError::InvalidUnit(e.to_string()))?;

        if unit.is_genesis() {
            if let Some(ref genesis) = self.genesis {
                return Err(ConsensusError::InvalidUnit(format!(
                    "second genesis unit {}, genesis is {}",
                    unit.unit, genesis
                )));
            }
        }
        Ok(())
    }

    fn missing_parents(&self, unit: &Unit) -> Vec<UnitHash> {
        unit.parent_units
            .iter()
            .filter(|p| !self.nodes.contains_key(*p))
            .cloned()
            .collect()
    }

    fn reject(&mut self, hash: &UnitHash) {
        let mut queue = VecDeque::from([hash.clone()]);
        while let Some(unit) = queue.pop_front() {
            if !self.rejected.insert(unit.clone()) {
                continue;
            }
            self.deferred.remove(&unit);
            self.metrics.units_rejected_total += 1;
            warn!(unit = %unit, "Unit rejected");

            if let Some(children) = self.waiting.remove(&unit) {
                queue.extend(children);
            }
        }
    }

    /// Incorporate deferred units whose last missing parent just arrived
    fn release_waiting(&mut self, arrived: &UnitHash) -> Result<Vec<UnitHash>> {
        let mut released = Vec::new();
        let mut queue = VecDeque::from([arrived.clone()]);

        while let Some(parent) = queue.pop_front() {
            let Some(children) = self.waiting.remove(&parent) else {
                continue;
            };
            let mut children: Vec<UnitHash> = children.into_iter().collect();
            children.sort();

            for child in children {
                let ready = self
                    .deferred
                    .get(&child)
                    .map_or(false, |u| self.missing_parents(u).is_empty());
                if !ready {
                    continue;
                }
                if let Some(unit) = self.deferred.remove(&child) {
                    self.incorporate(unit)?;
                    debug!(unit = %child, "Deferred unit released");
                    released.push(child.clone());
                    queue.push_back(child);
                }
            }
        }

        Ok(released)
    }

    /// Derive properties, persist, and add the unit to the graph
    fn incorporate(&mut self, unit: Unit) -> Result<()> {
        let mut best_parent: Option<&UnitProps> = None;
        let mut level = GENESIS_LEVEL;

        for parent in &unit.parent_units {
            let props = self.props(parent)?;
            level = level.max(props.level + 1);
            if best_parent.map_or(true, |best| compare_candidates(props, best) == Ordering::Greater) {
                best_parent = Some(props);
            }
        }

        let witnesses = match (&unit.witnesses, best_parent) {
            (Some(declared), _) => declared.clone(),
            (None, Some(best)) => best.witnesses.clone(),
            (None, None) => {
                return Err(ConsensusError::InvalidUnit(format!(
                    "unit {} has no witness list to inherit",
                    unit.unit
                )))
            }
        };
        let best_parent = best_parent.map(|p| p.unit.clone());
        let witnessed_level = self.witnessed_level(best_parent.as_deref(), &witnesses)?;

        let props = UnitProps {
            unit: unit.unit.clone(),
            level,
            witnessed_level,
            best_parent,
            witnesses,
            authors: unit.authors.clone(),
        };

        self.store.insert(&unit, &props)?;
        self.attach(&unit, props)?;
        self.metrics.units_ingested_total += 1;

        debug!(
            unit = %unit.unit,
            level = level,
            witnessed_level = witnessed_level,
            "Unit incorporated"
        );
        Ok(())
    }

    /// Level at which a majority of `witnesses` is seen walking down best parents
    fn witnessed_level(&self, start: Option<&str>, witnesses: &[Address]) -> Result<u64> {
        let mut collected: HashSet<&Address> = HashSet::new();
        let mut cursor = start;

        while let Some(unit) = cursor {
            let props = self.props(unit)?;
            for author in &props.authors {
                if witnesses.contains(author) {
                    collected.insert(author);
                }
            }
            if collected.len() >= MAJORITY_OF_WITNESSES {
                return Ok(props.level);
            }
            cursor = props.best_parent.as_deref();
        }

        Ok(GENESIS_LEVEL)
    }

    fn attach(&mut self, unit: &Unit, props: UnitProps) -> Result<()> {
        for parent in &unit.parent_units {
            let node = self.nodes.get_mut(parent).ok_or_else(|| {
                ConsensusError::Inconsistent(format!(
                    "parent {} of unit {} missing from graph",
                    parent, unit.unit
                ))
            })?;
            node.children.push(unit.unit.clone());
        }

        if unit.is_genesis() {
            self.genesis = Some(unit.unit.clone());
        }

        self.nodes.insert(
            unit.unit.clone(),
            GraphNode {
                props,
                parents: unit.parent_units.clone(),
                children: Vec::new(),
                main_chain_index: None,
                is_on_main_chain: false,
                is_stable: false,
            },
        );
        Ok(())
    }

    /// Re-select the tip and reassign every non-stable main-chain index
    fn update_main_chain(&mut self) -> Result<()> {
        if self.nodes.is_empty() {
            return Ok(());
        }

        let anchor = match self.last_stable_mci {
            Some(mci) => {
                let unit = self.main_chain[mci as usize].clone();
                let level = self.props(&unit)?.level;
                Some((unit, level))
            }
            None => None,
        };

        let mut free: Vec<&UnitProps> = self
            .nodes
            .values()
            .filter(|n| n.children.is_empty())
            .map(|n| &n.props)
            .collect();
        free.sort_by(|a, b| compare_candidates(b, a));

        // Walk each candidate down to the stable anchor; the first one whose
        // best-parent chain passes through it becomes the tip
        let mut segment = None;
        for candidate in free {
            let mut walked = Vec::new();
            let mut cursor = Some(candidate.unit.as_str());
            let extends_anchor = loop {
                let Some(unit) = cursor else {
                    break anchor.is_none();
                };
                if let Some((ref anchor_unit, anchor_level)) = anchor {
                    if unit == anchor_unit.as_str() {
                        break true;
                    }
                    if self.props(unit)?.level <= anchor_level {
                        break false;
                    }
                }
                walked.push(unit.to_string());
                cursor = self.props(unit)?.best_parent.as_deref();
            };
            if extends_anchor {
                segment = Some(walked);
                break;
            }
        }

        let Some(mut segment) = segment else {
            warn!("No free unit extends the stable main chain; keeping current chain");
            return Ok(());
        };
        segment.reverse();

        let old_tip = self.main_chain.last().cloned();
        let first_unstable = self.last_stable_mci.map_or(0, |m| m + 1);

        for node in self.nodes.values_mut().filter(|n| !n.is_stable) {
            node.main_chain_index = None;
            node.is_on_main_chain = false;
        }
        self.main_chain.truncate(first_unstable as usize);
        self.main_chain.extend(segment);

        for mci in first_unstable..self.main_chain.len() as u64 {
            let chain_unit = self.main_chain[mci as usize].clone();
            let parents = {
                let node = self.node_mut(&chain_unit)?;
                node.is_on_main_chain = true;
                node.main_chain_index = Some(mci);
                node.parents.clone()
            };

            // everything first included by this chain unit gets its index
            let mut queue: VecDeque<UnitHash> = parents.into();
            while let Some(unit) = queue.pop_front() {
                let node = self.node_mut(&unit)?;
                if node.main_chain_index.is_some() {
                    continue;
                }
                node.main_chain_index = Some(mci);
                queue.extend(node.parents.iter().cloned());
            }
        }

        let new_tip = self.main_chain.last().cloned();
        if old_tip != new_tip {
            self.metrics.retips_total += 1;
            debug!(
                tip = ?new_tip,
                main_chain_length = self.main_chain.len(),
                "Main chain tip moved"
            );
        }
        Ok(())
    }

    /// Freeze `mci`: every unit assigned to it becomes stable, in memory and in the store
    pub fn mark_stable(&mut self, mci: u64) -> Result<()> {
        let expected = self.last_stable_mci.map_or(0, |m| m + 1);
        if mci != expected {
            return Err(ConsensusError::Inconsistent(format!(
                "stability must advance in order: expected mci {}, got {}",
                expected, mci
            )));
        }

        let chain_unit = self.main_chain.get(mci as usize).cloned().ok_or_else(|| {
            ConsensusError::Inconsistent(format!("no main chain unit at mci {}", mci))
        })?;

        let mut units: Vec<UnitHash> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.main_chain_index == Some(mci))
            .map(|(u, _)| u.clone())
            .collect();
        units.sort();

        self.store.mark_stable(mci, &chain_unit, &units)?;

        for unit in &units {
            self.node_mut(unit)?.is_stable = true;
        }
        self.last_stable_mci = Some(mci);

        info!(
            mci = mci,
            unit = %chain_unit,
            units = units.len(),
            "Main chain index marked stable"
        );
        Ok(())
    }

    fn node(&self, unit: &str) -> Result<&GraphNode> {
        self.nodes.get(unit).ok_or_else(|| ConsensusError::NotFound {
            unit: unit.to_string(),
        })
    }

    fn node_mut(&mut self, unit: &str) -> Result<&mut GraphNode> {
        self.nodes.get_mut(unit).ok_or_else(|| ConsensusError::NotFound {
            unit: unit.to_string(),
        })
    }

    pub fn props(&self, unit: &str) -> Result<&UnitProps> {
        Ok(&self.node(unit)?.props)
    }

    pub fn contains(&self, unit: &str) -> bool {
        self.nodes.contains_key(unit)
    }

    pub fn children(&self, unit: &str) -> Result<&[UnitHash]> {
        Ok(&self.node(unit)?.children)
    }

    pub fn is_unit_stable(&self, unit: &str) -> Result<bool> {
        Ok(self.node(unit)?.is_stable)
    }

    pub fn main_chain_index(&self, unit: &str) -> Result<MainChainIndex> {
        Ok(match self.node(unit)?.main_chain_index {
            Some(mci) => MainChainIndex::Assigned(mci),
            None => MainChainIndex::Pending,
        })
    }

    pub fn unit_state(&self, unit: &str) -> Result<UnitState> {
        if self.deferred.contains_key(unit) {
            return Ok(UnitState::Deferred);
        }
        let node = self.node(unit)?;
        Ok(match (node.main_chain_index, node.is_stable) {
            (None, _) => UnitState::Ingested,
            (Some(mci), false) => UnitState::Assigned {
                mci,
                on_main_chain: node.is_on_main_chain,
            },
            (Some(mci), true) => UnitState::Stable {
                mci,
                on_main_chain: node.is_on_main_chain,
            },
        })
    }

    /// Best-parent chain from `unit` down to genesis, `unit` first
    pub fn best_parent_chain(&self, unit: &str) -> Result<Vec<UnitHash>> {
        let mut chain = Vec::new();
        let mut cursor = Some(unit);
        while let Some(u) = cursor {
            let props = self.props(u)?;
            chain.push(props.unit.clone());
            cursor = props.best_parent.as_deref();
        }
        Ok(chain)
    }

    /// Whether `ancestor` is `unit` itself or reachable from it through parents
    pub fn is_ancestor_or_self(&self, ancestor: &str, unit: &str) -> Result<bool> {
        let target_level = self.props(ancestor)?.level;
        self.props(unit)?;
        if ancestor == unit {
            return Ok(true);
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([unit]);
        while let Some(current) = queue.pop_front() {
            for parent in &self.node(current)?.parents {
                if parent == ancestor {
                    return Ok(true);
                }
                if self.props(parent)?.level > target_level && visited.insert(parent.as_str()) {
                    queue.push_back(parent.as_str());
                }
            }
        }
        Ok(false)
    }

    /// Units without children, best first
    pub fn free_units(&self) -> Vec<UnitHash> {
        let mut free: Vec<&UnitProps> = self
            .nodes
            .values()
            .filter(|n| n.children.is_empty())
            .map(|n| &n.props)
            .collect();
        free.sort_by(|a, b| compare_candidates(b, a));
        free.into_iter().map(|p| p.unit.clone()).collect()
    }

    pub fn main_chain(&self) -> &[UnitHash] {
        &self.main_chain
    }

    pub fn tip(&self) -> Option<&UnitHash> {
        self.main_chain.last()
    }

    pub fn genesis(&self) -> Option<&UnitHash> {
        self.genesis.as_ref()
    }

    pub fn last_stable_mci(&self) -> Option<u64> {
        self.last_stable_mci
    }

    pub fn unit_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    pub fn metrics(&self) -> &BuilderMetrics {
        &self.metrics
    }

    /// All MCI assignments, sorted by unit hash
    pub fn assignments(&self) -> Vec<(UnitHash, MainChainIndex)> {
        let mut all: Vec<(UnitHash, MainChainIndex)> = self
            .nodes
            .iter()
            .map(|(u, n)| {
                let mci = n
                    .main_chain_index
                    .map_or(MainChainIndex::Pending, MainChainIndex::Assigned);
                (u.clone(), mci)
            })
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}
