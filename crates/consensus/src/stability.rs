//! Stability Oracle
//!
//! Decides whether a unit's main-chain position can no longer change, as seen
//! from a set of later units and a witness-set snapshot.
//!
//! A main-chain unit `X` with best parent `P` is stable once, walking down
//! the best-parent chain of the later tip, a majority of the witnesses has
//! authored units above `X`, and the smallest witnessed level among the walked
//! units (`min_mc_wl`) beats every level a competing branch could reach:
//!
//! - competing branches are the best-parent subtrees rooted at children of
//!   `P` other than `X`; their highest witness-authored level is `max_alt_level`
//! - with witness-authored competitors, `min_mc_wl > max_alt_level` is required
//! - otherwise `min_mc_wl >= level(X)` is required
//!
//! Genesis is trivially stable. A unit off the main chain is stable once the
//! chain unit that first includes it is, and every chain unit below it.

use crate::main_chain::{compare_candidates, MainChainBuilder};
use crate::Result;
use dagchain_domain::{Address, UnitHash, UnitProps, MAJORITY_OF_WITNESSES};
use dagchain_witness::WitnessSet;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// Evaluates the stability criterion against a builder's graph
#[derive(Debug, Clone)]
pub struct StabilityOracle {
    majority: usize,
}

impl Default for StabilityOracle {
    fn default() -> Self {
        Self {
            majority: MAJORITY_OF_WITNESSES,
        }
    }
}

impl StabilityOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `earlier` is stable in the view of `later`.
    ///
    /// Unknown units fail with `NotFound`; an empty `later` is never enough.
    pub fn is_stable(
        &self,
        graph: &MainChainBuilder,
        witnesses: &WitnessSet,
        earlier: &str,
        later: &[UnitHash],
    ) -> Result<bool> {
        graph.props(earlier)?;
        let mut tip: Option<&UnitProps> = None;
        for unit in later {
            let props = graph.props(unit)?;
            if tip.map_or(true, |best| compare_candidates(props, best).is_gt()) {
                tip = Some(props);
            }
        }
        let Some(tip) = tip else {
            return Ok(false);
        };

        let mut included = false;
        for unit in later {
            if graph.is_ancestor_or_self(earlier, unit)? {
                included = true;
                break;
            }
        }
        if !included {
            return Ok(false);
        }

        // marks only hold for views that include the unit
        if graph.is_unit_stable(earlier)? {
            return Ok(true);
        }

        // tip first, genesis last
        let chain = graph.best_parent_chain(&tip.unit)?;

        // lowest chain unit that includes `earlier`
        let mut anchor = None;
        for (pos, unit) in chain.iter().rev().enumerate() {
            if graph.is_ancestor_or_self(earlier, unit)? {
                anchor = Some(pos);
                break;
            }
        }
        let Some(anchor) = anchor else {
            return Ok(false);
        };

        for pos in 0..=anchor {
            let idx = chain.len() - 1 - pos;
            let unit = &chain[idx];
            if graph.is_unit_stable(unit)? {
                continue;
            }
            if !self.is_chain_unit_stable(graph, witnesses, unit, &chain[..idx])? {
                debug!(unit = %earlier, blocking = %unit, "Unit not yet stable");
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// `above` lists the chain units over `unit`, tip first
    fn is_chain_unit_stable(
        &self,
        graph: &MainChainBuilder,
        witnesses: &WitnessSet,
        unit: &str,
        above: &[UnitHash],
    ) -> Result<bool> {
        let props = graph.props(unit)?;
        let Some(parent) = props.best_parent.as_deref() else {
            return Ok(true);
        };

        let mut seen: HashSet<&Address> = HashSet::new();
        let mut min_mc_wl = u64::MAX;
        let mut majority_reached = false;
        for chain_unit in above {
            let chain_props = graph.props(chain_unit)?;
            min_mc_wl = min_mc_wl.min(chain_props.witnessed_level);
            seen.extend(chain_props.authors.iter().filter(|a| witnesses.contains(a)));
            if seen.len() >= self.majority {
                majority_reached = true;
                break;
            }
        }
        if !majority_reached {
            return Ok(false);
        }

        match self.max_alt_level(graph, witnesses, parent, unit)? {
            Some(max_alt_level) => Ok(min_mc_wl > max_alt_level),
            None => Ok(min_mc_wl >= props.level),
        }
    }

    /// Highest witness-authored level in the branches competing with `unit`
    fn max_alt_level(
        &self,
        graph: &MainChainBuilder,
        witnesses: &WitnessSet,
        parent: &str,
        unit: &str,
    ) -> Result<Option<u64>> {
        let mut queue: VecDeque<&UnitHash> = VecDeque::new();
        for child in graph.children(parent)? {
            if child != unit && graph.props(child)?.best_parent.as_deref() == Some(parent) {
                queue.push_back(child);
            }
        }

        let mut max_level: Option<u64> = None;
        while let Some(current) = queue.pop_front() {
            let props = graph.props(current)?;
            if props.authors.iter().any(|a| witnesses.contains(a)) {
                max_level = max_level.max(Some(props.level));
            }
            for child in graph.children(current)? {
                if graph.props(child)?.best_parent.as_deref() == Some(current.as_str()) {
                    queue.push_back(child);
                }
            }
        }
        Ok(max_level)
    }

    /// Mark consecutive main-chain indices stable as seen from the current tip.
    ///
    /// Returns the last stable MCI afterwards.
    pub fn advance(&self, graph: &mut MainChainBuilder, witnesses: &WitnessSet) -> Result<Option<u64>> {
        let Some(tip) = graph.tip().cloned() else {
            return Ok(graph.last_stable_mci());
        };
        let later = [tip];

        loop {
            let next = graph.last_stable_mci().map_or(0, |m| m + 1);
            let Some(unit) = graph.main_chain().get(next as usize).cloned() else {
                break;
            };
            if !self.is_stable(graph, witnesses, &unit, &later)? {
                break;
            }
            graph.mark_stable(next)?;
        }

        Ok(graph.last_stable_mci())
    }
}
