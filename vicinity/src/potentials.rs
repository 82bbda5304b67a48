//! Interface with the pair potentials and bonding topology of a simulation.
//!
//! Neighbor lists only need to know the interaction range of the pair
//! potentials between every pair of particle types, and which pairs of
//! particles must be excluded from the lists (typically bonded particles).
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::Error;

/// A pair interaction between two particle types. Only the range of the
/// interaction is used by the neighbor lists, the energy and forces are
/// evaluated by the caller.
pub trait PairPotential: Send + Sync {
    /// Distance beyond which this potential is exactly zero
    fn range(&self) -> f64;
}

/// The simplest possible potential, only defined by its range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TruncatedPotential {
    /// Interaction range
    pub range: f64,
}

impl PairPotential for TruncatedPotential {
    fn range(&self) -> f64 {
        self.range
    }
}

/// Table of pair potentials, indexed by the types of the two particles in the
/// pair. The table is symmetric: the potential for `(a, b)` is the same as the
/// potential for `(b, a)`. Pairs of types without a potential do not interact,
/// and never appear in neighbor lists.
#[derive(Clone)]
pub struct PotentialTable {
    n_types: usize,
    potentials: Vec<Option<Arc<dyn PairPotential>>>,
    /// Incremented every time the table is modified
    revision: u64,
}

impl std::fmt::Debug for PotentialTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ranges = self.potentials.iter()
            .map(|p| p.as_ref().map(|p| p.range()))
            .collect::<Vec<_>>();

        f.debug_struct("PotentialTable")
            .field("n_types", &self.n_types)
            .field("ranges", &ranges)
            .field("revision", &self.revision)
            .finish()
    }
}

impl PotentialTable {
    /// Create an empty table for `n_types` particle types
    pub fn new(n_types: usize) -> PotentialTable {
        PotentialTable {
            n_types: n_types,
            potentials: vec![None; n_types * n_types],
            revision: 0,
        }
    }

    /// Get the number of particle types in this table
    pub fn n_types(&self) -> usize {
        self.n_types
    }

    /// Get the revision number of this table. It changes every time a
    /// potential is added or removed.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn check_types(&self, type_a: usize, type_b: usize) -> Result<(), Error> {
        if type_a >= self.n_types || type_b >= self.n_types {
            return Err(Error::InvalidParameter(format!(
                "particle types ({}, {}) are out of bounds for a table with {} types",
                type_a, type_b, self.n_types
            )));
        }
        Ok(())
    }

    /// Set the potential acting between particles of types `type_a` and
    /// `type_b`, replacing any existing potential.
    pub fn set(&mut self, type_a: usize, type_b: usize, potential: Arc<dyn PairPotential>) -> Result<(), Error> {
        self.check_types(type_a, type_b)?;

        let range = potential.range();
        if !(range > 0.0 && range.is_finite()) {
            return Err(Error::InvalidParameter(format!(
                "potential range must be positive and finite, got {}", range
            )));
        }

        self.potentials[type_a * self.n_types + type_b] = Some(Arc::clone(&potential));
        self.potentials[type_b * self.n_types + type_a] = Some(potential);
        self.revision += 1;
        Ok(())
    }

    /// Remove the potential acting between particles of types `type_a` and
    /// `type_b`.
    pub fn remove(&mut self, type_a: usize, type_b: usize) -> Result<(), Error> {
        self.check_types(type_a, type_b)?;
        self.potentials[type_a * self.n_types + type_b] = None;
        self.potentials[type_b * self.n_types + type_a] = None;
        self.revision += 1;
        Ok(())
    }

    /// Get the potential between types `type_a` and `type_b`, if any
    #[inline]
    pub fn get(&self, type_a: usize, type_b: usize) -> Option<&dyn PairPotential> {
        if type_a >= self.n_types || type_b >= self.n_types {
            return None;
        }
        self.potentials[type_a * self.n_types + type_b].as_deref()
    }

    /// Check if particles of types `type_a` and `type_b` interact
    #[inline]
    pub fn interacts(&self, type_a: usize, type_b: usize) -> bool {
        self.get(type_a, type_b).is_some()
    }

    /// Get the largest range of all potentials involving `particle_type`, or
    /// `None` if this type does not interact with anything.
    pub fn max_range_for_type(&self, particle_type: usize) -> Option<f64> {
        let mut max = None;
        for other in 0..self.n_types {
            if let Some(potential) = self.get(particle_type, other) {
                let range = potential.range();
                max = Some(max.map_or(range, |m: f64| m.max(range)));
            }
        }
        return max;
    }

    /// Get the largest range of all potentials in this table, or `0.0` if the
    /// table is empty.
    pub fn max_range(&self) -> f64 {
        self.potentials.iter()
            .flatten()
            .map(|p| p.range())
            .fold(0.0, f64::max)
    }
}

/// Exclusion rules for pairs of particles that should never be part of the
/// neighbor lists, even when they are close to one another. This is typically
/// used for bonded particles, for which the non-bonded interaction is not
/// computed.
pub trait PairExclusion: Send + Sync {
    /// Should the pair between particles `i` and `j` be skipped?
    fn should_skip(&self, i: usize, j: usize) -> bool;

    /// Does this exclusion never skip any pair? This allows to skip calling
    /// `should_skip` for systems without bonds.
    fn is_trivial(&self) -> bool {
        false
    }
}

/// Exclusion rules for a system of independent particles, without any
/// excluded pair
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExclusion;

impl PairExclusion for NoExclusion {
    fn should_skip(&self, _: usize, _: usize) -> bool {
        false
    }

    fn is_trivial(&self) -> bool {
        true
    }
}

/// Exclusion of an explicit set of bonded pairs
#[derive(Debug, Clone, Default)]
pub struct BondedExclusion {
    pairs: BTreeSet<(usize, usize)>,
}

impl BondedExclusion {
    /// Create an empty set of excluded pairs
    pub fn new() -> BondedExclusion {
        BondedExclusion::default()
    }

    /// Exclude the pair between particles `i` and `j`
    pub fn add_bond(&mut self, i: usize, j: usize) {
        self.pairs.insert(sort_pair(i, j));
    }

    /// Get the number of excluded pairs
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Check if there are no excluded pairs
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl PairExclusion for BondedExclusion {
    fn should_skip(&self, i: usize, j: usize) -> bool {
        self.pairs.contains(&sort_pair(i, j))
    }

    fn is_trivial(&self) -> bool {
        self.pairs.is_empty()
    }
}

fn sort_pair(i: usize, j: usize) -> (usize, usize) {
    if i <= j { (i, j) } else { (j, i) }
}
