//! Verlet neighbor lists, built with a cell decomposition and kept up to date
//! as particles move.
//!
//! The lists are built with a range larger than the range of all the pair
//! potentials. Each particle can then move by a fraction of the difference
//! (the skin) before the lists need to be rebuilt, and the lists are only
//! rebuilt when some particle moved too far since the last update.
use log::{debug, warn};

use crate::{Boundary, CellIndex, Error, System, Vector};
use crate::{PairExclusion, NoExclusion, PotentialTable};

mod parameters;
pub use self::parameters::NeighborListParameters;

mod policy;
pub use self::policy::{NeighborPolicy, Plain, Lattice, HardCollision};

mod storage;
use self::storage::NeighborRows;

mod brute_force;
use self::brute_force::ImageSearch;

mod iterator;
pub use self::iterator::NeighborIterator;

/// Safety factor used to detect displacements that are large enough for
/// some pairs to have been missed
const UNSAFE_SAFETY_FACTOR: f64 = 0.5;

/// Information given to listeners after each rebuild of the neighbor lists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborsUpdated {
    /// Total number of rebuilds since the creation of the manager
    pub updates: u64,
    /// Number of particles in the lists
    pub n_particles: usize,
    /// Maximal number of neighbors for a single particle
    pub capacity: usize,
}

type Listener = Box<dyn FnMut(&NeighborsUpdated) + Send>;

/// Integration with the simulation driver, which notifies the neighbor lists
/// of the different stages of the simulation
pub trait NeighborManager<const D: usize> {
    /// (Re-)initialize the lists for the given system, after a change to the
    /// range or the potentials
    fn init(&mut self, system: &dyn System<D>) -> Result<(), Error>;

    /// Called once the integrator is ready to start moving particles
    fn integrator_initialized(&mut self, system: &dyn System<D>) -> Result<(), Error> {
        self.init(system)
    }

    /// Called at the start of every step, before computing any interaction.
    /// Returns `true` if the lists have been rebuilt.
    fn step_started(&mut self, system: &dyn System<D>) -> Result<bool, Error>;

    /// Get the range of the lists
    fn neighbor_range(&self) -> f64;

    /// Set the range of the lists. This takes effect at the next call to
    /// `init` or `step_started`.
    fn set_neighbor_range(&mut self, range: f64) -> Result<(), Error>;

    /// Enable or disable the storage of down neighbors
    fn set_do_down_neighbors(&mut self, down_lists: bool);
}

/// Filter deciding which candidate pairs end up in the lists
struct PairFilter<'a, const D: usize, P: NeighborPolicy<D>> {
    positions: &'a [Vector<D>],
    types: &'a [usize],
    potentials: &'a PotentialTable,
    exclusion: Option<&'a dyn PairExclusion>,
    policy: &'a P,
    range2: f64,
    /// Excluded pairs are only removed below this squared distance, so that
    /// periodic images of excluded pairs are still included
    exclusion_range2: f64,
    /// Number of pairs with both particles at the same position
    overlapping: usize,
}

impl<'a, const D: usize, P: NeighborPolicy<D>> PairFilter<'a, D, P> {
    /// Check the pair between `i < j`, with `offset` the periodic translation
    /// to apply to `j`. Returns the initial pair state if the pair should be
    /// stored.
    #[inline]
    fn check(&mut self, i: usize, j: usize, offset: Vector<D>) -> Option<P::State> {
        debug_assert!(i < j);
        if !self.potentials.interacts(self.types[i], self.types[j]) {
            return None;
        }

        let dr = self.positions[j] - self.positions[i] + offset;
        let r2 = dr.norm2();
        if r2 >= self.range2 {
            return None;
        }

        if let Some(exclusion) = self.exclusion {
            if r2 < self.exclusion_range2 && exclusion.should_skip(i, j) {
                return None;
            }
        }

        if !self.policy.accept(&dr, r2, self.range2) {
            return None;
        }

        if r2 == 0.0 {
            self.overlapping += 1;
        }

        return Some(self.policy.initial_state(i, j, &dr));
    }

    /// Check a candidate pair coming in any order, and store it in the up
    /// list of the particle with the smallest index.
    #[inline]
    fn add_pair(&mut self, rows: &mut NeighborRows<D, P::State>, i: usize, j: usize, offset: Vector<D>) {
        let (i, j, offset) = match i.cmp(&j) {
            std::cmp::Ordering::Less => (i, j, offset),
            std::cmp::Ordering::Greater => (j, i, -offset),
            // self images are never neighbors
            std::cmp::Ordering::Equal => return,
        };

        if let Some(state) = self.check(i, j, offset) {
            rows.push_up(i, j, offset, state);
        }
    }
}

/// Find all candidate pairs using the cell decomposition
fn scan_cells<const D: usize, P: NeighborPolicy<D>>(
    cells: &CellIndex<D>,
    filter: &mut PairFilter<'_, D, P>,
    rows: &mut NeighborRows<D, P::State>,
) {
    for i in 0..cells.n_particles() {
        let shift_i = cells.wrap_shift(i);

        for j in cells.following_in_cell(i) {
            let offset = cells.wrap_shift(j) - shift_i;
            filter.add_pair(rows, i, j, offset);
        }

        for (cell, box_offset) in cells.neighbor_cells(cells.cell_of(i)) {
            for j in cells.particles_in_cell(cell) {
                let offset = box_offset + cells.wrap_shift(j) - shift_i;
                filter.add_pair(rows, i, j, offset);
            }
        }
    }
}

fn is_power_of_ten(mut value: u64) -> bool {
    if value == 0 {
        return false;
    }
    while value % 10 == 0 {
        value /= 10;
    }
    return value == 1;
}

/// The `NeighborListManager` builds and maintains the neighbor lists of a
/// single system.
///
/// For each particle `i`, the up list contains all neighbors `j > i`, and the
/// (optional) down list contains all neighbors `j < i`. Each pair is stored
/// with the periodic image translation to apply to the position of the
/// neighbor, and with a state defined by the [`NeighborPolicy`].
pub struct NeighborListManager<const D: usize, P: NeighborPolicy<D> = Plain> {
    parameters: NeighborListParameters,
    potentials: PotentialTable,
    exclusion: Box<dyn PairExclusion>,
    policy: P,
    cells: CellIndex<D>,
    rows: NeighborRows<D, P::State>,
    /// Row capacity to use for the next rebuild
    capacity: usize,
    /// Squared displacement since the last rebuild triggering a new rebuild,
    /// for each particle type
    max_r2: Vec<f64>,
    /// Squared displacement since the last rebuild after which some pairs
    /// might have been missed, for each particle type
    max_r2_unsafe: Vec<f64>,
    /// Positions of the particles at the last rebuild
    snapshot: Vec<Vector<D>>,
    /// Box at the last rebuild
    boundary: Option<Boundary<D>>,
    /// Revision of the potential table at the last initialization, `None` if
    /// the manager needs to be initialized
    potentials_revision: Option<u64>,
    /// Set when the lists must be rebuilt, regardless of displacements
    needs_reset: bool,
    /// Number of calls to `check_update_neighbors` before the next check
    countdown: usize,
    num_updates: u64,
    num_unsafe: u64,
    listeners: Vec<Listener>,
}

impl<const D: usize> NeighborListManager<D, Plain> {
    /// Create a new manager storing all pairs within the range
    pub fn new(parameters: NeighborListParameters, potentials: PotentialTable) -> Result<Self, Error> {
        NeighborListManager::with_policy(parameters, potentials, Plain)
    }
}

impl<const D: usize, P: NeighborPolicy<D>> NeighborListManager<D, P> {
    /// Create a new manager using the given `policy` to filter pairs
    pub fn with_policy(parameters: NeighborListParameters, potentials: PotentialTable, policy: P) -> Result<Self, Error> {
        parameters.validate_with(&potentials)?;

        let mut cells = CellIndex::new(parameters.cell_radius)?;
        cells.set_range(parameters.neighbor_range)?;

        Ok(NeighborListManager {
            parameters: parameters,
            potentials: potentials,
            exclusion: Box::new(NoExclusion),
            policy: policy,
            cells: cells,
            rows: NeighborRows::new(0, parameters.initial_capacity)?,
            capacity: usize::max(parameters.initial_capacity, 1),
            max_r2: Vec::new(),
            max_r2_unsafe: Vec::new(),
            snapshot: Vec::new(),
            boundary: None,
            potentials_revision: None,
            needs_reset: true,
            countdown: parameters.update_interval,
            num_updates: 0,
            num_unsafe: 0,
            listeners: Vec::new(),
        })
    }

    /// Get the current parameters
    pub fn parameters(&self) -> &NeighborListParameters {
        &self.parameters
    }

    /// Get the pair potentials used by this manager
    pub fn potentials(&self) -> &PotentialTable {
        &self.potentials
    }

    /// Get mutable access to the pair potentials. Any modification is picked
    /// up at the next call to `check_update_neighbors`.
    pub fn potentials_mut(&mut self) -> &mut PotentialTable {
        &mut self.potentials
    }

    /// Replace the pair potentials used by this manager
    pub fn set_potentials(&mut self, potentials: PotentialTable) {
        self.potentials = potentials;
        self.potentials_revision = None;
    }

    /// Set the rules used to exclude pairs of particles from the lists
    pub fn set_exclusion(&mut self, exclusion: impl PairExclusion + 'static) {
        self.set_boxed_exclusion(Box::new(exclusion));
    }

    /// Set the rules used to exclude pairs of particles from the lists
    pub fn set_boxed_exclusion(&mut self, exclusion: Box<dyn PairExclusion>) {
        self.exclusion = exclusion;
        self.needs_reset = true;
    }

    /// Get the policy used to filter pairs
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Get the cell decomposition used in the last rebuild
    pub fn cells(&self) -> &CellIndex<D> {
        &self.cells
    }

    /// Get the range of the lists
    pub fn neighbor_range(&self) -> f64 {
        self.parameters.neighbor_range
    }

    /// Set the range of the lists, the lists will be re-initialized at the
    /// next call to `check_update_neighbors`.
    pub fn set_neighbor_range(&mut self, range: f64) -> Result<(), Error> {
        let mut parameters = self.parameters;
        parameters.neighbor_range = range;
        parameters.validate_with(&self.potentials)?;

        self.cells.set_range(range)?;
        self.parameters = parameters;
        self.potentials_revision = None;
        Ok(())
    }

    /// Are down lists stored?
    pub fn down_lists_enabled(&self) -> bool {
        self.parameters.down_lists
    }

    /// Enable or disable the storage of down lists. The lists are rebuilt at
    /// the next call to `check_update_neighbors`.
    pub fn set_do_down_neighbors(&mut self, down_lists: bool) {
        if self.parameters.down_lists != down_lists {
            self.parameters.down_lists = down_lists;
            self.needs_reset = true;
        }
    }

    /// Register a function to call after each rebuild of the lists
    pub fn add_listener(&mut self, listener: impl FnMut(&NeighborsUpdated) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Get the number of rebuilds of the lists
    pub fn num_updates(&self) -> u64 {
        self.num_updates
    }

    /// Get the number of updates that happened after particles moved far
    /// enough that some pairs might have been missed
    pub fn num_unsafe_updates(&self) -> u64 {
        self.num_unsafe
    }

    /// Get the current maximal number of neighbors per particle
    pub fn capacity(&self) -> usize {
        self.rows.capacity()
    }

    /// Get the total number of pairs in the lists
    pub fn n_pairs(&self) -> usize {
        (0..self.rows.n_particles()).map(|i| self.rows.n_up(i)).sum()
    }

    /// Get an iterator over the lists, using the current `positions` of the
    /// particles
    pub fn iterator<'a>(&'a self, positions: &'a [Vector<D>]) -> NeighborIterator<'a, D, P> {
        NeighborIterator::new(self, positions)
    }

    /// Initialize the manager for the given system: compute the maximal
    /// displacements for each particle type from the potentials, and build
    /// the lists.
    pub fn init(&mut self, system: &dyn System<D>) -> Result<(), Error> {
        self.parameters.validate_with(&self.potentials)?;

        let range = self.parameters.neighbor_range;
        let safety_factor = self.parameters.safety_factor;

        let n_types = self.potentials.n_types();
        self.max_r2 = Vec::with_capacity(n_types);
        self.max_r2_unsafe = Vec::with_capacity(n_types);
        for particle_type in 0..n_types {
            if let Some(potential_range) = self.potentials.max_range_for_type(particle_type) {
                let skin = range - potential_range;
                self.max_r2.push((skin * safety_factor).powi(2));
                self.max_r2_unsafe.push((skin * UNSAFE_SAFETY_FACTOR).powi(2));
            } else {
                // particles without interactions can move freely
                self.max_r2.push(f64::INFINITY);
                self.max_r2_unsafe.push(f64::INFINITY);
            }
        }

        self.potentials_revision = Some(self.potentials.revision());
        return self.reset(system);
    }

    fn check_types(&self, system: &dyn System<D>) -> Result<(), Error> {
        let n_types = self.potentials.n_types();
        if let Some(&bad) = system.types().iter().find(|&&t| t >= n_types) {
            return Err(Error::InvalidParameter(format!(
                "particle type {} is not part of the potential table ({} types)", bad, n_types
            )));
        }
        Ok(())
    }

    /// Rebuild the lists from scratch for the current positions in `system`
    #[time_graph::instrument(name = "NeighborListManager::reset")]
    pub fn reset(&mut self, system: &dyn System<D>) -> Result<(), Error> {
        if self.potentials_revision.is_none() {
            return self.init(system);
        }

        self.check_types(system)?;
        let rows = self.build_rows(system)?;

        // only replace the lists once the new ones are complete
        self.rows = rows;
        self.snapshot.clear();
        self.snapshot.extend_from_slice(system.positions());
        self.boundary = Some(*system.boundary());
        self.needs_reset = false;
        self.countdown = self.parameters.update_interval;
        self.num_updates += 1;

        debug!(
            "rebuilt neighbor lists for {} particles: {} pairs, capacity {}",
            self.rows.n_particles(), self.n_pairs(), self.rows.capacity()
        );

        let event = NeighborsUpdated {
            updates: self.num_updates,
            n_particles: self.rows.n_particles(),
            capacity: self.rows.capacity(),
        };
        for listener in &mut self.listeners {
            listener(&event);
        }

        Ok(())
    }

    /// Build new lists for the given system, growing the capacity until all
    /// pairs fit in the rows
    fn build_rows(&mut self, system: &dyn System<D>) -> Result<NeighborRows<D, P::State>, Error> {
        let boundary = system.boundary();
        let positions = system.positions();
        let range = self.parameters.neighbor_range;

        let image_search = if boundary.is_rectangular() {
            self.cells.assign_cell_all(system)?;
            None
        } else {
            Some(ImageSearch::new(boundary, range))
        };

        let exclusion = if self.exclusion.is_trivial() {
            None
        } else {
            Some(&*self.exclusion)
        };
        let half_length = boundary.min_periodic_length() / 2.0;

        let mut capacity = self.capacity;
        loop {
            let mut rows = NeighborRows::new(positions.len(), capacity)?;
            let mut filter = PairFilter {
                positions: positions,
                types: system.types(),
                potentials: &self.potentials,
                exclusion: exclusion,
                policy: &self.policy,
                range2: range * range,
                exclusion_range2: half_length * half_length,
                overlapping: 0,
            };

            if let Some(search) = &image_search {
                search.for_each_pair(positions, |i, j, offset| filter.add_pair(&mut rows, i, j, offset));
            } else {
                scan_cells(&self.cells, &mut filter, &mut rows);
            }

            let complete = rows.max_overflow() == 0 && (!self.parameters.down_lists || rows.mirror_down());
            if complete {
                if filter.overlapping != 0 && !self.parameters.quiet {
                    warn!("found {} pairs of particles at the exact same position", filter.overlapping);
                }
                self.capacity = capacity;
                return Ok(rows);
            }

            let grown = rows.grown_capacity();
            debug!("neighbor lists overflowed, growing capacity from {} to {}", capacity, grown);
            capacity = grown;
        }
    }

    /// Check if the lists need to be rebuilt, and rebuild them if needed.
    /// Returns `true` if the lists have been rebuilt.
    ///
    /// The lists are rebuilt when the potentials, the box, the number of
    /// particles or the parameters changed, when any particle moved further
    /// than the safe displacement since the last rebuild, or when a particle
    /// was folded back inside the box. Displacements are measured between
    /// nearest images, so folding a particle is never an unsafe update.
    #[time_graph::instrument(name = "NeighborListManager::check_update_neighbors")]
    pub fn check_update_neighbors(&mut self, system: &dyn System<D>) -> Result<bool, Error> {
        if self.potentials_revision != Some(self.potentials.revision()) {
            self.init(system)?;
            return Ok(true);
        }

        if self.needs_reset || system.size() != self.snapshot.len() || self.boundary.as_ref() != Some(system.boundary()) {
            self.reset(system)?;
            return Ok(true);
        }

        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown > 0 {
            return Ok(false);
        }
        self.countdown = self.parameters.update_interval;

        let boundary = system.boundary();
        let mut needs_update = false;
        let mut largest_unsafe: Option<(usize, f64)> = None;
        for (i, (position, &particle_type)) in system.positions().iter().zip(system.types()).enumerate() {
            let mut displacement = *position - self.snapshot[i];
            let images = boundary.nearest_image_count(displacement);
            if images != [0; D] {
                // the particle was folded back inside the box, the stored
                // offsets no longer match its position
                needs_update = true;
                displacement -= boundary.image_offset(images);
            }

            let r2 = displacement.norm2();
            // unknown types force an update, which will report the error
            let max_r2 = self.max_r2.get(particle_type).copied().unwrap_or(0.0);
            if r2 > max_r2 {
                needs_update = true;
                let max_r2_unsafe = self.max_r2_unsafe.get(particle_type).copied().unwrap_or(0.0);
                if r2 > max_r2_unsafe && largest_unsafe.map_or(true, |(_, previous)| r2 > previous) {
                    largest_unsafe = Some((i, r2));
                }
            }
        }

        if let Some((particle, r2)) = largest_unsafe {
            self.num_unsafe += 1;
            if !self.parameters.quiet && is_power_of_ten(self.num_unsafe) {
                warn!(
                    "neighbor lists updated too late: particle {} moved by {} since the last update \
                    ({} unsafe updates so far), some interactions might have been missed",
                    particle, r2.sqrt(), self.num_unsafe
                );
            }
        }

        if needs_update {
            self.reset(system)?;
        }

        return Ok(needs_update);
    }

    /// Check if the lists are up to date with the potentials, the parameters
    /// and the box of `system`, allowing incremental updates
    fn is_current(&self, system: &dyn System<D>) -> bool {
        self.potentials_revision == Some(self.potentials.revision())
            && !self.needs_reset
            && self.boundary.as_ref() == Some(system.boundary())
    }

    /// Update the lists after a single particle was appended at the end of
    /// the system. Only the pairs involving the new particle are searched,
    /// other changes to the system lead to a full rebuild of the lists.
    #[time_graph::instrument(name = "NeighborListManager::particle_added")]
    pub fn particle_added(&mut self, system: &dyn System<D>) -> Result<(), Error> {
        let n_particles = system.size();
        if !self.is_current(system) || n_particles != self.rows.n_particles() + 1 {
            return self.reset(system);
        }

        self.check_types(system)?;

        let boundary = system.boundary();
        let positions = system.positions();
        let new = n_particles - 1;
        let range = self.parameters.neighbor_range;
        let exclusion = if self.exclusion.is_trivial() {
            None
        } else {
            Some(&*self.exclusion)
        };
        let half_length = boundary.min_periodic_length() / 2.0;

        if boundary.is_rectangular() {
            self.cells.assign_cell_all(system)?;
        }

        let mut filter = PairFilter {
            positions: positions,
            types: system.types(),
            potentials: &self.potentials,
            exclusion: exclusion,
            policy: &self.policy,
            range2: range * range,
            exclusion_range2: half_length * half_length,
            overlapping: 0,
        };

        // pairs (i, new), with the offset to apply to the new particle
        let mut pairs = Vec::new();
        if boundary.is_rectangular() {
            let cells = &self.cells;
            let shift_new = cells.wrap_shift(new);
            let cell = cells.cell_of(new);

            let mut add = |i: usize, box_offset: Vector<D>| {
                if i == new {
                    return;
                }
                let offset = shift_new - cells.wrap_shift(i) - box_offset;
                if let Some(state) = filter.check(i, new, offset) {
                    pairs.push((i, offset, state));
                }
            };

            for i in cells.particles_in_cell(cell) {
                add(i, Vector::zero());
            }
            for (other, box_offset) in cells.all_neighbor_cells(cell) {
                for i in cells.particles_in_cell(other) {
                    add(i, box_offset);
                }
            }
        } else {
            let search = ImageSearch::new(boundary, range);
            search.for_each_pair_with(positions, new, |i, j, offset| {
                debug_assert_eq!(j, new);
                if let Some(state) = filter.check(i, j, offset) {
                    pairs.push((i, offset, state));
                }
            });
        }

        let mut capacity = self.rows.capacity();
        let rows = loop {
            let mut rows = self.rows.resized(n_particles, capacity)?;
            for &(i, offset, state) in &pairs {
                rows.push_up(i, new, offset, state);
                if self.parameters.down_lists {
                    rows.push_down(new, i, -offset, state);
                }
            }

            if rows.max_overflow() == 0 {
                break rows;
            }
            capacity = rows.grown_capacity();
        };

        debug!("added particle {} with {} neighbors", new, pairs.len());

        self.rows = rows;
        self.capacity = usize::max(self.capacity, capacity);
        self.snapshot.push(positions[new]);

        Ok(())
    }

    /// Update the lists after the particle at `index` was removed from the
    /// system. When this was the last particle, its pairs are removed from
    /// the lists of its neighbors, otherwise (since the indexes of other
    /// particles changed) the lists are rebuilt.
    #[time_graph::instrument(name = "NeighborListManager::particle_removed")]
    pub fn particle_removed(&mut self, system: &dyn System<D>, index: usize) -> Result<(), Error> {
        let n_particles = system.size();
        if !self.is_current(system) || n_particles + 1 != self.rows.n_particles() || index != n_particles {
            return self.reset(system);
        }

        // only particles with a smaller index can have the removed one in
        // their up list
        let mut owners = if self.parameters.down_lists {
            self.rows.down_slots(index).map(|slot| self.rows.neighbor(slot)).collect()
        } else {
            (0..index).collect::<Vec<_>>()
        };
        owners.sort_unstable();
        owners.dedup();

        for &i in &owners {
            self.rows.remove_up(i, index);
        }
        self.rows.pop_row();
        self.snapshot.truncate(n_particles);

        Ok(())
    }
}

impl<const D: usize, F> NeighborListManager<D, HardCollision<F>> where F: Fn(usize, usize, &Vector<D>) -> i32 {
    /// Set the state of the pair between particles `i` and `j`, in both the
    /// list of `i` and the list of `j`. If the pair is stored multiple times
    /// (for multiple periodic images), all the copies are updated.
    pub fn set_pair_state(&mut self, i: usize, j: usize, state: i32) -> Result<(), Error> {
        let n_particles = self.rows.n_particles();
        if i >= n_particles || j >= n_particles {
            return Err(Error::InvalidParameter(format!(
                "particles ({}, {}) are out of bounds for lists with {} particles", i, j, n_particles
            )));
        }

        let mut found = false;
        for (a, b) in [(i, j), (j, i)] {
            let slots = self.rows.up_slots(a).chain(self.rows.down_slots(a));
            for slot in slots {
                if self.rows.neighbor(slot) == b {
                    self.rows.set_state(slot, state);
                    found = true;
                }
            }
        }

        if !found {
            return Err(Error::InvalidParameter(format!(
                "particles {} and {} are not neighbors", i, j
            )));
        }

        Ok(())
    }

    /// Get the state of the pair between particles `i` and `j`, or `None` if
    /// they are not neighbors
    pub fn pair_state(&self, i: usize, j: usize) -> Option<i32> {
        if i >= self.rows.n_particles() {
            return None;
        }

        let mut slots = self.rows.up_slots(i).chain(self.rows.down_slots(i));
        return slots.find(|&slot| self.rows.neighbor(slot) == j).map(|slot| self.rows.state(slot));
    }
}

impl<const D: usize, P: NeighborPolicy<D>> NeighborManager<D> for NeighborListManager<D, P> {
    fn init(&mut self, system: &dyn System<D>) -> Result<(), Error> {
        NeighborListManager::init(self, system)
    }

    fn step_started(&mut self, system: &dyn System<D>) -> Result<bool, Error> {
        self.check_update_neighbors(system)
    }

    fn neighbor_range(&self) -> f64 {
        NeighborListManager::neighbor_range(self)
    }

    fn set_neighbor_range(&mut self, range: f64) -> Result<(), Error> {
        NeighborListManager::set_neighbor_range(self, range)
    }

    fn set_do_down_neighbors(&mut self, down_lists: bool) {
        NeighborListManager::set_do_down_neighbors(self, down_lists);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use approx::assert_relative_eq;

    use super::*;
    use crate::{BondedExclusion, SimpleSystem, TruncatedPotential, Vector1D, Vector3D};
    use crate::systems::test_utils::{random_system, reference_pairs, ring};

    fn potentials(n_types: usize, range: f64) -> PotentialTable {
        let mut table = PotentialTable::new(n_types);
        for a in 0..n_types {
            for b in a..n_types {
                table.set(a, b, Arc::new(TruncatedPotential { range })).unwrap();
            }
        }
        return table;
    }

    fn ring_manager(down_lists: bool) -> NeighborListManager<1> {
        let mut parameters = NeighborListParameters::new(4.0);
        parameters.cell_radius = 1;
        parameters.down_lists = down_lists;
        NeighborListManager::new(parameters, potentials(1, 3.0)).unwrap()
    }

    #[test]
    fn power_of_ten() {
        assert!(is_power_of_ten(1));
        assert!(is_power_of_ten(10));
        assert!(is_power_of_ten(1000));
        assert!(!is_power_of_ten(0));
        assert!(!is_power_of_ten(20));
        assert!(!is_power_of_ten(11));
    }

    #[test]
    fn ring_neighbors() {
        let system = ring();
        let mut manager = ring_manager(true);
        manager.init(&system).unwrap();

        let iterator = manager.iterator(system.positions());

        // the pair 0-3 crosses the box
        let mut up = Vec::new();
        iterator.iter_up_neighbors(0, |j, dr| up.push((j, dr)));
        assert_eq!(up, [(1, Vector1D::new([3.0])), (3, Vector1D::new([-1.0]))]);

        let mut down = Vec::new();
        iterator.iter_down_neighbors(3, |j, dr| down.push((j, dr)));
        assert_eq!(down, [(0, Vector1D::new([1.0])), (2, Vector1D::new([-3.0]))]);

        let mut all = Vec::new();
        iterator.iter_all_neighbors(0, |j, _| all.push(j)).unwrap();
        assert_eq!(all, [1, 3]);

        assert_eq!(manager.n_pairs(), 4);
    }

    #[test]
    fn all_neighbors_without_down_lists() {
        let system = ring();
        let mut manager = ring_manager(false);
        manager.init(&system).unwrap();

        let iterator = manager.iterator(system.positions());
        let error = iterator.iter_all_neighbors(0, |_, _| {}).unwrap_err();
        assert!(matches!(error, Error::Unsupported(_)));
        assert_eq!(iterator.n_down_neighbors(3), 0);
    }

    #[test]
    fn matches_reference() {
        let boundary = Boundary::rectangular([12.0, 10.0, 11.0], [true, true, false]);
        let system = random_system(400, boundary, 2, 7);

        let mut table = potentials(2, 2.0);
        table.remove(0, 1).unwrap();
        let mut manager = NeighborListManager::<3, _>::new(NeighborListParameters::new(2.5), table).unwrap();
        manager.init(&system).unwrap();

        let expected = reference_pairs(&system, 2.5).into_iter()
            .filter(|((i, j), _)| system.types()[*i] == system.types()[*j])
            .map(|(pair, images)| (pair, images.len()))
            .collect::<std::collections::BTreeMap<_, _>>();

        let mut actual = std::collections::BTreeMap::new();
        let iterator = manager.iterator(system.positions());
        for i in 0..system.size() {
            iterator.iter_up_neighbors(i, |j, dr| {
                assert!(j > i);
                assert_relative_eq!(dr.norm(), boundary.distance(system.positions()[i], system.positions()[j]), epsilon = 1e-9);
                *actual.entry((i, j)).or_insert(0) += 1;
            });
        }

        assert_eq!(actual, expected);
    }

    #[test]
    fn capacity_growth() {
        let system = random_system(200, Boundary::cubic(6.0), 1, 3);
        let mut parameters = NeighborListParameters::new(2.0);
        parameters.initial_capacity = 1;

        let mut manager = NeighborListManager::<3, _>::new(parameters, potentials(1, 1.5)).unwrap();
        manager.init(&system).unwrap();
        assert!(manager.capacity() > 1);

        let expected = reference_pairs(&system, 2.0).values().map(|images| images.len()).sum::<usize>();
        assert_eq!(manager.n_pairs(), expected);

        let iterator = manager.iterator(system.positions());
        for i in 0..system.size() {
            assert!(iterator.n_up_neighbors(i) + iterator.n_down_neighbors(i) <= manager.capacity());
        }
    }

    #[test]
    fn update_on_displacement() {
        let mut system = SimpleSystem::new(Boundary::cubic(10.0));
        system.add_particle(0, Vector3D::new([1.0, 1.0, 1.0]));
        system.add_particle(0, Vector3D::new([3.0, 1.0, 1.0]));

        // skin of 1, safe displacement of 0.4
        let mut manager = NeighborListManager::<3, _>::new(NeighborListParameters::new(3.0), potentials(1, 2.0)).unwrap();
        assert!(manager.check_update_neighbors(&system).unwrap());
        assert_eq!(manager.num_updates(), 1);

        system.positions_mut()[0][0] += 0.3;
        assert!(!manager.check_update_neighbors(&system).unwrap());

        system.positions_mut()[0][0] += 0.15;
        assert!(manager.check_update_neighbors(&system).unwrap());
        assert_eq!(manager.num_updates(), 2);
        assert_eq!(manager.num_unsafe_updates(), 0);

        // moving by more than half of the skin is unsafe
        system.positions_mut()[1][1] += 0.6;
        assert!(manager.check_update_neighbors(&system).unwrap());
        assert_eq!(manager.num_unsafe_updates(), 1);

        // changing the box forces an update
        system.set_boundary(Boundary::cubic(11.0));
        assert!(manager.check_update_neighbors(&system).unwrap());
        assert_eq!(manager.num_updates(), 4);
    }

    #[test]
    fn update_interval() {
        let mut system = SimpleSystem::new(Boundary::cubic(10.0));
        system.add_particle(0, Vector3D::new([1.0, 1.0, 1.0]));

        let mut parameters = NeighborListParameters::new(3.0);
        parameters.update_interval = 3;
        let mut manager = NeighborListManager::<3, _>::new(parameters, potentials(1, 2.0)).unwrap();
        manager.init(&system).unwrap();

        system.positions_mut()[0][0] += 1.0;
        assert!(!manager.check_update_neighbors(&system).unwrap());
        assert!(!manager.check_update_neighbors(&system).unwrap());
        assert!(manager.check_update_neighbors(&system).unwrap());
    }

    #[test]
    fn non_interacting_types() {
        let mut system = SimpleSystem::new(Boundary::cubic(10.0));
        system.add_particle(0, Vector3D::new([1.0, 1.0, 1.0]));
        system.add_particle(1, Vector3D::new([2.0, 1.0, 1.0]));

        let mut table = PotentialTable::new(2);
        table.set(0, 0, Arc::new(TruncatedPotential { range: 2.0 })).unwrap();
        let mut manager = NeighborListManager::<3, _>::new(NeighborListParameters::new(3.0), table).unwrap();
        manager.init(&system).unwrap();
        assert_eq!(manager.n_pairs(), 0);

        // type 1 has no interaction and can move freely
        system.positions_mut()[1][0] += 4.0;
        assert!(!manager.check_update_neighbors(&system).unwrap());

        system.add_particle(2, Vector3D::new([1.0, 2.0, 1.0]));
        let error = manager.check_update_neighbors(&system).unwrap_err();
        assert!(matches!(error, Error::InvalidParameter(_)));
    }

    #[test]
    fn potential_changes() {
        let system = random_system(50, Boundary::cubic(8.0), 1, 12);
        let mut manager = NeighborListManager::<3, _>::new(NeighborListParameters::new(3.0), potentials(1, 2.0)).unwrap();
        manager.init(&system).unwrap();
        assert!(!manager.check_update_neighbors(&system).unwrap());

        manager.potentials_mut().set(0, 0, Arc::new(TruncatedPotential { range: 2.5 })).unwrap();
        assert!(manager.check_update_neighbors(&system).unwrap());
        assert_eq!(manager.num_updates(), 2);

        // the range must stay larger than all potentials
        manager.potentials_mut().set(0, 0, Arc::new(TruncatedPotential { range: 3.5 })).unwrap();
        assert!(manager.check_update_neighbors(&system).is_err());

        assert!(manager.set_neighbor_range(3.2).is_err());
        manager.set_neighbor_range(4.0).unwrap();
        assert!(manager.check_update_neighbors(&system).unwrap());
    }

    #[test]
    fn exclusions() {
        let mut system = SimpleSystem::new(Boundary::cubic(10.0));
        system.add_particle(0, Vector3D::new([1.0, 1.0, 1.0]));
        system.add_particle(0, Vector3D::new([2.0, 1.0, 1.0]));
        system.add_particle(0, Vector3D::new([1.0, 2.0, 1.0]));

        let mut manager = NeighborListManager::<3, _>::new(NeighborListParameters::new(3.0), potentials(1, 2.0)).unwrap();
        let mut bonds = BondedExclusion::new();
        bonds.add_bond(0, 1);
        manager.set_exclusion(bonds);
        manager.init(&system).unwrap();

        let mut neighbors = Vec::new();
        manager.iterator(system.positions()).iter_all_neighbors(0, |j, _| neighbors.push(j)).unwrap();
        assert_eq!(neighbors, [2]);

        // periodic images of excluded pairs further than half the box are
        // still neighbors
        let mut system = SimpleSystem::new(Boundary::periodic([5.0, 20.0, 20.0]));
        system.add_particle(0, Vector3D::new([0.5, 1.0, 1.0]));
        system.add_particle(0, Vector3D::new([2.7, 1.0, 1.0]));
        manager.init(&system).unwrap();

        let mut neighbors = Vec::new();
        manager.iterator(system.positions()).iter_up_neighbors(0, |j, dr| neighbors.push((j, dr)));
        assert_eq!(neighbors.len(), 1);
        assert_relative_eq!(neighbors[0].1, Vector3D::new([-2.8, 0.0, 0.0]), epsilon = 1e-12);
    }

    #[test]
    fn listeners() {
        let system = random_system(30, Boundary::cubic(8.0), 1, 1);
        let events = Arc::new(Mutex::new(Vec::new()));

        let mut manager = NeighborListManager::<3, _>::new(NeighborListParameters::new(3.0), potentials(1, 2.0)).unwrap();
        let recorded = Arc::clone(&events);
        manager.add_listener(move |event| recorded.lock().unwrap().push(*event));

        manager.init(&system).unwrap();
        manager.reset(&system).unwrap();
        assert!(!manager.check_update_neighbors(&system).unwrap());

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].updates, 2);
        assert_eq!(events[1].n_particles, 30);
        assert_eq!(events[1].capacity, manager.capacity());
    }

    #[test]
    fn hard_collision_state() {
        let system = random_system(100, Boundary::cubic(7.0), 1, 5);
        let policy = HardCollision::new(|_: usize, _: usize, dr: &Vector3D| {
            if dr.norm() < 1.0 { 1 } else { 0 }
        });

        let mut manager = NeighborListManager::<3, _>::with_policy(NeighborListParameters::new(2.0), potentials(1, 1.5), policy).unwrap();
        manager.init(&system).unwrap();

        let iterator = manager.iterator(system.positions());
        let mut pair = None;
        for i in 0..system.size() {
            iterator.iter_up_neighbors_with_state(i, |j, dr, state| {
                assert_eq!(state, i32::from(dr.norm() < 1.0));
                pair = Some((i, j));
            });
        }

        let (i, j) = pair.expect("no pair found");
        manager.set_pair_state(i, j, 42).unwrap();
        assert_eq!(manager.pair_state(i, j), Some(42));
        assert_eq!(manager.pair_state(j, i), Some(42));

        let iterator = manager.iterator(system.positions());
        let mut down_state = None;
        iterator.iter_down_neighbors_with_state(j, |k, _, state| {
            if k == i {
                down_state = Some(state);
            }
        });
        assert_eq!(down_state, Some(42));

        let mut states = Vec::new();
        iterator.iter_all_neighbors_with_state(i, |k, dr, state| {
            if k == j {
                states.push(state);
            } else {
                assert_eq!(state, i32::from(dr.norm() < 1.0));
            }
        }).unwrap();
        assert_eq!(states, [42]);

        let not_neighbors = (0..system.size()).find(|&k| k != i && manager.pair_state(i, k).is_none()).unwrap();
        assert!(manager.set_pair_state(i, not_neighbors, 3).is_err());
        assert!(manager.set_pair_state(i, 1000, 3).is_err());

        manager.set_do_down_neighbors(false);
        manager.init(&system).unwrap();
        let iterator = manager.iterator(system.positions());
        let error = iterator.iter_all_neighbors_with_state(i, |_, _, _| {}).unwrap_err();
        assert!(matches!(error, Error::Unsupported(_)));
    }

    #[test]
    fn lattice_policy() {
        let mut system = SimpleSystem::new(Boundary::periodic([5.0, 5.0]));
        for x in 0..5 {
            for y in 0..5 {
                system.add_particle(0, Vector::new([x as f64, y as f64]));
            }
        }

        let mut parameters = NeighborListParameters::new(1.6);
        parameters.cell_radius = 1;
        let mut manager = NeighborListManager::<2, _>::with_policy(parameters, potentials(1, 1.1), Lattice).unwrap();
        manager.init(&system).unwrap();

        // 4 neighbors per site, diagonals at sqrt(2) are excluded
        let iterator = manager.iterator(system.positions());
        for i in 0..system.size() {
            let mut count = 0;
            iterator.iter_all_neighbors(i, |_, dr| {
                assert_relative_eq!(dr.norm(), 1.0, epsilon = 1e-12);
                count += 1;
            }).unwrap();
            assert_eq!(count, 4);
        }
    }

    /// All pairs stored in the lists, with the distance vectors rounded to be
    /// comparable
    fn sorted_pairs<P: NeighborPolicy<3>>(manager: &NeighborListManager<3, P>, positions: &[Vector3D]) -> Vec<(usize, usize, [i64; 3])> {
        let iterator = manager.iterator(positions);
        let mut pairs = Vec::new();
        for i in 0..positions.len() {
            let mut push = |j: usize, dr: Vector3D| {
                pairs.push((i, j, dr.into_array().map(|x| (x * 1e6).round() as i64)));
            };
            iterator.iter_up_neighbors(i, &mut push);
            iterator.iter_down_neighbors(i, &mut push);
        }
        pairs.sort_unstable();
        return pairs;
    }

    #[test]
    fn triclinic_particle_added() {
        let boundary = Boundary::from_lengths_angles(8.0, 8.0, 8.0, 80.0, 95.0, 70.0);
        let mut system = random_system(60, boundary, 1, 8);

        let mut manager = NeighborListManager::<3, _>::new(NeighborListParameters::new(2.5), potentials(1, 2.0)).unwrap();
        manager.init(&system).unwrap();

        system.add_particle(0, Vector3D::new([1.0, 2.0, 3.0]));
        manager.particle_added(&system).unwrap();
        assert_eq!(manager.num_updates(), 1);

        let mut full = NeighborListManager::<3, _>::new(NeighborListParameters::new(2.5), potentials(1, 2.0)).unwrap();
        full.init(&system).unwrap();

        assert_eq!(sorted_pairs(&manager, system.positions()), sorted_pairs(&full, system.positions()));
        assert!(!manager.check_update_neighbors(&system).unwrap());
    }

    #[test]
    fn rectangular_particle_added() {
        let boundary = Boundary::rectangular([7.0, 6.0, 8.0], [true, true, false]);
        let mut system = random_system(80, boundary, 1, 4);

        let mut manager = NeighborListManager::<3, _>::new(NeighborListParameters::new(2.5), potentials(1, 2.0)).unwrap();
        manager.init(&system).unwrap();

        // inside the box, close to a periodic face, and outside of the box
        for position in [[3.0, 3.0, 4.0], [6.9, 0.1, 1.0], [-2.0, 8.5, 9.0]] {
            system.add_particle(0, Vector3D::new(position));
            manager.particle_added(&system).unwrap();
        }
        assert_eq!(manager.num_updates(), 1);

        let mut full = NeighborListManager::<3, _>::new(NeighborListParameters::new(2.5), potentials(1, 2.0)).unwrap();
        full.init(&system).unwrap();
        assert_eq!(sorted_pairs(&manager, system.positions()), sorted_pairs(&full, system.positions()));

        // the state of new pairs comes from the policy
        let policy = HardCollision::new(|_: usize, _: usize, dr: &Vector3D| {
            if dr.norm() < 1.0 { 1 } else { 0 }
        });
        let mut manager = NeighborListManager::<3, _>::with_policy(NeighborListParameters::new(2.5), potentials(1, 2.0), policy).unwrap();
        manager.init(&system).unwrap();

        let close = system.positions()[0] + Vector3D::new([0.5, 0.0, 0.0]);
        system.add_particle(0, close);
        manager.particle_added(&system).unwrap();
        assert_eq!(manager.num_updates(), 1);
        assert_eq!(manager.pair_state(0, system.size() - 1), Some(1));
    }

    #[test]
    fn particle_removed() {
        let boundary = Boundary::periodic([7.0, 6.0, 8.0]);
        for down_lists in [true, false] {
            let mut system = random_system(80, boundary, 1, 10);
            let mut parameters = NeighborListParameters::new(2.5);
            parameters.down_lists = down_lists;

            let mut manager = NeighborListManager::<3, _>::new(parameters, potentials(1, 2.0)).unwrap();
            manager.init(&system).unwrap();

            for _ in 0..3 {
                system.pop_particle();
                manager.particle_removed(&system, system.size()).unwrap();
            }
            assert_eq!(manager.num_updates(), 1);
            assert_eq!(manager.n_pairs(), reference_pairs(&system, 2.5).values().map(|images| images.len()).sum::<usize>());

            let mut full = NeighborListManager::<3, _>::new(parameters, potentials(1, 2.0)).unwrap();
            full.init(&system).unwrap();
            assert_eq!(sorted_pairs(&manager, system.positions()), sorted_pairs(&full, system.positions()));
            assert!(!manager.check_update_neighbors(&system).unwrap());

            // removing another particle changes the indexes, and rebuilds the
            // lists
            let mut other = SimpleSystem::new(boundary);
            for (i, (&particle_type, &position)) in system.types().iter().zip(system.positions()).enumerate() {
                if i != 5 {
                    other.add_particle(particle_type, position);
                }
            }
            manager.particle_removed(&other, 5).unwrap();
            assert_eq!(manager.num_updates(), 2);
        }
    }

    #[test]
    fn folded_particles() {
        let mut system = SimpleSystem::new(Boundary::cubic(6.0));
        system.add_particle(0, Vector3D::new([5.99, 3.0, 3.0]));
        system.add_particle(0, Vector3D::new([1.0, 3.0, 3.0]));

        let mut manager = NeighborListManager::<3, _>::new(NeighborListParameters::new(3.0), potentials(1, 2.0)).unwrap();
        manager.init(&system).unwrap();

        // a small move across the face of the box, folded back inside
        system.positions_mut()[0][0] = 0.01;
        assert!(manager.check_update_neighbors(&system).unwrap());
        assert_eq!(manager.num_unsafe_updates(), 0);

        let mut neighbors = Vec::new();
        manager.iterator(system.positions()).iter_up_neighbors(0, |j, dr| neighbors.push((j, dr)));
        assert_eq!(neighbors.len(), 1);
        assert_relative_eq!(neighbors[0].1, Vector3D::new([0.99, 0.0, 0.0]), epsilon = 1e-12);

        // small moves in a triclinic box do not trigger a rebuild
        let boundary = Boundary::from_lengths_angles(8.0, 8.0, 8.0, 80.0, 95.0, 70.0);
        let mut system = random_system(30, boundary, 1, 2);
        let mut manager = NeighborListManager::<3, _>::new(NeighborListParameters::new(3.0), potentials(1, 2.0)).unwrap();
        manager.init(&system).unwrap();

        for position in system.positions_mut() {
            position[0] += 0.1;
        }
        assert!(!manager.check_update_neighbors(&system).unwrap());
    }
}
