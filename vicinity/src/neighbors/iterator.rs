use crate::{Error, Vector};

use super::NeighborListManager;
use super::policy::NeighborPolicy;

/// Read-only access to the neighbor lists of a [`NeighborListManager`],
/// computing the distance vectors from the current positions of the
/// particles.
///
/// For each neighbor `j` of particle `i`, the distance vector is computed as
/// `x_j - x_i + offset`, where `offset` is the periodic image translation
/// found when building the lists. The positions must be the same as the ones
/// used to check for updates of the lists, although the particles are allowed
/// to have moved since the lists were built.
pub struct NeighborIterator<'a, const D: usize, P: NeighborPolicy<D>> {
    manager: &'a NeighborListManager<D, P>,
    positions: &'a [Vector<D>],
}

impl<'a, const D: usize, P: NeighborPolicy<D>> NeighborIterator<'a, D, P> {
    pub(crate) fn new(manager: &'a NeighborListManager<D, P>, positions: &'a [Vector<D>]) -> NeighborIterator<'a, D, P> {
        assert_eq!(
            positions.len(), manager.rows.n_particles(),
            "the number of particles changed since the neighbor lists were built"
        );

        NeighborIterator {
            manager: manager,
            positions: positions,
        }
    }

    /// Get the number of up neighbors of particle `i`
    pub fn n_up_neighbors(&self, i: usize) -> usize {
        self.manager.rows.n_up(i)
    }

    /// Get the number of down neighbors of particle `i`, this is always zero
    /// if down lists are disabled
    pub fn n_down_neighbors(&self, i: usize) -> usize {
        self.manager.rows.n_down(i)
    }

    /// Call `function(j, dr)` for all neighbors `j > i` of particle `i`
    pub fn iter_up_neighbors(&self, i: usize, mut function: impl FnMut(usize, Vector<D>)) {
        self.iter_up_neighbors_with_state(i, |j, dr, _| function(j, dr));
    }

    /// Call `function(j, dr)` for all neighbors `j < i` of particle `i`. This
    /// does nothing if down lists are disabled.
    pub fn iter_down_neighbors(&self, i: usize, mut function: impl FnMut(usize, Vector<D>)) {
        self.iter_down_neighbors_with_state(i, |j, dr, _| function(j, dr));
    }

    /// Call `function(j, dr)` for all neighbors of particle `i`, first the up
    /// neighbors and then the down neighbors. This requires down lists to be
    /// enabled.
    pub fn iter_all_neighbors(&self, i: usize, mut function: impl FnMut(usize, Vector<D>)) -> Result<(), Error> {
        return self.iter_all_neighbors_with_state(i, |j, dr, _| function(j, dr));
    }

    /// Call `function(j, dr, state)` for all neighbors `j > i` of particle `i`
    pub fn iter_up_neighbors_with_state(&self, i: usize, mut function: impl FnMut(usize, Vector<D>, P::State)) {
        let rows = &self.manager.rows;
        let xi = self.positions[i];
        for slot in rows.up_slots(i) {
            let j = rows.neighbor(slot);
            let dr = self.positions[j] - xi + rows.offset(slot);
            function(j, dr, rows.state(slot));
        }
    }

    /// Call `function(j, dr, state)` for all neighbors of particle `i`, first
    /// the up neighbors and then the down neighbors. This requires down lists
    /// to be enabled.
    pub fn iter_all_neighbors_with_state(&self, i: usize, mut function: impl FnMut(usize, Vector<D>, P::State)) -> Result<(), Error> {
        if !self.manager.down_lists_enabled() {
            return Err(Error::Unsupported(
                "can not iterate over all neighbors without down lists".into()
            ));
        }

        self.iter_up_neighbors_with_state(i, &mut function);
        self.iter_down_neighbors_with_state(i, &mut function);
        Ok(())
    }

    /// Call `function(j, dr, state)` for all neighbors `j < i` of particle `i`
    pub fn iter_down_neighbors_with_state(&self, i: usize, mut function: impl FnMut(usize, Vector<D>, P::State)) {
        let rows = &self.manager.rows;
        let xi = self.positions[i];
        for slot in rows.down_slots(i).rev() {
            let j = rows.neighbor(slot);
            let dr = self.positions[j] - xi + rows.offset(slot);
            function(j, dr, rows.state(slot));
        }
    }
}
