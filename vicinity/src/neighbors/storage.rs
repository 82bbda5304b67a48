use std::ops::Range;

use crate::{Error, Vector};

/// Storage for the neighbor lists of all particles.
///
/// All lists live in a single flat buffer, with one row of `capacity` slots
/// per particle. The up list of a particle (neighbors with a larger index)
/// grows from the start of the row, while the down list (neighbors with a
/// smaller index) grows backward from the end of the row. Entries that do not
/// fit in a row are counted, and the rows must then be re-created with a
/// larger capacity.
#[derive(Debug, Clone)]
pub(crate) struct NeighborRows<const D: usize, S> {
    capacity: usize,
    n_up: Vec<usize>,
    n_down: Vec<usize>,
    neighbors: Vec<usize>,
    /// Offset to apply to the position of the neighbor, for each slot
    offsets: Vec<Vector<D>>,
    states: Vec<S>,
    /// Number of entries that did not fit, for each row
    overflow: Vec<usize>,
    max_overflow: usize,
}

/// Allocate a vector of `size` copies of `value`, reporting allocation
/// failures instead of aborting
fn try_filled<T: Clone>(size: usize, value: T) -> Result<Vec<T>, Error> {
    let mut vector = Vec::new();
    vector.try_reserve_exact(size)?;
    vector.resize(size, value);
    return Ok(vector);
}

impl<const D: usize, S: Copy + Default> NeighborRows<D, S> {
    /// Create empty rows for `n_particles` particles, with space for
    /// `capacity` neighbors each.
    pub fn new(n_particles: usize, capacity: usize) -> Result<NeighborRows<D, S>, Error> {
        let size = n_particles.checked_mul(capacity).ok_or_else(|| Error::InvalidParameter(format!(
            "can not store {} neighbors for {} particles", capacity, n_particles
        )))?;

        Ok(NeighborRows {
            capacity: capacity,
            n_up: try_filled(n_particles, 0)?,
            n_down: try_filled(n_particles, 0)?,
            neighbors: try_filled(size, 0)?,
            offsets: try_filled(size, Vector::zero())?,
            states: try_filled(size, S::default())?,
            overflow: try_filled(n_particles, 0)?,
            max_overflow: 0,
        })
    }

    /// Copy the lists in `self` into new rows, with space for
    /// `n_particles >= self.n_particles()` particles and `capacity >=
    /// self.capacity()` neighbors.
    pub fn resized(&self, n_particles: usize, capacity: usize) -> Result<NeighborRows<D, S>, Error> {
        debug_assert!(n_particles >= self.n_particles());
        debug_assert!(capacity >= self.capacity);

        let mut rows = NeighborRows::new(n_particles, capacity)?;
        for i in 0..self.n_particles() {
            for slot in self.up_slots(i) {
                rows.push_up(i, self.neighbors[slot], self.offsets[slot], self.states[slot]);
            }
            // going backward keeps the insertion order of the down list
            for slot in self.down_slots(i).rev() {
                rows.push_down(i, self.neighbors[slot], self.offsets[slot], self.states[slot]);
            }
        }
        debug_assert_eq!(rows.max_overflow, 0);
        return Ok(rows);
    }

    /// Number of particles with a row in this storage
    pub fn n_particles(&self) -> usize {
        self.n_up.len()
    }

    /// Number of slots in each row
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest number of entries which did not fit in a single row
    pub fn max_overflow(&self) -> usize {
        self.max_overflow
    }

    /// Capacity to use for the next attempt after an overflow
    pub fn grown_capacity(&self) -> usize {
        self.capacity + usize::max(self.max_overflow, self.capacity / 4 + 1)
    }

    fn record_overflow(&mut self, i: usize) {
        self.overflow[i] += 1;
        self.max_overflow = usize::max(self.max_overflow, self.overflow[i]);
    }

    /// Add `j` to the up list of `i`. Returns `false` if the row of `i` is
    /// full.
    #[inline]
    pub fn push_up(&mut self, i: usize, j: usize, offset: Vector<D>, state: S) -> bool {
        if self.n_up[i] + self.n_down[i] >= self.capacity {
            self.record_overflow(i);
            return false;
        }

        let slot = i * self.capacity + self.n_up[i];
        self.neighbors[slot] = j;
        self.offsets[slot] = offset;
        self.states[slot] = state;
        self.n_up[i] += 1;
        return true;
    }

    /// Add `j` to the down list of `i`. Returns `false` if the row of `i` is
    /// full.
    #[inline]
    pub fn push_down(&mut self, i: usize, j: usize, offset: Vector<D>, state: S) -> bool {
        if self.n_up[i] + self.n_down[i] >= self.capacity {
            self.record_overflow(i);
            return false;
        }

        self.n_down[i] += 1;
        let slot = (i + 1) * self.capacity - self.n_down[i];
        self.neighbors[slot] = j;
        self.offsets[slot] = offset;
        self.states[slot] = state;
        return true;
    }

    /// Copy every entry in the up lists into the down list of the
    /// corresponding neighbor, with the opposite offset. Returns `false` if
    /// some rows overflowed.
    pub fn mirror_down(&mut self) -> bool {
        for i in 0..self.n_particles() {
            for slot in self.up_slots(i) {
                let j = self.neighbors[slot];
                let offset = self.offsets[slot];
                let state = self.states[slot];
                self.push_down(j, i, -offset, state);
            }
        }
        return self.max_overflow == 0;
    }

    /// Remove all the entries for `j` in the up list of `i`, keeping the
    /// order of the other entries
    pub fn remove_up(&mut self, i: usize, j: usize) {
        let start = i * self.capacity;
        let mut kept = start;
        for slot in self.up_slots(i) {
            if self.neighbors[slot] != j {
                self.neighbors[kept] = self.neighbors[slot];
                self.offsets[kept] = self.offsets[slot];
                self.states[kept] = self.states[slot];
                kept += 1;
            }
        }
        self.n_up[i] = kept - start;
    }

    /// Remove the row of the last particle. The entries referring to this
    /// particle in other rows must be removed separately.
    pub fn pop_row(&mut self) {
        let Some(last) = self.n_particles().checked_sub(1) else {
            return;
        };

        self.n_up.truncate(last);
        self.n_down.truncate(last);
        self.overflow.truncate(last);
        self.neighbors.truncate(last * self.capacity);
        self.offsets.truncate(last * self.capacity);
        self.states.truncate(last * self.capacity);
    }

    /// Slots containing the up list of `i`
    #[inline]
    pub fn up_slots(&self, i: usize) -> Range<usize> {
        let start = i * self.capacity;
        start..(start + self.n_up[i])
    }

    /// Slots containing the down list of `i`, in reverse insertion order
    #[inline]
    pub fn down_slots(&self, i: usize) -> Range<usize> {
        let end = (i + 1) * self.capacity;
        (end - self.n_down[i])..end
    }

    /// Number of entries in the up list of `i`
    pub fn n_up(&self, i: usize) -> usize {
        self.n_up[i]
    }

    /// Number of entries in the down list of `i`
    pub fn n_down(&self, i: usize) -> usize {
        self.n_down[i]
    }

    #[inline]
    pub fn neighbor(&self, slot: usize) -> usize {
        self.neighbors[slot]
    }

    #[inline]
    pub fn offset(&self, slot: usize) -> Vector<D> {
        self.offsets[slot]
    }

    #[inline]
    pub fn state(&self, slot: usize) -> S {
        self.states[slot]
    }

    #[inline]
    pub fn set_state(&mut self, slot: usize, state: S) {
        self.states[slot] = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vector2D;

    #[test]
    fn up_and_down() {
        let mut rows = NeighborRows::<2, i32>::new(3, 3).unwrap();
        assert!(rows.push_up(0, 1, Vector2D::zero(), 3));
        assert!(rows.push_up(0, 2, Vector2D::new([1.0, 0.0]), 4));
        assert!(rows.push_up(1, 2, Vector2D::zero(), 5));

        assert!(rows.mirror_down());
        assert_eq!(rows.n_up(0), 2);
        assert_eq!(rows.n_down(0), 0);
        assert_eq!(rows.n_down(1), 1);
        assert_eq!(rows.n_down(2), 2);

        let down = rows.down_slots(2)
            .map(|slot| (rows.neighbor(slot), rows.offset(slot), rows.state(slot)))
            .collect::<Vec<_>>();
        assert_eq!(down, [
            (1, Vector2D::zero(), 5),
            (0, Vector2D::new([-1.0, 0.0]), 4),
        ]);
    }

    #[test]
    fn overflow() {
        let mut rows = NeighborRows::<1, ()>::new(2, 1).unwrap();
        assert!(rows.push_up(0, 1, Vector::zero(), ()));
        assert!(!rows.push_up(0, 1, Vector::new([4.0]), ()));
        assert!(!rows.push_up(0, 1, Vector::new([-4.0]), ()));
        assert_eq!(rows.max_overflow(), 2);
        assert_eq!(rows.grown_capacity(), 3);

        let mut rows = NeighborRows::<1, ()>::new(2, 16).unwrap();
        for _ in 0..17 {
            rows.push_up(0, 1, Vector::zero(), ());
        }
        assert_eq!(rows.max_overflow(), 1);
        assert_eq!(rows.grown_capacity(), 21);
    }

    #[test]
    fn resized() {
        let mut rows = NeighborRows::<1, ()>::new(2, 1).unwrap();
        rows.push_up(0, 1, Vector::new([2.0]), ());
        rows.push_down(1, 0, Vector::new([-2.0]), ());

        let rows = rows.resized(3, 4).unwrap();
        assert_eq!(rows.n_particles(), 3);
        assert_eq!(rows.capacity(), 4);
        assert_eq!(rows.up_slots(0), 0..1);
        assert_eq!(rows.down_slots(1), 7..8);
        assert_eq!(rows.offset(7), Vector::new([-2.0]));
        assert_eq!(rows.n_up(2), 0);
    }

    #[test]
    fn remove_last_particle() {
        let mut rows = NeighborRows::<1, i32>::new(3, 4).unwrap();
        rows.push_up(0, 2, Vector::new([1.0]), 1);
        rows.push_up(0, 1, Vector::new([2.0]), 2);
        rows.push_up(0, 2, Vector::new([-9.0]), 3);
        rows.push_up(1, 2, Vector::new([3.0]), 4);
        assert!(rows.mirror_down());

        rows.remove_up(0, 2);
        rows.remove_up(1, 2);
        rows.pop_row();

        assert_eq!(rows.n_particles(), 2);
        assert_eq!(rows.n_up(0), 1);
        assert_eq!(rows.neighbor(0), 1);
        assert_eq!(rows.offset(0), Vector::new([2.0]));
        assert_eq!(rows.state(0), 2);
        assert_eq!(rows.n_up(1), 0);
        assert_eq!(rows.n_down(1), 1);
        assert_eq!(rows.neighbor(7), 0);

        rows.pop_row();
        rows.pop_row();
        assert_eq!(rows.n_particles(), 0);
        rows.pop_row();
        assert_eq!(rows.n_particles(), 0);
    }
}
