use crate::Vector;

/// A `NeighborPolicy` decides which pairs within the neighbor range are stored
/// in the lists, and which state is attached to each stored pair.
pub trait NeighborPolicy<const D: usize> {
    /// State stored alongside each pair in the lists
    type State: Copy + Default + std::fmt::Debug;

    /// Should the pair with distance vector `dr` (and squared norm `r2`) be
    /// stored in the lists? `range2` is the squared neighbor range.
    fn accept(&self, dr: &Vector<D>, r2: f64, range2: f64) -> bool {
        let _ = dr;
        return r2 < range2;
    }

    /// Get the initial state of a newly found pair between particles `i` and
    /// `j`, with distance vector `dr` going from `i` to `j`.
    fn initial_state(&self, i: usize, j: usize, dr: &Vector<D>) -> Self::State;
}

/// Store all pairs within the neighbor range, without any state
#[derive(Debug, Clone, Copy, Default)]
pub struct Plain;

impl<const D: usize> NeighborPolicy<D> for Plain {
    type State = ();

    fn initial_state(&self, _: usize, _: usize, _: &Vector<D>) {}
}

/// Tolerance used to decide if a component of the distance vector is zero
const LATTICE_TOLERANCE: f64 = 1e-8;

/// Store only pairs of particles aligned along one of the axes, for particles
/// living on a lattice.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lattice;

impl<const D: usize> NeighborPolicy<D> for Lattice {
    type State = ();

    fn accept(&self, dr: &Vector<D>, r2: f64, range2: f64) -> bool {
        if r2 >= range2 {
            return false;
        }

        let non_zero = dr.iter().filter(|x| x.abs() > LATTICE_TOLERANCE).count();
        return non_zero <= 1;
    }

    fn initial_state(&self, _: usize, _: usize, _: &Vector<D>) {}
}

/// Store all pairs within the neighbor range, together with an integer state
/// (typically used to track whether hard-core particles are in contact, or
/// inside a well). The initial state of each pair is computed by a callback
/// taking the two particles and the distance vector between them.
#[derive(Clone, Copy)]
pub struct HardCollision<F> {
    state: F,
}

impl<F> HardCollision<F> {
    /// Create a new policy using `state` to compute the initial state of pairs
    pub fn new(state: F) -> HardCollision<F> {
        HardCollision { state: state }
    }
}

impl<F> std::fmt::Debug for HardCollision<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardCollision").finish_non_exhaustive()
    }
}

impl<const D: usize, F> NeighborPolicy<D> for HardCollision<F> where F: Fn(usize, usize, &Vector<D>) -> i32 {
    type State = i32;

    fn initial_state(&self, i: usize, j: usize, dr: &Vector<D>) -> i32 {
        (self.state)(i, j, dr)
    }
}
