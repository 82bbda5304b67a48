use crate::{Boundary, Vector};

mod simple_system;
pub use self::simple_system::SimpleSystem;

#[cfg(test)]
pub(crate) mod test_utils;

/// A `System` deals with the storage of particles and related information.
///
/// Neighbor lists only read from the system: positions and types are owned by
/// the surrounding simulation, and particles are identified by their index in
/// the `positions` and `types` slices.
pub trait System<const D: usize> {
    /// Get the box for this system
    fn boundary(&self) -> &Boundary<D>;

    /// Get the number of particles in this system
    fn size(&self) -> usize {
        self.types().len()
    }

    /// Get the types for all particles in this system. The returned value
    /// must be a slice of length `self.size()`, where each different particle
    /// type is identified with a small integer, used to index into the
    /// [`PotentialTable`](crate::PotentialTable).
    fn types(&self) -> &[usize];

    /// Get the positions for all particles in this system. The returned
    /// value must be a slice of length `self.size()`.
    fn positions(&self) -> &[Vector<D>];
}

impl<const D: usize, S: System<D> + ?Sized> System<D> for &S {
    fn boundary(&self) -> &Boundary<D> {
        (**self).boundary()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn types(&self) -> &[usize] {
        (**self).types()
    }

    fn positions(&self) -> &[Vector<D>] {
        (**self).positions()
    }
}
