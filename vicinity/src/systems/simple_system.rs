use super::System;
use crate::{Boundary, Vector};

/// A simple implementation of `System` to use when no other is available
#[derive(Clone, Debug)]
pub struct SimpleSystem<const D: usize> {
    boundary: Boundary<D>,
    types: Vec<usize>,
    positions: Vec<Vector<D>>,
}

impl<const D: usize> SimpleSystem<D> {
    /// Create a new empty system with the given box
    pub fn new(boundary: Boundary<D>) -> SimpleSystem<D> {
        SimpleSystem {
            boundary: boundary,
            types: Vec::new(),
            positions: Vec::new(),
        }
    }

    /// Add a particle with the given type and position to this system, and
    /// get the index of the new particle.
    pub fn add_particle(&mut self, particle_type: usize, position: Vector<D>) -> usize {
        self.types.push(particle_type);
        self.positions.push(position);
        return self.positions.len() - 1;
    }

    /// Remove the last particle of this system, if any
    pub fn pop_particle(&mut self) -> Option<(usize, Vector<D>)> {
        let particle_type = self.types.pop()?;
        let position = self.positions.pop()?;
        Some((particle_type, position))
    }

    /// Get mutable access to the positions, to move particles around
    pub fn positions_mut(&mut self) -> &mut [Vector<D>] {
        return &mut self.positions;
    }

    /// Change the box of this system. Particles are not moved.
    pub fn set_boundary(&mut self, boundary: Boundary<D>) {
        self.boundary = boundary;
    }
}

impl<const D: usize> System<D> for SimpleSystem<D> {
    fn boundary(&self) -> &Boundary<D> {
        &self.boundary
    }

    fn size(&self) -> usize {
        self.types.len()
    }

    fn types(&self) -> &[usize] {
        &self.types
    }

    fn positions(&self) -> &[Vector<D>] {
        &self.positions
    }
}
