//! Cell decomposition of a rectangular box, used as the broad phase of the
//! neighbor list construction.
//!
//! The box is divided in a regular grid of cells, with a size of at least
//! `range / cell_radius` along each axis (or a single cell along axes shorter
//! than this). Every particle is assigned to one cell, and cells store their
//! particles as a singly linked chain through the `cell_last_atom` (head of
//! the chain) and `cell_next_atom` (next particle in the chain) arrays.
//!
//! The grid of real cells is surrounded by layers of ghost cells, one layer
//! for each cell to search along the corresponding axis. Every ghost cell maps
//! back to a real cell (`wrap_map`) together with the translation of the
//! periodic image it represents (`box_offsets`), so that neighboring cells are
//! found with a single addition on the linear cell index.
use log::debug;

use crate::{Boundary, Error, System, Vector};

/// Maximal number of cells, we need to use this to prevent having too many
/// cells with a large box and a small range
const MAX_NUMBER_OF_CELLS: f64 = 1e6;

/// Iterator over the particles in a single cell
#[derive(Debug, Clone)]
pub struct CellParticles<'a> {
    next: Option<usize>,
    cell_next_atom: &'a [Option<usize>],
}

impl<'a> Iterator for CellParticles<'a> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        let current = self.next?;
        self.next = self.cell_next_atom[current];
        return Some(current);
    }
}

/// The cell index sorts particles inside cells, and gives access for each
/// cell to the list of neighboring cells that must be searched to find all
/// pairs below the range.
#[derive(Debug, Clone)]
pub struct CellIndex<const D: usize> {
    /// Number of cells covering the range, when the box is large enough
    cell_radius: usize,
    /// Interaction range driving the cell size
    range: f64,
    /// Box used to compute the current geometry
    boundary: Option<Boundary<D>>,
    /// Number of real cells along each axis
    n_cells: [usize; D],
    /// Size of the cells along each axis
    cell_size: [f64; D],
    /// Number of neighboring cells to search on each side, along each axis.
    /// This is also the number of ghost layers.
    search: [usize; D],
    /// Number of cells (real and ghosts) along each axis
    padded: [usize; D],
    /// Strides of the linear cell index along each axis
    strides: [usize; D],
    /// Linear delta to the neighboring cells. Only half of the neighboring
    /// cells are included, the other half is covered by symmetry.
    offsets: Vec<isize>,
    /// For each (real or ghost) cell, the corresponding real cell. Ghost cells
    /// across non-periodic faces map to `None`.
    wrap_map: Vec<Option<usize>>,
    /// For each (real or ghost) cell, translation vector of the periodic image
    box_offsets: Vec<Vector<D>>,
    /// First particle in each cell
    cell_last_atom: Vec<Option<usize>>,
    /// Next particle in the same cell, for each particle
    cell_next_atom: Vec<Option<usize>>,
    /// Cell containing each particle
    atom_cell: Vec<usize>,
    /// Translation between the actual position of each particle and its
    /// image folded inside the box
    wrap_shifts: Vec<Vector<D>>,
}

impl<const D: usize> CellIndex<D> {
    /// Create a new `CellIndex` using cells of size `range / cell_radius`,
    /// searching `cell_radius` cells in each direction. The range must be set with [`CellIndex::set_range`] before
    /// assigning particles to cells.
    pub fn new(cell_radius: usize) -> Result<CellIndex<D>, Error> {
        if cell_radius == 0 {
            return Err(Error::InvalidParameter("cell radius must be at least 1".into()));
        }

        Ok(CellIndex {
            cell_radius: cell_radius,
            range: 0.0,
            boundary: None,
            n_cells: [0; D],
            cell_size: [0.0; D],
            search: [0; D],
            padded: [0; D],
            strides: [0; D],
            offsets: Vec::new(),
            wrap_map: Vec::new(),
            box_offsets: Vec::new(),
            cell_last_atom: Vec::new(),
            cell_next_atom: Vec::new(),
            atom_cell: Vec::new(),
            wrap_shifts: Vec::new(),
        })
    }

    /// Get the number of cells covering the range in large boxes
    pub fn cell_radius(&self) -> usize {
        self.cell_radius
    }

    /// Get the range used to set the size of the cells
    pub fn range(&self) -> f64 {
        self.range
    }

    /// Set the range used to set the size of the cells. This invalidates any
    /// existing cell assignment.
    pub fn set_range(&mut self, range: f64) -> Result<(), Error> {
        if !(range > 0.0 && range.is_finite()) {
            return Err(Error::InvalidParameter(format!(
                "cell range must be positive and finite, got {}", range
            )));
        }

        self.range = range;
        self.invalidate();
        Ok(())
    }

    /// Forget the current geometry and cell assignment
    fn invalidate(&mut self) {
        self.boundary = None;
        self.cell_next_atom.clear();
        self.atom_cell.clear();
        self.wrap_shifts.clear();
    }

    /// Get the number of real cells along each axis
    pub fn n_cells(&self) -> [usize; D] {
        self.n_cells
    }

    /// Get the size of the cells along each axis
    pub fn cell_size(&self) -> [f64; D] {
        self.cell_size
    }

    /// Get the number of neighboring cells searched on each side of a cell,
    /// along each axis. This is usually `cell_radius`, but can be larger for
    /// boxes smaller than the range, and smaller along non-periodic axes
    /// with few cells.
    pub fn search_extent(&self) -> [usize; D] {
        self.search
    }

    /// Get the half table of linear deltas to the neighboring cells
    pub fn offsets(&self) -> &[isize] {
        &self.offsets
    }

    /// Compute the cell grid, ghost cells and offset table for the given box
    fn setup_geometry(&mut self, boundary: &Boundary<D>) -> Result<(), Error> {
        if !boundary.is_rectangular() {
            return Err(Error::Unsupported(
                "cell decomposition requires a rectangular box".into()
            ));
        }

        if self.range <= 0.0 {
            return Err(Error::InvalidParameter(
                "the range must be set before assigning particles to cells".into()
            ));
        }

        let box_size = boundary.box_size();
        let radius = self.cell_radius as f64;

        let mut n_cells = [1.0; D];
        for k in 0..D {
            n_cells[k] = f64::max(f64::trunc(box_size[k] * radius / self.range), 1.0);
        }

        // limit memory consumption by ensuring we have less than
        // `MAX_NUMBER_OF_CELLS` cells, while keeping roughly the ratio of cells
        // in each direction
        let n_cells_total = n_cells.iter().product::<f64>();
        if n_cells_total > MAX_NUMBER_OF_CELLS {
            let factor = f64::powf(MAX_NUMBER_OF_CELLS / n_cells_total, 1.0 / D as f64);
            for n in &mut n_cells {
                *n = f64::max(f64::trunc(*n * factor), 1.0);
            }
        }

        let mut padded = [0; D];
        for k in 0..D {
            self.n_cells[k] = n_cells[k] as usize;
            self.cell_size[k] = box_size[k] / n_cells[k];

            // a single cell can be smaller than the range, in which case we
            // need to look further away (and possibly at multiple images of
            // the same cell along periodic axes)
            let search = f64::ceil(self.range / self.cell_size[k] * (1.0 - 1e-12)) as usize;
            self.search[k] = if boundary.is_periodic(k) {
                usize::max(search, 1)
            } else {
                // particles are clamped inside the box, there is nothing to
                // find further than the last cell
                usize::min(search, self.n_cells[k] - 1)
            };

            padded[k] = self.n_cells[k] + 2 * self.search[k];
        }
        self.padded = padded;

        let mut stride = 1;
        for k in (0..D).rev() {
            self.strides[k] = stride;
            stride *= padded[k];
        }
        let n_padded = stride;

        self.wrap_map.clear();
        self.box_offsets.clear();
        self.wrap_map.reserve(n_padded);
        self.box_offsets.reserve(n_padded);
        for padded_index in 0..n_padded {
            let coordinates = self.coordinates(padded_index);

            let mut real = [0; D];
            let mut images = [0; D];
            let mut outside = false;
            for k in 0..D {
                let shifted = coordinates[k] as i32 - self.search[k] as i32;
                let (image, wrapped) = divmod(shifted, self.n_cells[k]);
                if image != 0 && !boundary.is_periodic(k) {
                    outside = true;
                }
                real[k] = wrapped + self.search[k];
                images[k] = image;
            }

            if outside {
                self.wrap_map.push(None);
                self.box_offsets.push(Vector::zero());
            } else {
                self.wrap_map.push(Some(self.linear_index(real)));
                self.box_offsets.push(boundary.image_offset(images));
            }
        }

        self.offsets = self.half_offsets();
        self.cell_last_atom.clear();
        self.cell_last_atom.resize(n_padded, None);
        self.boundary = Some(*boundary);

        debug!(
            "cell index: {:?} cells of size {:?}, {} neighboring cells",
            self.n_cells, self.cell_size, self.offsets.len()
        );

        Ok(())
    }

    /// Compute the linear deltas to all cells within the search extent of a
    /// given cell, keeping only the positive ones (this is equivalent to the
    /// lexicographic order on the cell coordinates) and the cells that can
    /// contain particles within the range.
    fn half_offsets(&self) -> Vec<isize> {
        let widths = self.search.map(|search| 2 * search + 1);
        let range2 = self.range * self.range;

        let mut offsets = Vec::new();
        for flat in 0..widths.iter().product::<usize>() {
            let mut remaining = flat;
            let mut linear = 0;
            let mut closest2 = 0.0;
            for k in (0..D).rev() {
                let delta = (remaining % widths[k]) as isize - self.search[k] as isize;
                remaining /= widths[k];

                linear += delta * self.strides[k] as isize;
                let gap = (delta.abs() - 1).max(0) as f64 * self.cell_size[k];
                closest2 += gap * gap;
            }

            if linear > 0 && closest2 < range2 {
                offsets.push(linear);
            }
        }

        return offsets;
    }

    /// Get the linear index of the cell with the given padded coordinates
    fn linear_index(&self, coordinates: [usize; D]) -> usize {
        let mut index = 0;
        for k in 0..D {
            index += coordinates[k] * self.strides[k];
        }
        return index;
    }

    /// Get the padded coordinates of the cell with the given linear index
    fn coordinates(&self, mut index: usize) -> [usize; D] {
        let mut coordinates = [0; D];
        for k in 0..D {
            coordinates[k] = index / self.strides[k];
            index %= self.strides[k];
        }
        return coordinates;
    }

    /// Assign all particles in the system to cells, rebuilding the cell
    /// chains from scratch. If the box changed since the last call, the cell
    /// grid is re-computed first.
    #[time_graph::instrument(name = "CellIndex::assign_cell_all")]
    pub fn assign_cell_all<S: System<D> + ?Sized>(&mut self, system: &S) -> Result<(), Error> {
        let boundary = system.boundary();
        if self.boundary.as_ref() != Some(boundary) {
            self.setup_geometry(boundary)?;
        }

        let positions = system.positions();
        let n_particles = positions.len();

        self.cell_last_atom.iter_mut().for_each(|head| *head = None);
        self.cell_next_atom.clear();
        self.cell_next_atom.resize(n_particles, None);
        self.atom_cell.clear();
        self.atom_cell.resize(n_particles, 0);
        self.wrap_shifts.clear();
        self.wrap_shifts.resize(n_particles, Vector::zero());

        // going backward makes each chain start with the smallest index, so
        // following a chain always gives increasing particle indexes
        for i in (0..n_particles).rev() {
            let mut folded = positions[i];
            boundary.fold(&mut folded);
            self.wrap_shifts[i] = folded - positions[i];

            let cell = self.cell_of_folded(&folded);
            self.atom_cell[i] = cell;
            self.cell_next_atom[i] = self.cell_last_atom[cell];
            self.cell_last_atom[cell] = Some(i);
        }

        Ok(())
    }

    fn cell_of_folded(&self, folded: &Vector<D>) -> usize {
        let mut coordinates = [0; D];
        for k in 0..D {
            let cell = f64::floor(folded[k] / self.cell_size[k]) as i64;
            // particles outside a non-periodic box (or exactly on the upper
            // face after folding) go in the closest cell
            let cell = cell.clamp(0, self.n_cells[k] as i64 - 1) as usize;
            coordinates[k] = cell + self.search[k];
        }
        return self.linear_index(coordinates);
    }

    /// Get the cell containing `position`, or `None` if no particles have
    /// been assigned to cells yet
    pub fn cell_of_position(&self, mut position: Vector<D>) -> Option<usize> {
        let boundary = self.boundary.as_ref()?;
        boundary.fold(&mut position);
        return Some(self.cell_of_folded(&position));
    }

    /// Get the number of particles assigned in the last call to
    /// `assign_cell_all`
    pub fn n_particles(&self) -> usize {
        self.atom_cell.len()
    }

    /// Get the cell containing particle `i`
    #[inline]
    pub fn cell_of(&self, i: usize) -> usize {
        self.atom_cell[i]
    }

    /// Get the first particle in `cell`
    #[inline]
    pub fn first_in_cell(&self, cell: usize) -> Option<usize> {
        self.cell_last_atom[cell]
    }

    /// Get the particle following `i` in the chain of its cell. The returned
    /// particle always has an index larger than `i`.
    #[inline]
    pub fn next_in_cell(&self, i: usize) -> Option<usize> {
        self.cell_next_atom[i]
    }

    /// Iterate over all particles in `cell`
    pub fn particles_in_cell(&self, cell: usize) -> CellParticles<'_> {
        CellParticles {
            next: self.first_in_cell(cell),
            cell_next_atom: &self.cell_next_atom,
        }
    }

    /// Iterate over the particles following `i` in the chain of its own
    /// cell, which all have larger indexes than `i`.
    pub fn following_in_cell(&self, i: usize) -> CellParticles<'_> {
        CellParticles {
            next: self.cell_next_atom[i],
            cell_next_atom: &self.cell_next_atom,
        }
    }

    /// Iterate over the half set of neighboring cells of `cell`, giving the
    /// index of the (real) neighboring cell and the translation to apply to
    /// the positions of particles in this neighboring cell.
    pub fn neighbor_cells(&self, cell: usize) -> impl Iterator<Item = (usize, Vector<D>)> + '_ {
        self.offsets.iter().filter_map(move |&offset| {
            let padded = (cell as isize + offset) as usize;
            self.wrap_map[padded].map(|real| (real, self.box_offsets[padded]))
        })
    }

    /// Iterate over the full set of neighboring cells of `cell`, in both
    /// directions. This does not include `cell` itself, but can include
    /// periodic images of it.
    pub fn all_neighbor_cells(&self, cell: usize) -> impl Iterator<Item = (usize, Vector<D>)> + '_ {
        self.offsets.iter().flat_map(|&offset| [offset, -offset]).filter_map(move |offset| {
            let padded = (cell as isize + offset) as usize;
            self.wrap_map[padded].map(|real| (real, self.box_offsets[padded]))
        })
    }

    /// Get the real cell corresponding to the (possibly ghost) cell `padded`
    pub fn wrap_map(&self, padded: usize) -> Option<usize> {
        self.wrap_map[padded]
    }

    /// Get the translation between a particle and its image folded inside
    /// the box, as computed in the last call to `assign_cell_all`. The
    /// vector between two particles is `x_j - x_i + shift_j - shift_i` when
    /// working with the folded images.
    #[inline]
    pub fn wrap_shift(&self, i: usize) -> Vector<D> {
        self.wrap_shifts[i]
    }
}

/// Function to compute both quotient and remainder of the division of a by b.
/// This function follows Python convention, making sure the remainder have the
/// same sign as `b`.
fn divmod(a: i32, b: usize) -> (i32, usize) {
    debug_assert!(b < (i32::MAX as usize));
    let b = b as i32;
    let mut quotient = a / b;
    let mut remainder = a % b;
    if remainder < 0 {
        remainder += b;
        quotient -= 1;
    }
    return (quotient, remainder as usize);
}
