//! Candidate pairs for boxes where the cell decomposition can not be used.
//!
//! All pairs of particles are checked, against all the periodic images within
//! the range. This is O(N²), but works for any box shape.
use crate::{Boundary, Vector};

/// Number of images to search along each axis to find all pairs within
/// `range`
fn search_extent<const D: usize>(boundary: &Boundary<D>, range: f64) -> [i32; D] {
    let distances = boundary.distances_between_faces();
    let mut extent = [0; D];
    for k in 0..D {
        if boundary.is_periodic(k) {
            extent[k] = f64::ceil(range / distances[k]) as i32;
        }
    }
    return extent;
}

/// Pre-computed set of image translations to check for every pair
#[derive(Debug, Clone)]
pub(crate) struct ImageSearch<const D: usize> {
    boundary: Boundary<D>,
    images: Vec<[i32; D]>,
}

impl<const D: usize> ImageSearch<D> {
    pub fn new(boundary: &Boundary<D>, range: f64) -> ImageSearch<D> {
        let extent = search_extent(boundary, range);
        let widths = extent.map(|e| (2 * e + 1) as usize);

        let mut images = Vec::new();
        for flat in 0..widths.iter().product::<usize>() {
            let mut remaining = flat;
            let mut image = [0; D];
            for k in 0..D {
                image[k] = (remaining % widths[k]) as i32 - extent[k];
                remaining /= widths[k];
            }
            images.push(image);
        }

        ImageSearch {
            boundary: *boundary,
            images: images,
        }
    }

    /// Call `visit(offset)` for every image of the particle at `xj` relative
    /// to the particle at `xi`. `offset` is the translation to apply to `xj`.
    #[inline]
    pub fn for_each_image(&self, xi: Vector<D>, xj: Vector<D>, mut visit: impl FnMut(Vector<D>)) {
        // start from the image closest to `xi`, so positions do not need to be
        // inside the box
        let fractional = self.boundary.fractional(xj - xi);
        let mut base = [0; D];
        for k in 0..D {
            if self.boundary.is_periodic(k) {
                base[k] = -f64::round(fractional[k]) as i32;
            }
        }

        for image in &self.images {
            let mut shift = base;
            for k in 0..D {
                shift[k] += image[k];
            }
            visit(self.boundary.image_offset(shift));
        }
    }

    /// Call `visit(i, j, offset)` for all pairs `i < j` and all the images of
    /// `j` which might be within the range of `i`
    pub fn for_each_pair(&self, positions: &[Vector<D>], mut visit: impl FnMut(usize, usize, Vector<D>)) {
        for i in 0..positions.len() {
            for j in (i + 1)..positions.len() {
                self.for_each_image(positions[i], positions[j], |offset| visit(i, j, offset));
            }
        }
    }

    /// Call `visit(i, k, offset)` for all pairs between the particle `k` and
    /// the particles before it
    pub fn for_each_pair_with(&self, positions: &[Vector<D>], k: usize, mut visit: impl FnMut(usize, usize, Vector<D>)) {
        for i in 0..k {
            self.for_each_image(positions[i], positions[k], |offset| visit(i, k, offset));
        }
    }
}
