//! The `Boundary` type represents the enclosing box of a simulated system,
//! with periodic or non-periodic boundary conditions along each axis.
use crate::Vector;

/// The shape of a box determine how the neighbor lists can be built. Cell
/// decomposition is only available for rectangular boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryShape {
    /// Rectangular box, with edges aligned with the cartesian axes
    Rectangular,
    /// Triclinic (slanted) box, with arbitrary parallelepiped shape
    Triclinic,
}

/// A `Boundary` defines the system physical boundaries.
///
/// The box is defined by `D` edge vectors. A position inside the box can be
/// written as `sum_k f_k * edges[k]` with all fractional coordinates `f_k` in
/// `[0, 1)`. Rectangular boxes can be periodic along some axes only, triclinic
/// boxes are always fully periodic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Boundary<const D: usize> {
    /// Edge vectors of the box
    edges: [Vector<D>; D],
    /// Reciprocal vectors, `reciprocal[k] * edges[j] == delta_kj`
    reciprocal: [Vector<D>; D],
    /// Which axes have periodic boundary conditions
    periodic: [bool; D],
    /// Box shape
    shape: BoundaryShape,
}

impl<const D: usize> Boundary<D> {
    /// Create a rectangular box with the given side lengths and periodicity
    /// along each axis.
    pub fn rectangular(size: [f64; D], periodic: [bool; D]) -> Boundary<D> {
        assert!(size.iter().all(|&l| l > 0.0 && l.is_finite()), "Box lengths must be positive");

        let edges = std::array::from_fn(|k| {
            let mut edge = Vector::zero();
            edge[k] = size[k];
            edge
        });
        let reciprocal = std::array::from_fn(|k| {
            let mut vector = Vector::zero();
            vector[k] = 1.0 / size[k];
            vector
        });

        Boundary {
            edges: edges,
            reciprocal: reciprocal,
            periodic: periodic,
            shape: BoundaryShape::Rectangular,
        }
    }

    /// Create a fully periodic rectangular box with the given side lengths
    pub fn periodic(size: [f64; D]) -> Boundary<D> {
        Boundary::rectangular(size, [true; D])
    }

    /// Create a rectangular box with the given side lengths and no periodic
    /// boundary conditions.
    pub fn non_periodic(size: [f64; D]) -> Boundary<D> {
        Boundary::rectangular(size, [false; D])
    }

    /// Create a fully periodic cubic box with side `length`
    pub fn cubic(length: f64) -> Boundary<D> {
        Boundary::periodic([length; D])
    }

    /// Create a fully periodic box from its edge vectors. If the edges are
    /// aligned with the cartesian axes, the resulting box is rectangular.
    pub fn triclinic(edges: [Vector<D>; D]) -> Boundary<D> {
        let matrix: [[f64; D]; D] = edges.map(|edge| edge.into_array());
        let inverse = invert(matrix).expect("box matrix is not invertible");

        let is_close_0 = |value: f64| f64::abs(value) < 1e-6;
        let mut is_diagonal = true;
        for i in 0..D {
            for j in 0..D {
                if i != j && !is_close_0(matrix[i][j]) {
                    is_diagonal = false;
                }
            }
        }

        if is_diagonal {
            assert!((0..D).all(|k| matrix[k][k] > 0.0), "Box lengths must be positive");
            return Boundary::periodic(std::array::from_fn(|k| matrix[k][k]));
        }

        // f = v * M^-1, so the k-th fractional coordinate uses the k-th column
        // of the inverse
        let reciprocal = std::array::from_fn(|k| Vector::new(std::array::from_fn(|j| inverse[j][k])));

        return Boundary {
            edges: edges,
            reciprocal: reciprocal,
            periodic: [true; D],
            shape: BoundaryShape::Triclinic,
        };
    }

    /// Get the box shape
    pub fn shape(&self) -> BoundaryShape {
        self.shape
    }

    /// Is this box rectangular, *i.e.* usable with cell decomposition?
    pub fn is_rectangular(&self) -> bool {
        self.shape == BoundaryShape::Rectangular
    }

    /// Get the periodicity of the box along each axis
    pub fn periodicity(&self) -> [bool; D] {
        self.periodic
    }

    /// Check if the box is periodic along `axis`
    pub fn is_periodic(&self, axis: usize) -> bool {
        self.periodic[axis]
    }

    /// Get the edge vectors of this box
    pub fn edges(&self) -> &[Vector<D>; D] {
        &self.edges
    }

    /// Get the length of each edge of the box. For rectangular boxes this is
    /// the box size along each axis.
    pub fn box_size(&self) -> Vector<D> {
        Vector::new(std::array::from_fn(|k| self.edges[k].norm()))
    }

    /// Get the distances between opposite faces of the box
    pub fn distances_between_faces(&self) -> Vector<D> {
        Vector::new(std::array::from_fn(|k| 1.0 / self.reciprocal[k].norm()))
    }

    /// Get the smallest distance between opposite faces, considering only
    /// the periodic axes. This is infinite if the box is not periodic at all.
    pub fn min_periodic_length(&self) -> f64 {
        let distances = self.distances_between_faces();
        let mut min = f64::INFINITY;
        for k in 0..D {
            if self.periodic[k] {
                min = f64::min(min, distances[k]);
            }
        }
        return min;
    }
}

/// Geometric operations using periodic boundary conditions
impl<const D: usize> Boundary<D> {
    /// Get the fractional representation of the `vector` in this box
    pub fn fractional(&self, vector: Vector<D>) -> Vector<D> {
        Vector::new(std::array::from_fn(|k| self.reciprocal[k] * vector))
    }

    /// Get the Cartesian representation of the `fractional` vector in this
    /// box
    pub fn cartesian(&self, fractional: Vector<D>) -> Vector<D> {
        let mut vector = Vector::zero();
        for k in 0..D {
            vector += fractional[k] * self.edges[k];
        }
        return vector;
    }

    /// Translation vector corresponding to the given number of box images
    /// along each axis.
    pub fn image_offset(&self, images: [i32; D]) -> Vector<D> {
        let mut offset = Vector::zero();
        for k in 0..D {
            if images[k] != 0 {
                offset += images[k] as f64 * self.edges[k];
            }
        }
        return offset;
    }

    /// Fold a position inside the box, obeying the periodic boundary
    /// conditions. For a periodic axis of length `L`, this produce a
    /// component in `[0, L)`. Non-periodic axes are left untouched.
    pub fn fold(&self, vector: &mut Vector<D>) {
        match self.shape {
            BoundaryShape::Rectangular => {
                for k in 0..D {
                    if self.periodic[k] {
                        let length = self.edges[k][k];
                        vector[k] -= f64::floor(vector[k] / length) * length;
                    }
                }
            }
            BoundaryShape::Triclinic => {
                let mut fractional = self.fractional(*vector);
                for k in 0..D {
                    fractional[k] -= f64::floor(fractional[k]);
                }
                *vector = self.cartesian(fractional);
            }
        }
    }

    /// Find the image of a displacement vector in the box, obeying the
    /// periodic boundary conditions. For a periodic axis of length `L`, this
    /// produce a component in `[-L/2, L/2]`.
    pub fn nearest_image(&self, vector: &mut Vector<D>) {
        match self.shape {
            BoundaryShape::Rectangular => {
                for k in 0..D {
                    if self.periodic[k] {
                        let length = self.edges[k][k];
                        vector[k] -= f64::round(vector[k] / length) * length;
                    }
                }
            }
            BoundaryShape::Triclinic => {
                let mut fractional = self.fractional(*vector);
                for k in 0..D {
                    fractional[k] -= f64::round(fractional[k]);
                }
                *vector = self.cartesian(fractional);
            }
        }
    }

    /// Get the number of boxes separating `vector` from its nearest image
    /// along each axis, i.e. the images such that `vector -
    /// self.image_offset(images)` is the nearest image of `vector`. This is
    /// always zero along non-periodic axes.
    pub fn nearest_image_count(&self, vector: Vector<D>) -> [i32; D] {
        let mut images = [0; D];
        match self.shape {
            BoundaryShape::Rectangular => {
                for k in 0..D {
                    if self.periodic[k] {
                        images[k] = f64::round(vector[k] / self.edges[k][k]) as i32;
                    }
                }
            }
            BoundaryShape::Triclinic => {
                let fractional = self.fractional(vector);
                for k in 0..D {
                    images[k] = f64::round(fractional[k]) as i32;
                }
            }
        }
        return images;
    }

    /// Periodic boundary conditions squared distance between the point `u` and
    /// the point `v`
    pub fn distance2(&self, u: Vector<D>, v: Vector<D>) -> f64 {
        let mut d = v - u;
        self.nearest_image(&mut d);
        return d.norm2();
    }

    /// Periodic boundary conditions distance between the point `u` and
    /// the point `v`
    pub fn distance(&self, u: Vector<D>, v: Vector<D>) -> f64 {
        return f64::sqrt(self.distance2(u, v));
    }
}

impl Boundary<3> {
    /// Create a triclinic box, with side lengths `a, b, c` and angles
    /// `alpha, beta, gamma` (in degrees).
    pub fn from_lengths_angles(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Boundary<3> {
        assert!(a > 0.0 && b > 0.0 && c > 0.0, "Box lengths must be positive");
        let cos_alpha = alpha.to_radians().cos();
        let cos_beta = beta.to_radians().cos();
        let (sin_gamma, cos_gamma) = gamma.to_radians().sin_cos();

        let b_x = b * cos_gamma;
        let b_y = b * sin_gamma;

        let c_x = c * cos_beta;
        let c_y = c * (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
        let c_z = f64::sqrt(c * c - c_y * c_y - c_x * c_x);

        return Boundary::triclinic([
            Vector::new([a,   0.0, 0.0]),
            Vector::new([b_x, b_y, 0.0]),
            Vector::new([c_x, c_y, c_z]),
        ]);
    }
}

/// Invert a square matrix using Gauss-Jordan elimination with partial
/// pivoting. Returns `None` for (close to) singular matrices.
fn invert<const D: usize>(matrix: [[f64; D]; D]) -> Option<[[f64; D]; D]> {
    let mut a = matrix;
    let mut inverse = [[0.0; D]; D];
    for (i, row) in inverse.iter_mut().enumerate() {
        row[i] = 1.0;
    }

    for column in 0..D {
        let mut pivot = column;
        for row in (column + 1)..D {
            if a[row][column].abs() > a[pivot][column].abs() {
                pivot = row;
            }
        }

        if a[pivot][column].abs() < 1e-12 {
            return None;
        }

        a.swap(pivot, column);
        inverse.swap(pivot, column);

        let scale = 1.0 / a[column][column];
        for k in 0..D {
            a[column][k] *= scale;
            inverse[column][k] *= scale;
        }

        for row in 0..D {
            if row == column {
                continue;
            }
            let factor = a[row][column];
            if factor == 0.0 {
                continue;
            }
            for k in 0..D {
                a[row][k] -= factor * a[column][k];
                inverse[row][k] -= factor * inverse[column][k];
            }
        }
    }

    return Some(inverse);
}
