//! D-dimensional vector type
use std::ops::{Add, Sub, Neg, Mul, Div};
use std::ops::{AddAssign, SubAssign, MulAssign, DivAssign};
use std::ops::{Index, IndexMut};

use approx::{AbsDiffEq, RelativeEq, UlpsEq};

/// A `D`-dimensional vector type, used for positions, displacements and
/// periodic image offsets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vector<const D: usize>([f64; D]);

/// Vector in one dimension
pub type Vector1D = Vector<1>;
/// Vector in two dimensions
pub type Vector2D = Vector<2>;
/// Vector in three dimensions
pub type Vector3D = Vector<3>;

impl<const D: usize> Vector<D> {
    /// Create a new vector with the given components
    pub const fn new(components: [f64; D]) -> Vector<D> {
        Vector(components)
    }

    /// Create a new vector with all components set to zero
    pub const fn zero() -> Vector<D> {
        Vector([0.0; D])
    }

    /// Get the squared euclidean norm of this vector
    #[inline]
    pub fn norm2(&self) -> f64 {
        self * self
    }

    /// Get the euclidean norm of this vector
    #[inline]
    pub fn norm(&self) -> f64 {
        f64::sqrt(self.norm2())
    }

    /// Iterate over the components of this vector
    pub fn iter(&self) -> std::slice::Iter<'_, f64> {
        self.0.iter()
    }

    /// Get the components of this vector as a plain array
    pub fn into_array(self) -> [f64; D] {
        self.0
    }
}

impl<const D: usize> Default for Vector<D> {
    fn default() -> Self {
        Vector::zero()
    }
}

impl<const D: usize> From<[f64; D]> for Vector<D> {
    fn from(array: [f64; D]) -> Vector<D> {
        Vector(array)
    }
}

impl<const D: usize> From<Vector<D>> for [f64; D] {
    fn from(vector: Vector<D>) -> [f64; D] {
        vector.0
    }
}

impl<const D: usize> Index<usize> for Vector<D> {
    type Output = f64;
    #[inline]
    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}

impl<const D: usize> IndexMut<usize> for Vector<D> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut f64 {
        &mut self.0[index]
    }
}

impl_arithmetic!(
    Vector<D>, Vector<D>, Add, add, Vector<D>, self, other,
    Vector(std::array::from_fn(|k| self.0[k] + other.0[k]))
);

impl_arithmetic!(
    Vector<D>, Vector<D>, Sub, sub, Vector<D>, self, other,
    Vector(std::array::from_fn(|k| self.0[k] - other.0[k]))
);

// Dot product
impl_arithmetic!(
    Vector<D>, Vector<D>, Mul, mul, f64, self, other,
    {
        let mut sum = 0.0;
        for k in 0..D {
            sum += self.0[k] * other.0[k];
        }
        sum
    }
);

impl_inplace_arithmetic!(
    Vector<D>, Vector<D>, AddAssign, add_assign, self, other,
    {
        for k in 0..D {
            self.0[k] += other.0[k];
        }
    }
);

impl_inplace_arithmetic!(
    Vector<D>, Vector<D>, SubAssign, sub_assign, self, other,
    {
        for k in 0..D {
            self.0[k] -= other.0[k];
        }
    }
);

lsh_scal_arithmetic!(
    Vector<D>, Mul, mul, Vector<D>, self, other,
    Vector(std::array::from_fn(|k| self.0[k] * other))
);

lsh_scal_arithmetic!(
    Vector<D>, Div, div, Vector<D>, self, other,
    Vector(std::array::from_fn(|k| self.0[k] / other))
);

rhs_scal_arithmetic!(
    Vector<D>, Mul, mul, Vector<D>, self, other,
    Vector(std::array::from_fn(|k| self * other.0[k]))
);

impl<const D: usize> MulAssign<f64> for Vector<D> {
    #[inline]
    fn mul_assign(&mut self, other: f64) {
        for k in 0..D {
            self.0[k] *= other;
        }
    }
}

impl<const D: usize> DivAssign<f64> for Vector<D> {
    #[inline]
    fn div_assign(&mut self, other: f64) {
        for k in 0..D {
            self.0[k] /= other;
        }
    }
}

impl<const D: usize> Neg for Vector<D> {
    type Output = Vector<D>;
    #[inline]
    fn neg(self) -> Vector<D> {
        Vector(self.0.map(|v| -v))
    }
}

impl<'a, const D: usize> Neg for &'a Vector<D> {
    type Output = Vector<D>;
    #[inline]
    fn neg(self) -> Vector<D> {
        Vector(self.0.map(|v| -v))
    }
}

impl<const D: usize> AbsDiffEq for Vector<D> {
    type Epsilon = f64;

    fn default_epsilon() -> f64 {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: f64) -> bool {
        self.0.iter().zip(&other.0).all(|(a, b)| f64::abs_diff_eq(a, b, epsilon))
    }
}

impl<const D: usize> RelativeEq for Vector<D> {
    fn default_max_relative() -> f64 {
        f64::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: f64, max_relative: f64) -> bool {
        self.0.iter().zip(&other.0).all(|(a, b)| f64::relative_eq(a, b, epsilon, max_relative))
    }
}

impl<const D: usize> UlpsEq for Vector<D> {
    fn default_max_ulps() -> u32 {
        f64::default_max_ulps()
    }

    fn ulps_eq(&self, other: &Self, epsilon: f64, max_ulps: u32) -> bool {
        self.0.iter().zip(&other.0).all(|(a, b)| f64::ulps_eq(a, b, epsilon, max_ulps))
    }
}
