//! Tensor shapes and the NumPy broadcasting rules over them.

use std::fmt;

use crate::error::{Error, Result};

/// Dimensions of a tensor, outermost first. An empty list is a 0-d scalar.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(pub Vec<usize>);

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// The 0-d shape `()`.
    pub fn scalar() -> Self {
        Shape(Vec::new())
    }

    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// Size of axis `axis`.
    ///
    /// # Panics
    ///
    /// Panics if `axis >= self.ndim()`.
    pub fn dim(&self, axis: usize) -> usize {
        self.0[axis]
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Element count; 1 for a scalar.
    pub fn numel(&self) -> usize {
        self.0.iter().product()
    }

    pub fn is_scalar(&self) -> bool {
        self.0.is_empty()
    }

    /// Result shape of broadcasting `self` against `other`.
    ///
    /// Shapes are right-aligned; each aligned pair must be equal or contain a
    /// 1. Returns `None` otherwise.
    pub fn broadcast_with(&self, other: &Shape) -> Option<Shape> {
        let rank = self.ndim().max(other.ndim());
        (0..rank)
            .map(|axis| match (self.padded_dim(axis, rank), other.padded_dim(axis, rank)) {
                (a, b) if a == b => Some(a),
                (1, b) => Some(b),
                (a, 1) => Some(a),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Shape)
    }

    /// [`Shape::broadcast_with`], with incompatibility reported as a
    /// [`Error::Shape`].
    pub fn broadcast_or_err(&self, other: &Shape) -> Result<Shape> {
        self.broadcast_with(other).ok_or_else(|| {
            Error::shape(format!(
                "operands could not be broadcast together with shapes {} {}",
                self, other
            ))
        })
    }

    /// Size of `axis` after left-padding this shape with 1s up to `rank` axes.
    fn padded_dim(&self, axis: usize, rank: usize) -> usize {
        let pad = rank - self.ndim();
        axis.checked_sub(pad).map_or(1, |i| self.0[i])
    }

    /// Axes of `expanded` (a broadcast of `self`) that have to be summed to
    /// get back to `self`, ascending.
    pub fn reduction_axes_from(&self, expanded: &Shape) -> Vec<usize> {
        let pad = expanded.ndim().saturating_sub(self.ndim());
        let stretched = self
            .0
            .iter()
            .zip(&expanded.0[pad..])
            .enumerate()
            .filter(|&(_, (&own, &wide))| own == 1 && wide != 1)
            .map(|(i, _)| pad + i);
        (0..pad).chain(stretched).collect()
    }

    /// Checks reduction axes against this shape and returns them sorted.
    /// `None` means every axis.
    pub fn normalize_axes(&self, axes: Option<&[usize]>) -> Result<Vec<usize>> {
        let Some(axes) = axes else {
            return Ok((0..self.ndim()).collect());
        };

        let mut sorted = axes.to_vec();
        sorted.sort_unstable();
        if let Some(dup) = sorted.windows(2).find(|w| w[0] == w[1]) {
            return Err(Error::shape(format!("duplicate reduction axis {}", dup[0])));
        }
        match sorted.last() {
            Some(&axis) if axis >= self.ndim() => Err(Error::shape(format!(
                "axis {} is out of bounds for shape {}",
                axis, self
            ))),
            _ => Ok(sorted),
        }
    }

    /// Shape left after reducing `axes`; with `keepdims` each reduced axis
    /// stays with size 1.
    pub fn reduced(&self, axes: &[usize], keepdims: bool) -> Shape {
        let mut dims = Vec::with_capacity(self.ndim());
        for (axis, &size) in self.0.iter().enumerate() {
            if !axes.contains(&axis) {
                dims.push(size);
            } else if keepdims {
                dims.push(1);
            }
        }
        Shape(dims)
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Shape").field(&self.0).finish()
    }
}

/// Python tuple notation: `()`, `(3,)`, `(2, 3)`.
impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(usize::to_string).collect();
        match parts.as_slice() {
            [single] => write!(f, "({},)", single),
            _ => write!(f, "({})", parts.join(", ")),
        }
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape(dims.to_vec())
    }
}

impl PartialEq<[usize]> for Shape {
    fn eq(&self, other: &[usize]) -> bool {
        self.0 == other
    }
}
