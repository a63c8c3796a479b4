use std::ops::Index;

use crate::error::ShapeError;

/// Dynamic-rank tensor shape used at the function boundary.
///
/// # Example
///
/// ```
/// use tessera_ops::TensorShape;
///
/// let shape = TensorShape::from([2, 3, 4, 5]);
/// assert_eq!(shape.ndims(), 4);
/// assert_eq!(shape.numel(), 120);
/// assert_eq!(shape[1], 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TensorShape(Vec<usize>);

impl TensorShape {
    /// Creates a shape from its dimensions.
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    /// Number of dimensions.
    #[inline]
    pub fn ndims(&self) -> usize {
        self.0.len()
    }

    /// The dimensions as a slice.
    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of elements described by the shape, saturating at `usize::MAX`.
    #[inline]
    pub fn numel(&self) -> usize {
        self.checked_numel().unwrap_or(usize::MAX)
    }

    /// Number of elements, or `None` when the product overflows `usize`.
    pub fn checked_numel(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Returns the dimensions as a fixed-size array, or a rank error named after `name`.
    pub fn to_array<const N: usize>(&self, name: &'static str) -> Result<[usize; N], ShapeError> {
        self.0
            .as_slice()
            .try_into()
            .map_err(|_| ShapeError::RankMismatch {
                name,
                expected: N,
                actual: self.0.clone(),
            })
    }
}

impl Index<usize> for TensorShape {
    type Output = usize;

    fn index(&self, index: usize) -> &usize {
        &self.0[index]
    }
}

impl<const N: usize> From<[usize; N]> for TensorShape {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.to_vec())
    }
}

impl From<Vec<usize>> for TensorShape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl From<&[usize]> for TensorShape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

impl std::fmt::Display for TensorShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}
