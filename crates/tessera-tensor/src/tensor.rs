use thiserror::Error;

use super::{
    allocator::{CpuAllocator, TensorAllocator, TensorAllocatorError},
    device::Device,
    storage::TensorStorage,
};

/// An error type for tensor operations.
#[derive(Error, Debug, PartialEq)]
pub enum TensorError {
    /// Tensor shape does not match the provided data.
    ///
    /// The product of the shape dimensions must equal the number of elements.
    #[error("Shape mismatch: expected {expected} elements for shape, but got {actual} elements in data")]
    InvalidShape {
        /// Expected number of elements based on shape
        expected: usize,
        /// Actual number of elements in the data
        actual: usize,
    },

    /// The element count of the shape does not fit in `usize`.
    #[error("Shape {0:?} has more elements than fit in usize")]
    ShapeOverflow(Vec<usize>),

    /// Underlying storage operation failed.
    #[error("Storage error: {0}")]
    StorageError(#[from] TensorAllocatorError),
}

impl TensorError {
    /// Creates an InvalidShape error with clear context.
    pub fn invalid_shape(expected: usize, actual: usize) -> Self {
        Self::InvalidShape { expected, actual }
    }
}

fn checked_numel(shape: &[usize]) -> Result<usize, TensorError> {
    shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| TensorError::ShapeOverflow(shape.to_vec()))
}

/// Compute the strides from the shape of a tensor.
///
/// # Examples
///
/// ```rust
/// use tessera_tensor::tensor::get_strides_from_shape;
///
/// let strides = get_strides_from_shape([2, 3, 4]);
/// assert_eq!(strides, [12, 4, 1]);
/// ```
pub fn get_strides_from_shape<const N: usize>(shape: [usize; N]) -> [usize; N] {
    let mut strides: [usize; N] = [0; N];
    let mut stride = 1;
    for i in (0..shape.len()).rev() {
        strides[i] = stride;
        stride *= shape[i];
    }
    strides
}

/// A multi-dimensional array (tensor) with owned data.
///
/// # Type Parameters
///
/// * `T` - The element type stored in the tensor
/// * `N` - The number of dimensions (const generic, checked at compile time)
/// * `A` - The allocator that owns the memory, which also fixes the device
///
/// Tensors are always row-major (C-contiguous): the rightmost dimension varies fastest.
///
/// # Examples
///
/// ```rust
/// use tessera_tensor::{Tensor, CpuAllocator};
///
/// let data: Vec<u8> = vec![1, 2, 3, 4];
/// let t = Tensor::<u8, 2, _>::from_shape_vec([2, 2], data, CpuAllocator).unwrap();
/// assert_eq!(t.shape, [2, 2]);
/// assert_eq!(t.strides, [2, 1]);
/// ```
pub struct Tensor<T, const N: usize, A: TensorAllocator = CpuAllocator> {
    /// The storage of the tensor.
    pub storage: TensorStorage<T, A>,
    /// The shape of the tensor.
    pub shape: [usize; N],
    /// The strides of the tensor data in memory.
    pub strides: [usize; N],
}

impl<T, const N: usize, A: TensorAllocator> Tensor<T, N, A> {
    /// Get the data of the tensor as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        self.storage.as_slice()
    }

    /// Get the data of the tensor as a mutable slice.
    #[inline]
    pub fn as_slice_mut(&mut self) -> &mut [T] {
        self.storage.as_mut_slice()
    }

    /// Returns the device where the tensor is allocated.
    #[inline]
    pub fn device(&self) -> Device {
        self.storage.device()
    }

    /// Creates a new `Tensor` with the given shape and data.
    ///
    /// # Errors
    ///
    /// If the number of elements in the data does not match the shape of the tensor, an error is returned.
    pub fn from_shape_vec(shape: [usize; N], data: Vec<T>, alloc: A) -> Result<Self, TensorError> {
        let numel = checked_numel(&shape)?;
        if numel != data.len() {
            return Err(TensorError::invalid_shape(numel, data.len()));
        }
        let storage = TensorStorage::from_vec(data, alloc)?;
        let strides = get_strides_from_shape(shape);
        Ok(Self {
            storage,
            shape,
            strides,
        })
    }

    /// Creates a new `Tensor` with the given shape and slice of data.
    ///
    /// # Errors
    ///
    /// If the number of elements in the data does not match the shape of the tensor, an error is returned.
    pub fn from_shape_slice(shape: [usize; N], data: &[T], alloc: A) -> Result<Self, TensorError>
    where
        T: Clone,
    {
        Self::from_shape_vec(shape, data.to_vec(), alloc)
    }

    /// Creates a new `Tensor` with the given shape and a default value.
    ///
    /// # Example
    ///
    /// ```
    /// use tessera_tensor::{Tensor, CpuAllocator};
    ///
    /// let t = Tensor::<u8, 2, _>::from_shape_val([2, 2], 7, CpuAllocator).unwrap();
    /// assert_eq!(t.as_slice(), &[7, 7, 7, 7]);
    /// ```
    pub fn from_shape_val(shape: [usize; N], value: T, alloc: A) -> Result<Self, TensorError>
    where
        T: Clone,
    {
        let numel = checked_numel(&shape)?;
        let storage = TensorStorage::from_elem(numel, value, alloc)?;
        let strides = get_strides_from_shape(shape);
        Ok(Self {
            storage,
            shape,
            strides,
        })
    }

    /// Create a new tensor with all elements set to zero.
    ///
    /// # Errors
    ///
    /// Returns an error if memory allocation fails.
    pub fn zeros(shape: [usize; N], alloc: A) -> Result<Self, TensorError>
    where
        T: Clone + num_traits::Zero,
    {
        Self::from_shape_val(shape, T::zero(), alloc)
    }

    /// Creates a new `Tensor` filled by evaluating `f` at every index.
    ///
    /// # Example
    ///
    /// ```
    /// use tessera_tensor::{Tensor, CpuAllocator};
    ///
    /// let t = Tensor::<u32, 2, _>::from_shape_fn([2, 3], CpuAllocator, |[i, j]| (i * 3 + j) as u32)
    ///     .unwrap();
    /// assert_eq!(t.as_slice(), &[0, 1, 2, 3, 4, 5]);
    /// ```
    pub fn from_shape_fn<F>(shape: [usize; N], alloc: A, f: F) -> Result<Self, TensorError>
    where
        F: Fn([usize; N]) -> T,
    {
        let numel = checked_numel(&shape)?;
        let strides = get_strides_from_shape(shape);
        let data: Vec<T> = (0..numel)
            .map(|offset| {
                let mut index = [0; N];
                let mut rem = offset;
                for (i, &s) in strides.iter().enumerate() {
                    index[i] = rem / s;
                    rem %= s;
                }
                f(index)
            })
            .collect();
        Self::from_shape_vec(shape, data, alloc)
    }

    /// Returns the number of elements in the tensor.
    #[inline]
    pub fn numel(&self) -> usize {
        self.storage.len()
    }

    /// Returns the rank of the tensor.
    #[inline]
    pub fn ndims(&self) -> usize {
        N
    }

    /// Get the offset of the element at the given index, or `None` if out of bounds.
    pub fn get_iter_offset(&self, index: [usize; N]) -> Option<usize> {
        let mut offset = 0;
        for ((&idx, dim_size), stride) in index.iter().zip(self.shape).zip(self.strides) {
            if idx >= dim_size {
                return None;
            }
            offset += idx * stride;
        }
        Some(offset)
    }

    /// Get the element at the given index.
    ///
    /// # Example
    ///
    /// ```
    /// use tessera_tensor::{Tensor, CpuAllocator};
    ///
    /// let t = Tensor::<u8, 2, _>::from_shape_vec([2, 2], vec![1, 2, 3, 4], CpuAllocator).unwrap();
    /// assert_eq!(t.get([1, 0]), Some(&3));
    /// assert_eq!(t.get([2, 0]), None);
    /// ```
    pub fn get(&self, index: [usize; N]) -> Option<&T> {
        self.get_iter_offset(index)
            .and_then(|offset| self.as_slice().get(offset))
    }

}

impl<T, const N: usize, A: TensorAllocator> Clone for Tensor<T, N, A>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            shape: self.shape,
            strides: self.strides,
        }
    }
}

impl<T, const N: usize, A: TensorAllocator> std::fmt::Debug for Tensor<T, N, A>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("device", &self.device())
            .field("data", &self.as_slice())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_1d() -> Result<(), TensorError> {
        let data: Vec<u8> = vec![1];
        let t = Tensor::<u8, 1, _>::from_shape_vec([1], data, CpuAllocator)?;
        assert_eq!(t.shape, [1]);
        assert_eq!(t.as_slice(), vec![1]);
        assert_eq!(t.strides, [1]);
        assert_eq!(t.numel(), 1);
        Ok(())
    }

    #[test]
    fn constructor_4d() -> Result<(), TensorError> {
        let t = Tensor::<f32, 4, _>::zeros([2, 3, 4, 5], CpuAllocator)?;
        assert_eq!(t.strides, [60, 20, 5, 1]);
        assert_eq!(t.numel(), 120);
        assert_eq!(t.ndims(), 4);
        assert!(t.as_slice().iter().all(|&v| v == 0.0));
        Ok(())
    }

    #[test]
    fn constructor_shape_mismatch() {
        let res = Tensor::<u8, 2, _>::from_shape_vec([2, 2], vec![1, 2, 3], CpuAllocator);
        assert_eq!(res.err(), Some(TensorError::invalid_shape(4, 3)));
    }

    #[test]
    fn get_4d() -> Result<(), TensorError> {
        let t = Tensor::<u32, 4, _>::from_shape_fn([1, 2, 2, 3], CpuAllocator, |[n, c, h, w]| {
            (n * 1000 + c * 100 + h * 10 + w) as u32
        })?;
        assert_eq!(t.get([0, 1, 1, 2]), Some(&112));
        assert_eq!(t.get([0, 2, 0, 0]), None);
        Ok(())
    }

    #[test]
    fn constructor_shape_overflow() {
        let shape = [1 << 40, 1 << 40];
        let res = Tensor::<f32, 2, _>::zeros(shape, CpuAllocator);
        assert_eq!(res.err(), Some(TensorError::ShapeOverflow(shape.to_vec())));
        let res = Tensor::<u8, 2, _>::from_shape_vec(shape, vec![0; 4], CpuAllocator);
        assert_eq!(res.err(), Some(TensorError::ShapeOverflow(shape.to_vec())));
    }

    #[test]
    fn clone_is_deep() -> Result<(), TensorError> {
        let t = Tensor::<u8, 1, _>::from_shape_vec([3], vec![1, 2, 3], CpuAllocator)?;
        let mut t2 = t.clone();
        t2.as_slice_mut()[0] = 9;
        assert_eq!(t.as_slice(), &[1, 2, 3]);
        assert_eq!(t2.as_slice(), &[9, 2, 3]);
        Ok(())
    }
}
