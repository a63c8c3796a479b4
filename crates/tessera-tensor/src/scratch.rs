//! Grow-only scratch memory reused across kernel invocations.

use crate::{
    allocator::{CpuAllocator, TensorAllocator},
    device::Device,
    storage::TensorStorage,
    TensorError,
};

/// A resizable device-local buffer that only ever grows.
///
/// Kernels keep one `ScratchBuffer` per instance and call [`ScratchBuffer::ensure_capacity`]
/// once per invocation, so a whole batch is served by a single allocation. The buffer is
/// reallocated only when a request exceeds the current capacity; it never shrinks.
///
/// Contents are not preserved across growth and are not cleared between requests: callers
/// must fully overwrite the region they read back.
///
/// # Example
///
/// ```
/// use tessera_tensor::{CpuAllocator, ScratchBuffer};
///
/// let mut scratch = ScratchBuffer::<f32, _>::new(CpuAllocator);
/// assert_eq!(scratch.capacity(), 0);
///
/// let buf = scratch.ensure_capacity(16).unwrap();
/// assert_eq!(buf.len(), 16);
///
/// // a smaller request reuses the existing allocation
/// scratch.ensure_capacity(4).unwrap();
/// assert_eq!(scratch.capacity(), 16);
/// ```
pub struct ScratchBuffer<T, A: TensorAllocator = CpuAllocator> {
    storage: TensorStorage<T, A>,
    num_grows: usize,
}

impl<T, A> ScratchBuffer<T, A>
where
    T: Copy + num_traits::Zero,
    A: TensorAllocator,
{
    /// Creates an empty scratch buffer that allocates through `alloc`.
    pub fn new(alloc: A) -> Self {
        Self {
            storage: TensorStorage::empty(alloc),
            num_grows: 0,
        }
    }

    /// Creates a scratch buffer with room for at least `len` elements.
    ///
    /// # Errors
    ///
    /// Returns an error if memory allocation fails.
    pub fn with_capacity(len: usize, alloc: A) -> Result<Self, TensorError> {
        let mut scratch = Self::new(alloc);
        scratch.reserve(len)?;
        Ok(scratch)
    }

    /// Number of elements the buffer can hold without reallocating.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of times the buffer had to reallocate.
    #[inline]
    pub fn num_grows(&self) -> usize {
        self.num_grows
    }

    /// Device where the scratch memory lives.
    #[inline]
    pub fn device(&self) -> Device {
        self.storage.device()
    }

    fn reserve(&mut self, len: usize) -> Result<(), TensorError> {
        if len > self.storage.len() {
            log::trace!(
                "growing scratch buffer on {} from {} to {} elements",
                self.device(),
                self.storage.len(),
                len
            );
            let alloc = self.storage.alloc().clone();
            self.storage = TensorStorage::from_elem(len, T::zero(), alloc)?;
            self.num_grows += 1;
        }
        Ok(())
    }

    /// Makes sure at least `len` elements are available and returns the first `len` of them.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer had to grow and allocation failed.
    pub fn ensure_capacity(&mut self, len: usize) -> Result<&mut [T], TensorError> {
        self.reserve(len)?;
        Ok(&mut self.storage.as_mut_slice()[..len])
    }
}

impl<T, A: TensorAllocator> std::fmt::Debug for ScratchBuffer<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchBuffer")
            .field("capacity", &self.storage.len())
            .field("num_grows", &self.num_grows)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_grows_monotonically() -> Result<(), TensorError> {
        let mut scratch = ScratchBuffer::<f32, _>::new(CpuAllocator);
        assert_eq!(scratch.num_grows(), 0);

        assert_eq!(scratch.ensure_capacity(8)?.len(), 8);
        assert_eq!(scratch.capacity(), 8);
        assert_eq!(scratch.num_grows(), 1);

        assert_eq!(scratch.ensure_capacity(3)?.len(), 3);
        assert_eq!(scratch.capacity(), 8);
        assert_eq!(scratch.num_grows(), 1);

        assert_eq!(scratch.ensure_capacity(32)?.len(), 32);
        assert_eq!(scratch.capacity(), 32);
        assert_eq!(scratch.num_grows(), 2);
        Ok(())
    }

    #[test]
    fn test_scratch_reuses_memory() -> Result<(), TensorError> {
        let mut scratch = ScratchBuffer::<i32, _>::with_capacity(4, CpuAllocator)?;
        let ptr = scratch.ensure_capacity(4)?.as_ptr();
        scratch.ensure_capacity(2)?[0] = 7;
        assert_eq!(scratch.ensure_capacity(4)?.as_ptr(), ptr);
        assert_eq!(scratch.ensure_capacity(4)?[0], 7);
        Ok(())
    }

    #[test]
    fn test_scratch_zero_request() -> Result<(), TensorError> {
        let mut scratch = ScratchBuffer::<f32, _>::new(CpuAllocator);
        assert!(scratch.ensure_capacity(0)?.is_empty());
        assert_eq!(scratch.num_grows(), 0);
        assert!(scratch.device().is_cpu());
        Ok(())
    }
}
