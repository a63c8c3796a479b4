//! Allocator-backed storage for tensor elements.

use std::{alloc::Layout, ptr::NonNull};

use crate::{
    allocator::{TensorAllocator, TensorAllocatorError},
    device::Device,
    TensorError,
};

/// Owned, contiguous buffer of `T` allocated through a [`TensorAllocator`].
///
/// The buffer owns its elements: they are dropped together with the storage and the
/// memory is handed back to the allocator that produced it.
///
/// Zero sized buffers never touch the allocator and point to a dangling, well aligned
/// address.
pub struct TensorStorage<T, A: TensorAllocator> {
    /// The pointer to the tensor memory which must be non-null.
    ptr: NonNull<T>,
    /// The number of elements in the buffer.
    len: usize,
    /// The memory layout used for allocation.
    layout: Layout,
    /// The allocator used to allocate the tensor storage.
    alloc: A,
}

impl<T, A: TensorAllocator> TensorStorage<T, A> {
    fn allocate(len: usize, alloc: &A) -> Result<(NonNull<T>, Layout), TensorError> {
        let layout = Layout::array::<T>(len).map_err(TensorAllocatorError::LayoutError)?;
        if layout.size() == 0 {
            return Ok((NonNull::dangling(), layout));
        }
        let ptr = alloc.alloc(layout)? as *mut T;
        let ptr = NonNull::new(ptr).ok_or(TensorAllocatorError::NullPointer)?;
        Ok((ptr, layout))
    }

    /// Creates an empty buffer. Never touches the allocator.
    pub fn empty(alloc: A) -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
            layout: Layout::new::<[T; 0]>(),
            alloc,
        }
    }

    /// Creates a new tensor buffer from a vector.
    ///
    /// The elements are moved into memory obtained from `alloc`.
    ///
    /// # Errors
    ///
    /// Returns an error if memory allocation fails.
    pub fn from_vec(mut value: Vec<T>, alloc: A) -> Result<Self, TensorError> {
        let len = value.len();
        let (ptr, layout) = Self::allocate(len, &alloc)?;

        // SAFETY: ptr is valid for `len` elements and does not overlap `value`; the
        // elements are moved bitwise, so the vector must forget them before dropping.
        unsafe {
            std::ptr::copy_nonoverlapping(value.as_ptr(), ptr.as_ptr(), len);
            value.set_len(0);
        }

        Ok(Self {
            ptr,
            len,
            layout,
            alloc,
        })
    }

    /// Creates a buffer of `len` copies of `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if memory allocation fails.
    pub fn from_elem(len: usize, value: T, alloc: A) -> Result<Self, TensorError>
    where
        T: Clone,
    {
        let (ptr, layout) = Self::allocate(len, &alloc)?;
        for i in 0..len {
            // SAFETY: i < len and the memory is uninitialized, so write without dropping.
            unsafe { ptr.as_ptr().add(i).write(value.clone()) };
        }
        Ok(Self {
            ptr,
            len,
            layout,
            alloc,
        })
    }

    /// Returns the pointer to the tensor memory.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    /// Returns the mutable pointer to the tensor memory.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Returns the storage data as a slice.
    ///
    /// # Panics
    ///
    /// Panics if the memory is not host accessible.
    pub fn as_slice(&self) -> &[T] {
        assert!(
            self.device().is_cpu(),
            "Cannot access device memory as a host slice."
        );
        // SAFETY: ptr is valid for len initialized elements on the host.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len) }
    }

    /// Returns the storage data as a mutable slice.
    ///
    /// # Panics
    ///
    /// Panics if the memory is not host accessible.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        assert!(
            self.device().is_cpu(),
            "Cannot access device memory as a host slice."
        );
        // SAFETY: ptr is valid for len initialized elements and we hold `&mut self`.
        unsafe { std::slice::from_raw_parts_mut(self.as_mut_ptr(), self.len) }
    }

    /// Returns the number of elements in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the buffer holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the memory layout of the underlying storage.
    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Returns the allocator of the storage.
    #[inline]
    pub fn alloc(&self) -> &A {
        &self.alloc
    }

    /// Returns the device where the data is allocated.
    #[inline]
    pub fn device(&self) -> Device {
        self.alloc.device()
    }
}

// SAFETY: the storage uniquely owns its elements, the allocator is Send + Sync.
unsafe impl<T: Send, A: TensorAllocator> Send for TensorStorage<T, A> {}

// SAFETY: shared access only hands out `&[T]`.
unsafe impl<T: Sync, A: TensorAllocator> Sync for TensorStorage<T, A> {}

impl<T, A: TensorAllocator> Drop for TensorStorage<T, A> {
    fn drop(&mut self) {
        // SAFETY: the first len elements are initialized and owned by this storage.
        unsafe {
            std::ptr::drop_in_place(std::ptr::slice_from_raw_parts_mut(
                self.ptr.as_ptr(),
                self.len,
            ));
        }
        if self.layout.size() != 0 {
            self.alloc
                .dealloc(self.ptr.as_ptr() as *mut u8, self.layout);
        }
    }
}

impl<T: Clone, A: TensorAllocator> Clone for TensorStorage<T, A> {
    fn clone(&self) -> Self {
        let (ptr, layout) = match Self::allocate(self.len, &self.alloc) {
            Ok(parts) => parts,
            Err(e) => panic!("failed to clone tensor storage: {e}"),
        };
        for (i, v) in self.as_slice().iter().enumerate() {
            // SAFETY: i < len and the destination is uninitialized.
            unsafe { ptr.as_ptr().add(i).write(v.clone()) };
        }
        Self {
            ptr,
            len: self.len,
            layout,
            alloc: self.alloc.clone(),
        }
    }
}

impl<T, A: TensorAllocator> std::fmt::Debug for TensorStorage<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TensorStorage")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("layout", &self.layout)
            .field("device", &self.device())
            .finish()
    }
}
