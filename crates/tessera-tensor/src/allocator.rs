use std::alloc::{self, Layout};

use thiserror::Error;

use crate::device::Device;

/// Failures of a [`TensorAllocator`].
#[derive(Debug, Error, PartialEq)]
pub enum TensorAllocatorError {
    /// The element count does not describe a valid array layout.
    #[error("Invalid tensor layout {0}")]
    LayoutError(core::alloc::LayoutError),

    /// The allocator handed back no memory.
    #[error("Null pointer")]
    NullPointer,

    /// Zero sized requests are served by the storage without calling the allocator.
    #[error("Zero sized allocation")]
    ZeroSized,
}

/// Source of the raw memory behind tensor storage and scratch buffers.
///
/// Implementors are shared between worker threads, hence the `Send + Sync` bound. The
/// pointer returned by `alloc` is released with `dealloc` and the same layout.
pub trait TensorAllocator: Clone + Send + Sync + 'static {
    /// Reserves a block matching `layout`, which is never zero sized.
    fn alloc(&self, layout: Layout) -> Result<*mut u8, TensorAllocatorError>;

    /// Releases a block obtained from [`TensorAllocator::alloc`].
    fn dealloc(&self, ptr: *mut u8, layout: Layout);

    /// Where the memory handed out by this allocator lives.
    fn device(&self) -> Device;
}

/// Host memory from the global allocator.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuAllocator;

impl TensorAllocator for CpuAllocator {
    fn alloc(&self, layout: Layout) -> Result<*mut u8, TensorAllocatorError> {
        if layout.size() == 0 {
            return Err(TensorAllocatorError::ZeroSized);
        }
        // SAFETY: the layout has a non-zero size.
        let ptr = unsafe { alloc::alloc(layout) };
        if ptr.is_null() {
            return Err(TensorAllocatorError::NullPointer);
        }
        Ok(ptr)
    }

    #[allow(clippy::not_unsafe_ptr_arg_deref)]
    fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if ptr.is_null() || layout.size() == 0 {
            return;
        }
        // SAFETY: `ptr` came from `alloc` with this layout.
        unsafe { alloc::dealloc(ptr, layout) }
    }

    fn device(&self) -> Device {
        Device::Cpu
    }
}
