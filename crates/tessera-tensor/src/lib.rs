#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Overview
//!
//! `tessera-tensor` holds the memory side of the operator kernels: owned tensors with a
//! compile-time rank, allocator-backed storage tagged with the [`Device`] it lives on, and
//! the grow-only [`ScratchBuffer`] kernels reuse between invocations.
//!
//! # Quick Start
//!
//! ```rust
//! use tessera_tensor::{CpuAllocator, Tensor};
//!
//! // an NCHW image with a single 2x3 channel
//! let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
//! let image = Tensor::<f32, 4, _>::from_shape_vec([1, 1, 2, 3], data, CpuAllocator).unwrap();
//!
//! assert_eq!(image.get([0, 0, 1, 2]), Some(&6.0));
//! assert_eq!(image.strides, [6, 6, 3, 1]);
//! ```

/// Allocator module containing memory management utilities.
///
/// This module provides the [`TensorAllocator`] trait and implementations for different
/// memory backends. The default [`CpuAllocator`] uses the system allocator for CPU memory.
pub mod allocator;

/// Device module containing device abstraction.
pub mod device;

/// Scratch module containing the grow-only reusable kernel buffer.
pub mod scratch;

/// Storage module containing low-level memory buffer implementations.
pub mod storage;

/// Tensor module containing the main tensor implementation and error types.
pub mod tensor;

pub use crate::allocator::{CpuAllocator, TensorAllocator, TensorAllocatorError};
pub use crate::device::{Device, DeviceKind};
pub use crate::scratch::ScratchBuffer;
pub use crate::storage::TensorStorage;
pub use crate::tensor::{Tensor, TensorError};

/// Type alias for a 2-dimensional tensor.
pub type Tensor2<T, A> = Tensor<T, 2, A>;

/// Type alias for a 4-dimensional tensor.
pub type Tensor4<T, A> = Tensor<T, 4, A>;

/// Type alias for a 4-dimensional tensor with CPU allocator, the NCHW layout used by kernels.
pub type CpuTensor4<T> = Tensor4<T, CpuAllocator>;
