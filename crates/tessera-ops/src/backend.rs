//! Device backends for the convolution kernel.
//!
//! A backend bundles everything the kernel needs from a device: where scratch memory comes
//! from, how an image is unrolled and how the matrix product runs. Adding a device means
//! adding one implementation of [`ConvBackend`] and registering it under its
//! [`DeviceKind`].

use tessera_tensor::{CpuAllocator, DeviceKind, TensorAllocator};

use crate::{
    gemm::{Gemm, MatrixMultiplyGemm, ReferenceGemm},
    im2col::{CpuIm2Col, Im2Col},
};

/// Capabilities a device provides to the im2col convolution.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: the batch-parallel strategy shares the im2col and
/// GEMM implementations across rayon workers.
pub trait ConvBackend: Send + Sync + 'static {
    /// Allocator for the kernel's scratch buffer.
    type Allocator: TensorAllocator + Default;

    /// Image-to-column transform.
    type Im2Col: Im2Col + Default + Send + Sync;

    /// Matrix multiply.
    type Gemm: Gemm + Default + Send + Sync;

    /// Device family the backend runs on.
    const DEVICE: DeviceKind;
}

/// Host backend: system allocator, [`CpuIm2Col`] and [`MatrixMultiplyGemm`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl ConvBackend for CpuBackend {
    type Allocator = CpuAllocator;
    type Im2Col = CpuIm2Col;
    type Gemm = MatrixMultiplyGemm;
    const DEVICE: DeviceKind = DeviceKind::Cpu;
}

/// Host backend using the triple-loop [`ReferenceGemm`], for checking other backends.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceCpuBackend;

impl ConvBackend for ReferenceCpuBackend {
    type Allocator = CpuAllocator;
    type Im2Col = CpuIm2Col;
    type Gemm = ReferenceGemm;
    const DEVICE: DeviceKind = DeviceKind::Cpu;
}
