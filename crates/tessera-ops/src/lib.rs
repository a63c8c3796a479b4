#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Overview
//!
//! Every operator is a [`Function`]: it is created by name and device through a
//! [`FunctionRegistry`], initialized once from a [`FuncConfig`], infers its output shapes
//! and computes on borrowed [`BufferArg`] inputs and [`BufferArgMut`] outputs.
//!
//! The convolution unrolls each image into a column matrix ([`im2col`]) and multiplies it
//! with the filter ([`gemm`]), group by group, reusing one grow-only scratch buffer.
//!
//! # Quick Start
//!
//! ```rust
//! use tessera_ops::{registry, BufferArg, BufferArgMut, FuncConfig, TensorShape};
//! use tessera_tensor::{CpuAllocator, Device, Tensor};
//!
//! let config = FuncConfig::new()
//!     .set("strides", [1, 1])
//!     .set("paddings", [1, 1])
//!     .set("groups", 1usize);
//! let mut conv = registry::global().create("GemmConv", Device::Cpu, &config).unwrap();
//!
//! let input = Tensor::<f32, 4, _>::from_shape_val([1, 1, 4, 4], 1.0, CpuAllocator).unwrap();
//! let filter = Tensor::<f32, 4, _>::from_shape_val([1, 1, 2, 2], 1.0, CpuAllocator).unwrap();
//!
//! let shapes = conv
//!     .infer_shape(&[TensorShape::from(input.shape), TensorShape::from(filter.shape)])
//!     .unwrap();
//! assert_eq!(shapes[0].dims(), &[1, 1, 5, 5]);
//!
//! let mut output = Tensor::<f32, 4, _>::zeros([1, 1, 5, 5], CpuAllocator).unwrap();
//! conv.calc(
//!     &[BufferArg::from(&input), BufferArg::from(&filter)],
//!     &mut [BufferArgMut::assign_to(&mut output)],
//! )
//! .unwrap();
//!
//! assert_eq!(output.get([0, 0, 0, 0]), Some(&1.0));
//! assert_eq!(output.get([0, 0, 0, 1]), Some(&2.0));
//! assert_eq!(output.get([0, 0, 1, 1]), Some(&4.0));
//! ```

mod arg;
mod config;
mod error;
mod function;
mod shape;

/// Device backends bundling an allocator, an im2col transform and a GEMM.
pub mod backend;

/// Convolution through im2col and GEMM, with its shape inference.
pub mod conv;

/// Dense matrix multiply with explicit leading dimensions.
pub mod gemm;

/// Image to column matrix unrolling.
pub mod im2col;

/// Parametric ReLU and its gradient.
pub mod prelu;

/// Registry of functions keyed by name and device.
pub mod registry;

/// Softmax with cross entropy loss and its gradient.
pub mod softmax_cross_entropy;

pub use crate::arg::{ArgType, BufferArg, BufferArgMut, ValueType};
pub use crate::backend::{ConvBackend, CpuBackend, ReferenceCpuBackend};
pub use crate::config::{Attribute, FuncConfig};
pub use crate::conv::{
    conv2d, infer_conv_grad_shapes, infer_conv_output_shape, ConvConfig, ExecutionStrategy,
    GemmConvFunction,
};
pub use crate::error::{ConfigError, ContractViolation, OpError, RegistryError, ShapeError};
pub use crate::function::Function;
pub use crate::gemm::{Gemm, MatrixMultiplyGemm, ReferenceGemm};
pub use crate::im2col::{CpuIm2Col, Im2Col, Im2ColGeometry};
pub use crate::prelu::{PreluFunction, PreluGradFunction};
pub use crate::registry::{FunctionFactory, FunctionRegistry};
pub use crate::shape::TensorShape;
pub use crate::softmax_cross_entropy::{
    SoftmaxWithCrossEntropyFunction, SoftmaxWithCrossEntropyGradFunction,
};
