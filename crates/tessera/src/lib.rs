#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use tessera_tensor as tensor;

#[doc(inline)]
pub use tessera_ops as ops;
