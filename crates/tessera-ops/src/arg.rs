use tessera_tensor::{Tensor, TensorAllocator};

use crate::{error::ContractViolation, shape::TensorShape};

/// How a function writes into an output argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArgType {
    /// No mode was requested.
    #[default]
    Unspecified,
    /// Overwrite the output with the result.
    AssignTo,
    /// Accumulate the result into the existing output.
    AddTo,
}

/// Element type carried by an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// 32-bit floats, used for activations and weights.
    Float32,
    /// 32-bit signed integers, used for class labels.
    Int32,
}

#[derive(Debug, Clone, Copy)]
enum ArgData<'a> {
    F32(&'a [f32]),
    I32(&'a [i32]),
}

#[derive(Debug)]
enum ArgDataMut<'a> {
    F32(&'a mut [f32]),
    I32(&'a mut [i32]),
}

/// A borrowed, read-only function argument: a shape and its elements.
///
/// # Example
///
/// ```
/// use tessera_ops::BufferArg;
///
/// let data = [1.0, 2.0, 3.0, 4.0];
/// let arg = BufferArg::from_f32([2, 2], &data).unwrap();
/// assert_eq!(arg.shape().dims(), &[2, 2]);
/// assert_eq!(arg.f32_data().unwrap(), &data);
/// ```
#[derive(Debug, Clone)]
pub struct BufferArg<'a> {
    shape: TensorShape,
    data: ArgData<'a>,
}

fn check_len(shape: &TensorShape, len: usize) -> Result<(), ContractViolation> {
    if shape.numel() > len {
        return Err(ContractViolation::BufferTooSmall {
            name: "argument",
            required: shape.numel(),
            actual: len,
        });
    }
    Ok(())
}

impl<'a> BufferArg<'a> {
    /// Wraps float data with the given shape.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` holds fewer elements than the shape describes.
    pub fn from_f32(shape: impl Into<TensorShape>, data: &'a [f32]) -> Result<Self, ContractViolation> {
        let shape = shape.into();
        check_len(&shape, data.len())?;
        Ok(Self {
            shape,
            data: ArgData::F32(data),
        })
    }

    /// Wraps integer data with the given shape.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` holds fewer elements than the shape describes.
    pub fn from_i32(shape: impl Into<TensorShape>, data: &'a [i32]) -> Result<Self, ContractViolation> {
        let shape = shape.into();
        check_len(&shape, data.len())?;
        Ok(Self {
            shape,
            data: ArgData::I32(data),
        })
    }

    /// The argument shape.
    #[inline]
    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    /// The element type.
    pub fn value_type(&self) -> ValueType {
        match self.data {
            ArgData::F32(_) => ValueType::Float32,
            ArgData::I32(_) => ValueType::Int32,
        }
    }

    /// The float elements, limited to the shape's element count.
    pub fn f32_data(&self) -> Result<&'a [f32], ContractViolation> {
        match self.data {
            ArgData::F32(data) => Ok(&data[..self.shape.numel()]),
            ArgData::I32(_) => Err(ContractViolation::ElementType {
                expected: ValueType::Float32,
                actual: ValueType::Int32,
            }),
        }
    }

    /// The integer elements, limited to the shape's element count.
    pub fn i32_data(&self) -> Result<&'a [i32], ContractViolation> {
        match self.data {
            ArgData::I32(data) => Ok(&data[..self.shape.numel()]),
            ArgData::F32(_) => Err(ContractViolation::ElementType {
                expected: ValueType::Int32,
                actual: ValueType::Float32,
            }),
        }
    }
}

impl<'a, const N: usize, A: TensorAllocator> From<&'a Tensor<f32, N, A>> for BufferArg<'a> {
    fn from(tensor: &'a Tensor<f32, N, A>) -> Self {
        Self {
            shape: tensor.shape.into(),
            data: ArgData::F32(tensor.as_slice()),
        }
    }
}

impl<'a, const N: usize, A: TensorAllocator> From<&'a Tensor<i32, N, A>> for BufferArg<'a> {
    fn from(tensor: &'a Tensor<i32, N, A>) -> Self {
        Self {
            shape: tensor.shape.into(),
            data: ArgData::I32(tensor.as_slice()),
        }
    }
}

/// A borrowed, writable function output with its [`ArgType`].
#[derive(Debug)]
pub struct BufferArgMut<'a> {
    shape: TensorShape,
    data: ArgDataMut<'a>,
    arg_type: ArgType,
}

impl<'a> BufferArgMut<'a> {
    /// Wraps mutable float data with the given shape and mode.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` holds fewer elements than the shape describes.
    pub fn from_f32(
        shape: impl Into<TensorShape>,
        data: &'a mut [f32],
        arg_type: ArgType,
    ) -> Result<Self, ContractViolation> {
        let shape = shape.into();
        check_len(&shape, data.len())?;
        Ok(Self {
            shape,
            data: ArgDataMut::F32(data),
            arg_type,
        })
    }

    /// Wraps mutable integer data with the given shape and mode.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` holds fewer elements than the shape describes.
    pub fn from_i32(
        shape: impl Into<TensorShape>,
        data: &'a mut [i32],
        arg_type: ArgType,
    ) -> Result<Self, ContractViolation> {
        let shape = shape.into();
        check_len(&shape, data.len())?;
        Ok(Self {
            shape,
            data: ArgDataMut::I32(data),
            arg_type,
        })
    }

    /// Borrows a float tensor as an overwrite output.
    pub fn assign_to<const N: usize, A: TensorAllocator>(tensor: &'a mut Tensor<f32, N, A>) -> Self {
        Self {
            shape: tensor.shape.into(),
            data: ArgDataMut::F32(tensor.as_slice_mut()),
            arg_type: ArgType::AssignTo,
        }
    }

    /// Borrows a float tensor as an accumulating output.
    pub fn add_to<const N: usize, A: TensorAllocator>(tensor: &'a mut Tensor<f32, N, A>) -> Self {
        Self {
            shape: tensor.shape.into(),
            data: ArgDataMut::F32(tensor.as_slice_mut()),
            arg_type: ArgType::AddTo,
        }
    }

    /// The argument shape.
    #[inline]
    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    /// The write mode.
    #[inline]
    pub fn arg_type(&self) -> ArgType {
        self.arg_type
    }

    /// The element type.
    pub fn value_type(&self) -> ValueType {
        match self.data {
            ArgDataMut::F32(_) => ValueType::Float32,
            ArgDataMut::I32(_) => ValueType::Int32,
        }
    }

    /// The float elements, limited to the shape's element count.
    pub fn f32_data_mut(&mut self) -> Result<&mut [f32], ContractViolation> {
        let numel = self.shape.numel();
        match &mut self.data {
            ArgDataMut::F32(data) => Ok(&mut data[..numel]),
            ArgDataMut::I32(_) => Err(ContractViolation::ElementType {
                expected: ValueType::Float32,
                actual: ValueType::Int32,
            }),
        }
    }

    /// Fails unless the output is in overwrite mode.
    pub fn require_assign(&self) -> Result<(), ContractViolation> {
        if self.arg_type != ArgType::AssignTo {
            return Err(ContractViolation::ArgType {
                expected: ArgType::AssignTo,
                actual: self.arg_type,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_tensor::CpuAllocator;

    #[test]
    fn test_arg_too_small() {
        let data = [0.0; 3];
        assert_eq!(
            BufferArg::from_f32([2, 2], &data).err(),
            Some(ContractViolation::BufferTooSmall {
                name: "argument",
                required: 4,
                actual: 3,
            })
        );
    }

    #[test]
    fn test_arg_element_type() -> Result<(), ContractViolation> {
        let labels = [1, 0];
        let arg = BufferArg::from_i32([2], &labels)?;
        assert_eq!(arg.value_type(), ValueType::Int32);
        assert_eq!(arg.i32_data()?, &[1, 0]);
        assert!(arg.f32_data().is_err());
        Ok(())
    }

    #[test]
    fn test_arg_from_tensor() -> Result<(), Box<dyn std::error::Error>> {
        let mut t = Tensor::<f32, 2, _>::zeros([2, 3], CpuAllocator)?;
        assert_eq!(BufferArg::from(&t).shape().dims(), &[2, 3]);

        let mut out = BufferArgMut::assign_to(&mut t);
        out.require_assign()?;
        out.f32_data_mut()?[5] = 1.0;
        assert_eq!(t.as_slice()[5], 1.0);

        let out = BufferArgMut::add_to(&mut t);
        assert_eq!(
            out.require_assign(),
            Err(ContractViolation::ArgType {
                expected: ArgType::AssignTo,
                actual: ArgType::AddTo,
            })
        );
        Ok(())
    }
}
