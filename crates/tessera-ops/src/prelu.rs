use crate::{
    arg::{BufferArg, BufferArgMut},
    config::FuncConfig,
    error::{OpError, ShapeError},
    function::{check_arg_counts, check_shape_count, Function},
    shape::TensorShape,
};

/// Registered name of the PReLU forward pass.
pub const PRELU: &str = "Prelu";

/// Registered name of the PReLU input gradient.
pub const PRELU_GRAD: &str = "PreluGrad";

/// Parametric ReLU: `x` where `x > 0`, `alpha * x` elsewhere.
///
/// PRECONDITION: `src` and `dst` have the same length.
pub fn prelu(src: &[f32], alpha: f32, dst: &mut [f32]) {
    dst.iter_mut().zip(src).for_each(|(y, &x)| {
        *y = if x > 0.0 { x } else { alpha * x };
    });
}

/// Gradient of [`prelu`] with respect to its input.
///
/// PRECONDITION: `x`, `d_out` and `d_x` have the same length.
pub fn prelu_grad(x: &[f32], d_out: &[f32], alpha: f32, d_x: &mut [f32]) {
    d_x.iter_mut()
        .zip(x.iter().zip(d_out))
        .for_each(|(dx, (&x, &dy))| {
            *dx = if x > 0.0 { dy } else { alpha * dy };
        });
}

fn require_same_shape(message: &str, expected: &TensorShape, actual: &TensorShape) -> Result<(), ShapeError> {
    if expected != actual {
        return Err(ShapeError::mismatch(message, expected.dims(), actual.dims()));
    }
    Ok(())
}

/// PReLU forward pass. Reads the optional `alpha` key, `0.0` when absent.
#[derive(Debug, Clone, Default)]
pub struct PreluFunction {
    alpha: f32,
}

impl PreluFunction {
    /// Creates the function with a fixed negative slope.
    pub fn new(alpha: f32) -> Self {
        Self { alpha }
    }

    /// The negative slope.
    pub fn alpha(&self) -> f32 {
        self.alpha
    }
}

impl Function for PreluFunction {
    fn name(&self) -> &'static str {
        PRELU
    }

    fn init(&mut self, config: &FuncConfig) -> Result<(), OpError> {
        self.alpha = config.get_f32_or("alpha", 0.0)?;
        Ok(())
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn infer_shape(&self, inputs: &[TensorShape]) -> Result<Vec<TensorShape>, OpError> {
        check_shape_count(inputs, 1)?;
        Ok(vec![inputs[0].clone()])
    }

    fn check(&self, inputs: &[BufferArg], outputs: &[BufferArgMut]) -> Result<(), OpError> {
        check_arg_counts(inputs.len(), outputs.len(), 1, 1)?;
        outputs[0].require_assign()?;
        require_same_shape("prelu output shape", inputs[0].shape(), outputs[0].shape())?;
        Ok(())
    }

    fn calc(&mut self, inputs: &[BufferArg], outputs: &mut [BufferArgMut]) -> Result<(), OpError> {
        self.check(inputs, outputs)?;
        let src = inputs[0].f32_data()?;
        prelu(src, self.alpha, outputs[0].f32_data_mut()?);
        Ok(())
    }
}

/// PReLU input gradient: inputs `(x, d_out)`, output `d_x`.
#[derive(Debug, Clone, Default)]
pub struct PreluGradFunction {
    alpha: f32,
}

impl PreluGradFunction {
    /// Creates the function with a fixed negative slope.
    pub fn new(alpha: f32) -> Self {
        Self { alpha }
    }
}

impl Function for PreluGradFunction {
    fn name(&self) -> &'static str {
        PRELU_GRAD
    }

    fn init(&mut self, config: &FuncConfig) -> Result<(), OpError> {
        self.alpha = config.get_f32_or("alpha", 0.0)?;
        Ok(())
    }

    fn num_inputs(&self) -> usize {
        2
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn infer_shape(&self, inputs: &[TensorShape]) -> Result<Vec<TensorShape>, OpError> {
        check_shape_count(inputs, 2)?;
        require_same_shape("prelu output gradient shape", &inputs[0], &inputs[1])?;
        Ok(vec![inputs[0].clone()])
    }

    fn check(&self, inputs: &[BufferArg], outputs: &[BufferArgMut]) -> Result<(), OpError> {
        check_arg_counts(inputs.len(), outputs.len(), 2, 1)?;
        outputs[0].require_assign()?;
        require_same_shape("prelu output gradient shape", inputs[0].shape(), inputs[1].shape())?;
        require_same_shape("prelu input gradient shape", inputs[0].shape(), outputs[0].shape())?;
        Ok(())
    }

    fn calc(&mut self, inputs: &[BufferArg], outputs: &mut [BufferArgMut]) -> Result<(), OpError> {
        self.check(inputs, outputs)?;
        let x = inputs[0].f32_data()?;
        let d_out = inputs[1].f32_data()?;
        prelu_grad(x, d_out, self.alpha, outputs[0].f32_data_mut()?);
        Ok(())
    }
}
