use crate::{
    arg::{BufferArg, BufferArgMut},
    config::FuncConfig,
    error::{ContractViolation, OpError},
    shape::TensorShape,
};

/// An operator function created through the [`FunctionRegistry`](crate::FunctionRegistry).
///
/// The lifecycle is: construct, [`Function::init`] once with the configuration, then any
/// number of [`Function::calc`] calls. `calc` takes `&mut self` because kernels keep
/// scratch memory between calls; callers that need concurrency create one instance per
/// thread.
pub trait Function: Send {
    /// Registered name of the function.
    fn name(&self) -> &'static str;

    /// Reads the configuration. Called once, before the first `calc`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`](crate::ConfigError) if a required key is missing or malformed.
    fn init(&mut self, config: &FuncConfig) -> Result<(), OpError>;

    /// Number of input arguments.
    fn num_inputs(&self) -> usize;

    /// Number of output arguments.
    fn num_outputs(&self) -> usize;

    /// Computes the output shapes for the given input shapes.
    ///
    /// # Errors
    ///
    /// Returns a [`ShapeError`](crate::ShapeError) if the inputs are inconsistent.
    fn infer_shape(&self, inputs: &[TensorShape]) -> Result<Vec<TensorShape>, OpError>;

    /// Validates the arguments without computing.
    ///
    /// # Errors
    ///
    /// Returns an error if the argument counts, shapes or types do not match.
    fn check(&self, inputs: &[BufferArg], outputs: &[BufferArgMut]) -> Result<(), OpError>;

    /// Computes the outputs from the inputs.
    ///
    /// # Errors
    ///
    /// Returns an error if [`Function::check`] fails or the kernel cannot run.
    fn calc(&mut self, inputs: &[BufferArg], outputs: &mut [BufferArgMut]) -> Result<(), OpError>;
}

/// Checks the number of input and output arguments.
pub(crate) fn check_arg_counts(
    inputs: usize,
    outputs: usize,
    expected_inputs: usize,
    expected_outputs: usize,
) -> Result<(), ContractViolation> {
    if inputs != expected_inputs {
        return Err(ContractViolation::ArgumentCount {
            kind: "inputs",
            expected: expected_inputs,
            actual: inputs,
        });
    }
    if outputs != expected_outputs {
        return Err(ContractViolation::ArgumentCount {
            kind: "outputs",
            expected: expected_outputs,
            actual: outputs,
        });
    }
    Ok(())
}

/// Checks the number of shapes handed to `infer_shape`.
pub(crate) fn check_shape_count(shapes: &[TensorShape], expected: usize) -> Result<(), ContractViolation> {
    if shapes.len() != expected {
        return Err(ContractViolation::ArgumentCount {
            kind: "input shapes",
            expected,
            actual: shapes.len(),
        });
    }
    Ok(())
}
