use tessera_tensor::{DeviceKind, TensorError};
use thiserror::Error;

use crate::arg::{ArgType, ValueType};

/// Errors raised while reading a function configuration.
///
/// Configuration is read once when a function is created, so these surface before any
/// computation runs.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    /// A required key is absent.
    #[error("missing configuration key `{0}`")]
    MissingKey(String),

    /// The key exists but holds a different kind of value.
    #[error("configuration key `{key}` expected {expected}, got {actual}")]
    TypeMismatch {
        /// The offending key
        key: String,
        /// Expected value kind
        expected: &'static str,
        /// Actual value kind
        actual: &'static str,
    },

    /// The value has the right kind but is out of its valid domain.
    #[error("invalid value for configuration key `{key}`: {reason}")]
    InvalidValue {
        /// The offending key
        key: String,
        /// Why the value was rejected
        reason: String,
    },
}

/// Errors raised by shape inference and shape validation.
#[derive(Error, Debug, PartialEq)]
pub enum ShapeError {
    /// A tensor has the wrong number of dimensions.
    #[error("{name} must be {expected}-D, got shape {actual:?}")]
    RankMismatch {
        /// Argument name
        name: &'static str,
        /// Expected rank
        expected: usize,
        /// Actual shape
        actual: Vec<usize>,
    },

    /// A channel count is not a multiple of the group count.
    #[error("{name} channels ({channels}) are not divisible by groups ({groups})")]
    GroupsNotDivisible {
        /// Which channel axis
        name: &'static str,
        /// Channel count
        channels: usize,
        /// Group count
        groups: usize,
    },

    /// The filter does not see `input_channels / groups` channels.
    #[error(
        "filter input channels ({filter_channels}) must equal input channels ({input_channels}) / groups ({groups})"
    )]
    FilterChannelMismatch {
        /// Channels per group seen by the filter
        filter_channels: usize,
        /// Input channel count
        input_channels: usize,
        /// Group count
        groups: usize,
    },

    /// The output extent computed for a spatial axis is not positive.
    #[error(
        "non-positive output {axis}: input {input}, filter {filter}, padding {padding}, stride {stride}"
    )]
    NonPositiveOutput {
        /// `height` or `width`
        axis: &'static str,
        /// Input extent
        input: usize,
        /// Filter extent
        filter: usize,
        /// Padding on each side
        padding: usize,
        /// Stride
        stride: usize,
    },

    /// The element count of a shape does not fit in `usize`.
    #[error("{name} of shape {shape:?} has more elements than fit in memory")]
    TooLarge {
        /// Which buffer would overflow
        name: &'static str,
        /// Offending shape
        shape: Vec<usize>,
    },

    /// A dimension that must be non-empty is zero.
    #[error("{name} has an empty dimension: {shape:?}")]
    EmptyDimension {
        /// Argument name
        name: &'static str,
        /// Offending shape
        shape: Vec<usize>,
    },

    /// Two shapes that must agree do not.
    #[error("{message}: expected {expected:?}, got {actual:?}")]
    Mismatch {
        /// Which relation failed
        message: String,
        /// Expected shape
        expected: Vec<usize>,
        /// Actual shape
        actual: Vec<usize>,
    },

    /// A class label does not index a valid class.
    #[error("label {label} at row {row} is outside [0, {num_classes})")]
    LabelOutOfRange {
        /// Row of the batch
        row: usize,
        /// Offending label
        label: i32,
        /// Number of classes
        num_classes: usize,
    },
}

impl ShapeError {
    /// Creates a Mismatch error.
    pub fn mismatch(message: impl Into<String>, expected: &[usize], actual: &[usize]) -> Self {
        Self::Mismatch {
            message: message.into(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}

/// Violations of the calling contract between the framework and a function.
///
/// These indicate that the caller built an invalid execution graph; they are never
/// retried.
#[derive(Error, Debug, PartialEq)]
pub enum ContractViolation {
    /// Wrong number of inputs or outputs.
    #[error("expected {expected} {kind}, got {actual}")]
    ArgumentCount {
        /// `inputs` or `outputs`
        kind: &'static str,
        /// Expected count
        expected: usize,
        /// Actual count
        actual: usize,
    },

    /// An output is not in the required argument mode.
    #[error("output argument must be {expected:?}, got {actual:?}")]
    ArgType {
        /// Required mode
        expected: ArgType,
        /// Actual mode
        actual: ArgType,
    },

    /// An argument holds elements of the wrong type.
    #[error("argument holds {actual:?} elements, expected {expected:?}")]
    ElementType {
        /// Required element type
        expected: ValueType,
        /// Actual element type
        actual: ValueType,
    },

    /// A buffer is shorter than its shape or view requires.
    #[error("{name} buffer holds {actual} elements, {required} required")]
    BufferTooSmall {
        /// Buffer name
        name: &'static str,
        /// Elements required
        required: usize,
        /// Elements available
        actual: usize,
    },

    /// A matrix leading dimension is smaller than its row length.
    #[error("{name} leading dimension {ld} is smaller than its {cols} columns")]
    LeadingDimension {
        /// Matrix name
        name: &'static str,
        /// Leading dimension
        ld: usize,
        /// Number of columns
        cols: usize,
    },
}

/// Errors raised by the function registry.
#[derive(Error, Debug, PartialEq)]
pub enum RegistryError {
    /// A function is already registered under this key.
    #[error("function `{name}` is already registered for {device}")]
    Duplicate {
        /// Function name
        name: String,
        /// Device family
        device: DeviceKind,
    },

    /// No function is registered under this key.
    #[error("no function `{name}` registered for {device}")]
    NotFound {
        /// Function name
        name: String,
        /// Device family
        device: DeviceKind,
    },
}

/// An error type for operator functions.
#[derive(Error, Debug, PartialEq)]
pub enum OpError {
    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Invalid shapes
    #[error("shape error: {0}")]
    Shape(#[from] ShapeError),

    /// Caller contract violated
    #[error("contract violation: {0}")]
    Contract(#[from] ContractViolation),

    /// Registry lookup failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Error with the tensor or its memory
    #[error("Error with the tensor: {0}")]
    Tensor(#[from] TensorError),
}
