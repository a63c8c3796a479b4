use rayon::prelude::*;
use tessera_tensor::{CpuAllocator, ScratchBuffer, Tensor, TensorAllocator};

use crate::{
    arg::{BufferArg, BufferArgMut},
    backend::{ConvBackend, CpuBackend},
    config::FuncConfig,
    error::{ConfigError, ContractViolation, OpError, ShapeError},
    function::{check_arg_counts, check_shape_count, Function},
    gemm::Gemm,
    im2col::{Im2Col, Im2ColGeometry},
    shape::TensorShape,
};

/// Registered name of the im2col convolution.
pub const GEMM_CONV: &str = "GemmConv";

/// Stride, padding and group count of a 2D convolution.
///
/// Built through [`ConvConfig::new`] or [`ConvConfig::from_func_config`], both of which
/// reject a zero stride or a zero group count. The value is immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvConfig {
    stride_h: usize,
    stride_w: usize,
    padding_h: usize,
    padding_w: usize,
    groups: usize,
}

impl Default for ConvConfig {
    fn default() -> Self {
        Self {
            stride_h: 1,
            stride_w: 1,
            padding_h: 0,
            padding_w: 0,
            groups: 1,
        }
    }
}

impl ConvConfig {
    /// Creates a configuration from `[height, width]` strides and paddings.
    ///
    /// # Errors
    ///
    /// Returns an error if a stride or the group count is zero.
    pub fn new(stride: [usize; 2], padding: [usize; 2], groups: usize) -> Result<Self, ConfigError> {
        if stride.contains(&0) {
            return Err(ConfigError::InvalidValue {
                key: "strides".to_string(),
                reason: format!("strides must be positive, got {stride:?}"),
            });
        }
        if groups == 0 {
            return Err(ConfigError::InvalidValue {
                key: "groups".to_string(),
                reason: "groups must be positive".to_string(),
            });
        }
        Ok(Self {
            stride_h: stride[0],
            stride_w: stride[1],
            padding_h: padding[0],
            padding_w: padding[1],
            groups,
        })
    }

    /// Reads the `strides`, `paddings` and `groups` keys.
    ///
    /// # Errors
    ///
    /// Returns an error if a key is missing, malformed or out of range.
    pub fn from_func_config(config: &FuncConfig) -> Result<Self, ConfigError> {
        Self::new(
            config.get_usize_pair("strides")?,
            config.get_usize_pair("paddings")?,
            config.get_usize("groups")?,
        )
    }

    /// `[height, width]` strides.
    pub fn stride(&self) -> [usize; 2] {
        [self.stride_h, self.stride_w]
    }

    /// `[height, width]` zero padding applied on both sides.
    pub fn padding(&self) -> [usize; 2] {
        [self.padding_h, self.padding_w]
    }

    /// Number of channel groups.
    pub fn groups(&self) -> usize {
        self.groups
    }
}

/// Output extent of one spatial axis: `(input - filter + 2 * padding) / stride + 1`.
///
/// Returns `None` when the extent would not be positive, `stride` is zero, or the padded
/// input does not fit in `usize`.
///
/// # Example
///
/// ```
/// use tessera_ops::conv::output_size;
///
/// assert_eq!(output_size(4, 2, 0, 1), Some(3));
/// assert_eq!(output_size(5, 3, 1, 2), Some(3));
/// assert_eq!(output_size(1, 4, 1, 1), None);
/// ```
pub fn output_size(input: usize, filter: usize, padding: usize, stride: usize) -> Option<usize> {
    if stride == 0 {
        return None;
    }
    // a negative span floors to a non-positive extent
    let padded = padding.checked_mul(2)?.checked_add(input)?;
    let span = padded.checked_sub(filter)?;
    Some(span / stride + 1)
}

fn non_empty(name: &'static str, dims: &[usize]) -> Result<(), ShapeError> {
    if dims.contains(&0) {
        return Err(ShapeError::EmptyDimension {
            name,
            shape: dims.to_vec(),
        });
    }
    Ok(())
}

/// Computes the `(N, M, OH, OW)` output shape of a convolution.
///
/// The input is `(N, C, H, W)` and the filter `(M, C / groups, FH, FW)`. The batch may be
/// empty; every other extent must be positive.
///
/// # Errors
///
/// Returns an error if a rank is not 4, a channel count does not split into `groups`, the
/// filter channels disagree with the input, an output extent is not positive, or the output
/// or the unrolled column buffer would hold more than `usize::MAX` elements.
pub fn infer_conv_output_shape(
    input: &TensorShape,
    filter: &TensorShape,
    config: &ConvConfig,
) -> Result<TensorShape, ShapeError> {
    let [batch, channels, height, width] = input.to_array::<4>("input")?;
    let [out_channels, filter_channels, filter_h, filter_w] = filter.to_array::<4>("filter")?;
    non_empty("input", &[channels, height, width])?;
    non_empty("filter", filter.dims())?;

    let groups = config.groups;
    if channels % groups != 0 {
        return Err(ShapeError::GroupsNotDivisible {
            name: "input",
            channels,
            groups,
        });
    }
    if filter_channels != channels / groups {
        return Err(ShapeError::FilterChannelMismatch {
            filter_channels,
            input_channels: channels,
            groups,
        });
    }
    if out_channels % groups != 0 {
        return Err(ShapeError::GroupsNotDivisible {
            name: "output",
            channels: out_channels,
            groups,
        });
    }

    let out_h = output_size(height, filter_h, config.padding_h, config.stride_h).ok_or(
        ShapeError::NonPositiveOutput {
            axis: "height",
            input: height,
            filter: filter_h,
            padding: config.padding_h,
            stride: config.stride_h,
        },
    )?;
    let out_w = output_size(width, filter_w, config.padding_w, config.stride_w).ok_or(
        ShapeError::NonPositiveOutput {
            axis: "width",
            input: width,
            filter: filter_w,
            padding: config.padding_w,
            stride: config.stride_w,
        },
    )?;

    let output = TensorShape::from([batch, out_channels, out_h, out_w]);
    if output.checked_numel().is_none() {
        return Err(ShapeError::TooLarge {
            name: "output",
            shape: output.dims().to_vec(),
        });
    }
    let column = TensorShape::from([filter_channels, filter_h, filter_w, out_h, out_w]);
    if column.checked_numel().is_none() {
        return Err(ShapeError::TooLarge {
            name: "column",
            shape: column.dims().to_vec(),
        });
    }

    Ok(output)
}

/// Shapes of the input and filter gradients, which mirror the forward input and filter.
pub fn infer_conv_grad_shapes(input: &TensorShape, filter: &TensorShape) -> (TensorShape, TensorShape) {
    (input.clone(), filter.clone())
}

/// How a convolution walks the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStrategy {
    /// One image after the other on the calling thread, reusing the kernel's scratch buffer.
    #[default]
    Serial,

    /// Images in parallel on the global rayon pool, one scratch buffer per worker.
    ParallelBatch,
}

/// Extents of a validated convolution.
#[derive(Debug, Clone, Copy)]
struct ConvDims {
    channels: usize,
    height: usize,
    width: usize,
    out_channels: usize,
    filter_h: usize,
    filter_w: usize,
    out_h: usize,
    out_w: usize,
    config: ConvConfig,
}

impl ConvDims {
    /// PRECONDITION: the shapes passed [`infer_conv_output_shape`].
    fn new(input: &TensorShape, filter: &TensorShape, output: &TensorShape, config: ConvConfig) -> Self {
        Self {
            channels: input[1],
            height: input[2],
            width: input[3],
            out_channels: filter[0],
            filter_h: filter[2],
            filter_w: filter[3],
            out_h: output[2],
            out_w: output[3],
            config,
        }
    }

    fn geometry(&self) -> Im2ColGeometry {
        Im2ColGeometry {
            channels: self.channels / self.config.groups,
            height: self.height,
            width: self.width,
            filter_height: self.filter_h,
            filter_width: self.filter_w,
            stride_height: self.config.stride_h,
            stride_width: self.config.stride_w,
            padding_height: self.config.padding_h,
            padding_width: self.config.padding_w,
            output_height: self.out_h,
            output_width: self.out_w,
        }
    }

    fn image_len(&self) -> usize {
        self.channels * self.height * self.width
    }

    fn output_len(&self) -> usize {
        self.out_channels * self.out_h * self.out_w
    }
}

/// Convolves one image, group by group.
///
/// Group `g` reads input channels `[g * Cg, (g + 1) * Cg)` and the filter rows of output
/// channels `[g * Mg, (g + 1) * Mg)`, and writes those output channels.
#[allow(clippy::too_many_arguments)]
fn conv_image<I: Im2Col, G: Gemm>(
    im2col: &I,
    gemm: &G,
    dims: &ConvDims,
    image: &[f32],
    filter: &[f32],
    col: &mut [f32],
    out: &mut [f32],
) -> Result<(), ContractViolation> {
    let geometry = dims.geometry();
    let m = dims.out_channels / dims.config.groups;
    let n = geometry.col_cols();
    let k = geometry.col_rows();

    for ((group_image, group_filter), group_out) in image
        .chunks_exact(geometry.image_len())
        .zip(filter.chunks_exact(m * k))
        .zip(out.chunks_exact_mut(m * n))
    {
        im2col.im2col(group_image, &geometry, col)?;
        gemm.gemm(m, n, k, 1.0, group_filter, k, col, n, 0.0, group_out, n)?;
    }
    Ok(())
}

/// 2D convolution as im2col followed by a matrix multiply.
///
/// Each instance owns a grow-only scratch buffer sized for one column matrix
/// (`C / groups * FH * FW * OH * OW` elements). It is grown at most once per call and
/// reused by later calls, so repeated inference with the same shapes allocates only once.
///
/// # Example
///
/// ```
/// use tessera_ops::{BufferArg, BufferArgMut, ConvConfig, GemmConvFunction};
/// use tessera_tensor::{CpuAllocator, Tensor};
///
/// let input = Tensor::<f32, 4, _>::from_shape_val([1, 1, 4, 4], 1.0, CpuAllocator).unwrap();
/// let filter = Tensor::<f32, 4, _>::from_shape_val([1, 1, 2, 2], 1.0, CpuAllocator).unwrap();
/// let mut output = Tensor::<f32, 4, _>::zeros([1, 1, 3, 3], CpuAllocator).unwrap();
///
/// let mut conv: GemmConvFunction = GemmConvFunction::new(ConvConfig::default());
/// conv.compute(
///     &BufferArg::from(&input),
///     &BufferArg::from(&filter),
///     &mut BufferArgMut::assign_to(&mut output),
/// )
/// .unwrap();
///
/// assert_eq!(output.as_slice(), &[4.0; 9]);
/// ```
pub struct GemmConvFunction<B: ConvBackend = CpuBackend> {
    config: ConvConfig,
    strategy: ExecutionStrategy,
    im2col: B::Im2Col,
    gemm: B::Gemm,
    scratch: ScratchBuffer<f32, B::Allocator>,
}

impl<B: ConvBackend> Default for GemmConvFunction<B> {
    fn default() -> Self {
        Self::new(ConvConfig::default())
    }
}

impl<B: ConvBackend> GemmConvFunction<B> {
    /// Creates a serial convolution with the given configuration.
    pub fn new(config: ConvConfig) -> Self {
        Self {
            config,
            strategy: ExecutionStrategy::Serial,
            im2col: B::Im2Col::default(),
            gemm: B::Gemm::default(),
            scratch: ScratchBuffer::new(B::Allocator::default()),
        }
    }

    /// Sets the batch execution strategy.
    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// The convolution configuration.
    pub fn config(&self) -> &ConvConfig {
        &self.config
    }

    /// The batch execution strategy.
    pub fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    /// The kernel-owned scratch buffer used by [`ExecutionStrategy::Serial`].
    pub fn scratch(&self) -> &ScratchBuffer<f32, B::Allocator> {
        &self.scratch
    }

    /// Convolves `input` with `filter` into `output`.
    ///
    /// # Errors
    ///
    /// Returns an error if `output` is not [`ArgType::AssignTo`](crate::ArgType), an argument
    /// holds non-float data, the shapes are inconsistent, or scratch memory cannot be
    /// allocated. Nothing is written to `output` unless all checks pass.
    pub fn compute(
        &mut self,
        input: &BufferArg,
        filter: &BufferArg,
        output: &mut BufferArgMut,
    ) -> Result<(), OpError> {
        output.require_assign()?;
        let expected = infer_conv_output_shape(input.shape(), filter.shape(), &self.config)?;
        if output.shape() != &expected {
            return Err(ShapeError::mismatch(
                "convolution output shape",
                expected.dims(),
                output.shape().dims(),
            )
            .into());
        }

        let dims = ConvDims::new(input.shape(), filter.shape(), &expected, self.config);
        let input = input.f32_data()?;
        let filter = filter.f32_data()?;
        let output = output.f32_data_mut()?;
        let col_len = dims.geometry().col_len();

        match self.strategy {
            ExecutionStrategy::Serial => {
                let col = self.scratch.ensure_capacity(col_len)?;
                for (image, out) in input
                    .chunks_exact(dims.image_len())
                    .zip(output.chunks_exact_mut(dims.output_len()))
                {
                    conv_image(&self.im2col, &self.gemm, &dims, image, filter, col, out)?;
                }
            }
            ExecutionStrategy::ParallelBatch => {
                let (im2col, gemm) = (&self.im2col, &self.gemm);
                let alloc = B::Allocator::default();
                input
                    .par_chunks_exact(dims.image_len())
                    .zip(output.par_chunks_exact_mut(dims.output_len()))
                    .try_for_each_init(
                        || ScratchBuffer::<f32, B::Allocator>::new(alloc.clone()),
                        |scratch, (image, out)| -> Result<(), OpError> {
                            let col = scratch.ensure_capacity(col_len)?;
                            conv_image(im2col, gemm, &dims, image, filter, col, out)?;
                            Ok(())
                        },
                    )?;
            }
        }
        Ok(())
    }
}

impl<B: ConvBackend> Function for GemmConvFunction<B> {
    fn name(&self) -> &'static str {
        GEMM_CONV
    }

    fn init(&mut self, config: &FuncConfig) -> Result<(), OpError> {
        self.config = ConvConfig::from_func_config(config)?;
        self.strategy = if config.get_bool_or("parallel", false)? {
            ExecutionStrategy::ParallelBatch
        } else {
            ExecutionStrategy::Serial
        };
        log::debug!(
            "{GEMM_CONV} on {}: {:?}, {:?}",
            B::DEVICE,
            self.config,
            self.strategy
        );
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
        Ok(vec![infer_conv_output_shape(
            &inputs[0],
            &inputs[1],
            &self.config,
        )?])
    }

    fn check(&self, inputs: &[BufferArg], outputs: &[BufferArgMut]) -> Result<(), OpError> {
        check_arg_counts(inputs.len(), outputs.len(), 2, 1)?;
        outputs[0].require_assign()?;
        let expected = infer_conv_output_shape(inputs[0].shape(), inputs[1].shape(), &self.config)?;
        if outputs[0].shape() != &expected {
            return Err(ShapeError::mismatch(
                "convolution output shape",
                expected.dims(),
                outputs[0].shape().dims(),
            )
            .into());
        }
        Ok(())
    }

    fn calc(&mut self, inputs: &[BufferArg], outputs: &mut [BufferArgMut]) -> Result<(), OpError> {
        check_arg_counts(inputs.len(), outputs.len(), 2, 1)?;
        self.compute(&inputs[0], &inputs[1], &mut outputs[0])
    }
}

/// Convolves `input` with `filter` on the CPU and returns a freshly allocated output.
///
/// # Errors
///
/// Returns an error if the shapes are inconsistent with `config`.
///
/// # Example
///
/// ```
/// use tessera_ops::{conv2d, ConvConfig};
/// use tessera_tensor::{CpuAllocator, Tensor};
///
/// let input = Tensor::<f32, 4, _>::from_shape_val([1, 1, 4, 4], 1.0, CpuAllocator).unwrap();
/// let filter = Tensor::<f32, 4, _>::from_shape_val([1, 1, 2, 2], 1.0, CpuAllocator).unwrap();
/// let config = ConvConfig::new([1, 1], [1, 1], 1).unwrap();
///
/// let output = conv2d(&input, &filter, config).unwrap();
/// assert_eq!(output.shape, [1, 1, 5, 5]);
/// assert_eq!(output.get([0, 0, 0, 0]), Some(&1.0));
/// assert_eq!(output.get([0, 0, 2, 2]), Some(&4.0));
/// ```
pub fn conv2d<A1: TensorAllocator, A2: TensorAllocator>(
    input: &Tensor<f32, 4, A1>,
    filter: &Tensor<f32, 4, A2>,
    config: ConvConfig,
) -> Result<Tensor<f32, 4, CpuAllocator>, OpError> {
    let input = BufferArg::from(input);
    let filter = BufferArg::from(filter);
    let shape = infer_conv_output_shape(input.shape(), filter.shape(), &config)?;
    let mut output = Tensor::<f32, 4, _>::zeros(shape.to_array::<4>("output")?, CpuAllocator)?;

    GemmConvFunction::<CpuBackend>::new(config).compute(
        &input,
        &filter,
        &mut BufferArgMut::assign_to(&mut output),
    )?;
    Ok(output)
}
