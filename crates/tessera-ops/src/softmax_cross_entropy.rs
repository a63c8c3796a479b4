use crate::{
    arg::{BufferArg, BufferArgMut},
    config::FuncConfig,
    error::{OpError, ShapeError},
    function::{check_arg_counts, check_shape_count, Function},
    shape::TensorShape,
};

/// Registered name of the fused softmax and cross entropy loss.
pub const SOFTMAX_WITH_CROSS_ENTROPY: &str = "SoftmaxWithCrossEntropy";

/// Registered name of the logits gradient of [`SOFTMAX_WITH_CROSS_ENTROPY`].
pub const SOFTMAX_WITH_CROSS_ENTROPY_GRAD: &str = "SoftmaxWithCrossEntropyGrad";

/// Magnitude standing in for an infinite log probability.
pub const APPROX_INF: f32 = 1e20;

/// Maps `+inf` to [`APPROX_INF`] and `-inf` to `-APPROX_INF`; finite values pass through.
///
/// # Example
///
/// ```
/// use tessera_ops::softmax_cross_entropy::tolerable_value;
///
/// assert_eq!(tolerable_value(f32::NEG_INFINITY), -1e20);
/// assert_eq!(tolerable_value(-3.5), -3.5);
/// ```
#[inline]
pub fn tolerable_value(x: f32) -> f32 {
    if x == f32::INFINITY {
        APPROX_INF
    } else if x == f32::NEG_INFINITY {
        -APPROX_INF
    } else {
        x
    }
}

/// Row-wise softmax of a `rows x num_classes` matrix, subtracting the row maximum first.
///
/// PRECONDITION: `num_classes > 0`, `logits` and `softmax` have the same length, a
/// multiple of `num_classes`.
pub fn softmax(logits: &[f32], num_classes: usize, softmax: &mut [f32]) {
    for (src, dst) in logits
        .chunks_exact(num_classes)
        .zip(softmax.chunks_exact_mut(num_classes))
    {
        let max = src.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0;
        for (d, &s) in dst.iter_mut().zip(src) {
            *d = (s - max).exp();
            sum += *d;
        }
        dst.iter_mut().for_each(|d| *d /= sum);
    }
}

/// Checks that every label indexes a class, before anything is written.
fn check_labels(labels: &[i32], num_classes: usize) -> Result<(), ShapeError> {
    match labels
        .iter()
        .enumerate()
        .find(|&(_, &label)| usize::try_from(label).map_or(true, |l| l >= num_classes))
    {
        Some((row, &label)) => Err(ShapeError::LabelOutOfRange {
            row,
            label,
            num_classes,
        }),
        None => Ok(()),
    }
}

/// Splits a `[N, C]` logits shape and validates the matching `[N]` or `[N, 1]` labels.
fn logits_and_labels(logits: &TensorShape, labels: &TensorShape) -> Result<[usize; 2], ShapeError> {
    let [rows, num_classes] = logits.to_array::<2>("logits")?;
    if num_classes == 0 {
        return Err(ShapeError::EmptyDimension {
            name: "logits",
            shape: logits.dims().to_vec(),
        });
    }
    let valid = match labels.dims() {
        [n] => *n == rows,
        [n, 1] => *n == rows,
        _ => false,
    };
    if !valid {
        return Err(ShapeError::mismatch("labels shape", &[rows, 1], labels.dims()));
    }
    Ok([rows, num_classes])
}

fn require_shape(message: &str, expected: &[usize], actual: &TensorShape) -> Result<(), ShapeError> {
    if expected != actual.dims() {
        return Err(ShapeError::mismatch(message, expected, actual.dims()));
    }
    Ok(())
}

/// Softmax of the logits followed by the cross entropy against hard labels.
///
/// Inputs: logits `[N, C]` (float) and labels `[N]` or `[N, 1]` (int). Outputs: softmax
/// `[N, C]` and loss `[N, 1]` with `loss[i] = -ln(softmax[i, label[i]])`, where an infinite
/// log probability is clamped by [`tolerable_value`].
#[derive(Debug, Clone, Default)]
pub struct SoftmaxWithCrossEntropyFunction;

impl Function for SoftmaxWithCrossEntropyFunction {
    fn name(&self) -> &'static str {
        SOFTMAX_WITH_CROSS_ENTROPY
    }

    fn init(&mut self, _config: &FuncConfig) -> Result<(), OpError> {
        Ok(())
    }

    fn num_inputs(&self) -> usize {
        2
    }

    fn num_outputs(&self) -> usize {
        2
    }

    fn infer_shape(&self, inputs: &[TensorShape]) -> Result<Vec<TensorShape>, OpError> {
        check_shape_count(inputs, 2)?;
        let [rows, num_classes] = logits_and_labels(&inputs[0], &inputs[1])?;
        Ok(vec![
            TensorShape::from([rows, num_classes]),
            TensorShape::from([rows, 1]),
        ])
    }

    fn check(&self, inputs: &[BufferArg], outputs: &[BufferArgMut]) -> Result<(), OpError> {
        check_arg_counts(inputs.len(), outputs.len(), 2, 2)?;
        let [rows, num_classes] = logits_and_labels(inputs[0].shape(), inputs[1].shape())?;
        for output in outputs {
            output.require_assign()?;
        }
        require_shape("softmax shape", &[rows, num_classes], outputs[0].shape())?;
        require_shape("loss shape", &[rows, 1], outputs[1].shape())?;
        Ok(())
    }

    fn calc(&mut self, inputs: &[BufferArg], outputs: &mut [BufferArgMut]) -> Result<(), OpError> {
        self.check(inputs, outputs)?;
        let num_classes = inputs[0].shape()[1];
        let logits = inputs[0].f32_data()?;
        let labels = inputs[1].i32_data()?;
        check_labels(labels, num_classes)?;

        let (probs_out, loss_out) = outputs.split_at_mut(1);
        let probs = probs_out[0].f32_data_mut()?;
        let loss = loss_out[0].f32_data_mut()?;

        softmax(logits, num_classes, probs);
        for ((row, &label), l) in probs.chunks_exact(num_classes).zip(labels).zip(loss.iter_mut()) {
            *l = -tolerable_value(row[label as usize].ln());
        }
        Ok(())
    }
}

/// Gradient of [`SoftmaxWithCrossEntropyFunction`] with respect to the logits.
///
/// Inputs: softmax `[N, C]`, labels `[N]` or `[N, 1]` and the loss gradient `[N, 1]`.
/// Output: `d_logits[i, j] = (softmax[i, j] - [j == label[i]]) * d_loss[i]`.
#[derive(Debug, Clone, Default)]
pub struct SoftmaxWithCrossEntropyGradFunction;

impl Function for SoftmaxWithCrossEntropyGradFunction {
    fn name(&self) -> &'static str {
        SOFTMAX_WITH_CROSS_ENTROPY_GRAD
    }

    fn init(&mut self, _config: &FuncConfig) -> Result<(), OpError> {
        Ok(())
    }

    fn num_inputs(&self) -> usize {
        3
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn infer_shape(&self, inputs: &[TensorShape]) -> Result<Vec<TensorShape>, OpError> {
        check_shape_count(inputs, 3)?;
        let [rows, num_classes] = logits_and_labels(&inputs[0], &inputs[1])?;
        require_shape("loss gradient shape", &[rows, 1], &inputs[2])?;
        Ok(vec![TensorShape::from([rows, num_classes])])
    }

    fn check(&self, inputs: &[BufferArg], outputs: &[BufferArgMut]) -> Result<(), OpError> {
        check_arg_counts(inputs.len(), outputs.len(), 3, 1)?;
        let [rows, num_classes] = logits_and_labels(inputs[0].shape(), inputs[1].shape())?;
        require_shape("loss gradient shape", &[rows, 1], inputs[2].shape())?;
        outputs[0].require_assign()?;
        require_shape("logits gradient shape", &[rows, num_classes], outputs[0].shape())?;
        Ok(())
    }

    fn calc(&mut self, inputs: &[BufferArg], outputs: &mut [BufferArgMut]) -> Result<(), OpError> {
        self.check(inputs, outputs)?;
        let num_classes = inputs[0].shape()[1];
        let probs = inputs[0].f32_data()?;
        let labels = inputs[1].i32_data()?;
        let d_loss = inputs[2].f32_data()?;
        check_labels(labels, num_classes)?;

        let d_logits = outputs[0].f32_data_mut()?;
        for (((dst, src), &label), &scale) in d_logits
            .chunks_exact_mut(num_classes)
            .zip(probs.chunks_exact(num_classes))
            .zip(labels)
            .zip(d_loss)
        {
            for (j, (d, &p)) in dst.iter_mut().zip(src).enumerate() {
                let target = if j == label as usize { 1.0 } else { 0.0 };
                *d = (p - target) * scale;
            }
        }
        Ok(())
    }
}
