use approx::assert_relative_eq;
use rand::Rng;

use tessera_ops::{
    conv2d, ArgType, BufferArg, BufferArgMut, ContractViolation, ConvConfig, CpuBackend,
    ExecutionStrategy, Function, GemmConvFunction, OpError, ReferenceCpuBackend, ShapeError,
};
use tessera_tensor::{CpuAllocator, Tensor};

type Result<T = ()> = std::result::Result<T, Box<dyn std::error::Error>>;

fn random_tensor(shape: [usize; 4]) -> Result<Tensor<f32, 4>> {
    let mut rng = rand::rng();
    let data = (0..shape.iter().product::<usize>())
        .map(|_| rng.random_range(-1.0..1.0))
        .collect();
    Ok(Tensor::from_shape_vec(shape, data, CpuAllocator)?)
}

/// Direct convolution, one output element at a time.
fn naive_conv(
    input: &Tensor<f32, 4>,
    filter: &Tensor<f32, 4>,
    stride: [usize; 2],
    padding: [usize; 2],
    groups: usize,
) -> Vec<f32> {
    let [n, c, h, w] = input.shape;
    let [m, cg, fh, fw] = filter.shape;
    let oh = (h + 2 * padding[0] - fh) / stride[0] + 1;
    let ow = (w + 2 * padding[1] - fw) / stride[1] + 1;
    let mg = m / groups;
    assert_eq!(cg * groups, c);

    let mut out = vec![0.0; n * m * oh * ow];
    for b in 0..n {
        for oc in 0..m {
            let g = oc / mg;
            for y in 0..oh {
                for x in 0..ow {
                    let mut sum = 0.0;
                    for ic in 0..cg {
                        for ky in 0..fh {
                            for kx in 0..fw {
                                let iy = (y * stride[0] + ky) as isize - padding[0] as isize;
                                let ix = (x * stride[1] + kx) as isize - padding[1] as isize;
                                if iy < 0 || ix < 0 || iy as usize >= h || ix as usize >= w {
                                    continue;
                                }
                                let v = input.get([b, g * cg + ic, iy as usize, ix as usize]);
                                let k = filter.get([oc, ic, ky, kx]);
                                if let (Some(v), Some(k)) = (v, k) {
                                    sum += v * k;
                                }
                            }
                        }
                    }
                    out[((b * m + oc) * oh + y) * ow + x] = sum;
                }
            }
        }
    }
    out
}

fn run(
    conv: &mut GemmConvFunction,
    input: &Tensor<f32, 4>,
    filter: &Tensor<f32, 4>,
    output_shape: [usize; 4],
) -> Result<Tensor<f32, 4>> {
    let mut output = Tensor::<f32, 4, _>::from_shape_val(output_shape, f32::NAN, CpuAllocator)?;
    conv.compute(
        &BufferArg::from(input),
        &BufferArg::from(filter),
        &mut BufferArgMut::assign_to(&mut output),
    )?;
    Ok(output)
}

#[test]
fn conv_ones_no_padding() -> Result {
    let input = Tensor::<f32, 4, _>::from_shape_val([1, 1, 4, 4], 1.0, CpuAllocator)?;
    let filter = Tensor::<f32, 4, _>::from_shape_val([1, 1, 2, 2], 1.0, CpuAllocator)?;
    let output = run(
        &mut GemmConvFunction::new(ConvConfig::default()),
        &input,
        &filter,
        [1, 1, 3, 3],
    )?;
    assert_eq!(output.as_slice(), &[4.0; 9]);
    Ok(())
}

#[test]
fn conv_ones_padding_one() -> Result {
    let input = Tensor::<f32, 4, _>::from_shape_val([1, 1, 4, 4], 1.0, CpuAllocator)?;
    let filter = Tensor::<f32, 4, _>::from_shape_val([1, 1, 2, 2], 1.0, CpuAllocator)?;
    let output = conv2d(&input, &filter, ConvConfig::new([1, 1], [1, 1], 1)?)?;
    assert_eq!(output.shape, [1, 1, 5, 5]);

    for y in 0..5 {
        for x in 0..5 {
            let border = [y == 0 || y == 4, x == 0 || x == 4];
            let expected = match border {
                [true, true] => 1.0,
                [true, false] | [false, true] => 2.0,
                [false, false] => 4.0,
            };
            assert_eq!(output.get([0, 0, y, x]), Some(&expected), "at ({y}, {x})");
        }
    }
    Ok(())
}

#[test]
fn conv_single_dot_product() -> Result {
    let input = Tensor::<f32, 4, _>::from_shape_fn([1, 1, 3, 3], CpuAllocator, |[_, _, y, x]| {
        (y * 3 + x + 1) as f32
    })?;
    let filter = Tensor::<f32, 4, _>::from_shape_fn([1, 1, 3, 3], CpuAllocator, |[_, _, y, x]| {
        (9 - y * 3 - x) as f32
    })?;
    let output = conv2d(&input, &filter, ConvConfig::default())?;
    assert_eq!(output.shape, [1, 1, 1, 1]);
    // sum of i * (10 - i) for i in 1..=9
    assert_eq!(output.as_slice(), &[165.0]);
    Ok(())
}

#[test]
fn conv_matches_direct_convolution() -> Result {
    let cases = [
        // (input, filter, stride, padding, groups)
        ([2, 3, 7, 6], [4, 3, 3, 3], [1, 1], [0, 0], 1),
        ([1, 2, 8, 8], [3, 2, 3, 2], [2, 1], [1, 2], 1),
        ([3, 4, 5, 5], [6, 2, 3, 3], [2, 2], [1, 1], 2),
        ([1, 6, 9, 4], [6, 1, 1, 1], [1, 3], [0, 0], 6),
        ([2, 2, 3, 3], [2, 2, 2, 2], [1, 1], [4, 4], 1),
    ];
    for (input_shape, filter_shape, stride, padding, groups) in cases {
        let input = random_tensor(input_shape)?;
        let filter = random_tensor(filter_shape)?;
        let output = conv2d(&input, &filter, ConvConfig::new(stride, padding, groups)?)?;
        let expected = naive_conv(&input, &filter, stride, padding, groups);
        assert_eq!(output.numel(), expected.len());
        for (a, e) in output.as_slice().iter().zip(&expected) {
            assert_relative_eq!(a, e, epsilon = 1e-4);
        }
    }
    Ok(())
}

#[test]
fn conv_groups_equal_split_convolutions() -> Result {
    let (n, c, h, w, m) = (2, 4, 5, 5, 6);
    let input = random_tensor([n, c, h, w])?;
    let filter = random_tensor([m, c / 2, 3, 3])?;
    let config = ConvConfig::new([1, 1], [1, 1], 2)?;
    let grouped = conv2d(&input, &filter, config)?;

    let plane = h * w;
    let filter_half = filter.numel() / 2;
    let out_plane = grouped.shape[2] * grouped.shape[3];
    let single = ConvConfig::new([1, 1], [1, 1], 1)?;

    for g in 0..2 {
        let input_g = Tensor::<f32, 4, _>::from_shape_fn([n, c / 2, h, w], CpuAllocator, |[b, ch, y, x]| {
            input.as_slice()[(b * c + g * c / 2 + ch) * plane + y * w + x]
        })?;
        let filter_g = Tensor::<f32, 4, _>::from_shape_slice(
            [m / 2, c / 2, 3, 3],
            &filter.as_slice()[g * filter_half..(g + 1) * filter_half],
            CpuAllocator,
        )?;
        let out_g = conv2d(&input_g, &filter_g, single)?;

        for b in 0..n {
            let grouped_slice =
                &grouped.as_slice()[(b * m + g * m / 2) * out_plane..(b * m + (g + 1) * m / 2) * out_plane];
            let split_slice = &out_g.as_slice()[b * (m / 2) * out_plane..(b + 1) * (m / 2) * out_plane];
            for (a, e) in grouped_slice.iter().zip(split_slice) {
                assert_relative_eq!(a, e, epsilon = 1e-6);
            }
        }
    }
    Ok(())
}

#[test]
fn conv_is_idempotent_and_reuses_scratch() -> Result {
    let input = random_tensor([3, 2, 6, 6])?;
    let filter = random_tensor([4, 2, 3, 3])?;
    let config = ConvConfig::new([1, 1], [1, 1], 1)?;

    let mut conv: GemmConvFunction = GemmConvFunction::new(config);
    let first = run(&mut conv, &input, &filter, [3, 4, 6, 6])?;
    assert_eq!(conv.scratch().num_grows(), 1);
    let capacity = conv.scratch().capacity();
    assert_eq!(capacity, 2 * 3 * 3 * 6 * 6);

    let second = run(&mut conv, &input, &filter, [3, 4, 6, 6])?;
    assert_eq!(first.as_slice(), second.as_slice());
    assert_eq!(conv.scratch().num_grows(), 1);
    assert_eq!(conv.scratch().capacity(), capacity);

    let fresh = run(&mut GemmConvFunction::new(config), &input, &filter, [3, 4, 6, 6])?;
    assert_eq!(first.as_slice(), fresh.as_slice());
    Ok(())
}

#[test]
fn conv_scratch_grows_only_for_larger_requests() -> Result {
    let mut conv: GemmConvFunction = GemmConvFunction::new(ConvConfig::default());
    let filter = random_tensor([1, 1, 2, 2])?;

    run(&mut conv, &random_tensor([1, 1, 8, 8])?, &filter, [1, 1, 7, 7])?;
    assert_eq!(conv.scratch().capacity(), 4 * 49);

    // a smaller image fits in the existing buffer
    let small = random_tensor([1, 1, 4, 4])?;
    let out = run(&mut conv, &small, &filter, [1, 1, 3, 3])?;
    assert_eq!(conv.scratch().capacity(), 4 * 49);
    assert_eq!(conv.scratch().num_grows(), 1);
    assert_eq!(out.as_slice(), conv2d(&small, &filter, ConvConfig::default())?.as_slice());
    Ok(())
}

#[test]
fn conv_depthwise_many_groups() -> Result {
    let groups = 512;
    let input = random_tensor([1, groups, 4, 4])?;
    let filter = random_tensor([groups, 1, 3, 3])?;
    let config = ConvConfig::new([1, 1], [1, 1], groups)?;

    let output = conv2d(&input, &filter, config)?;
    assert_eq!(output.shape, [1, groups, 4, 4]);
    let expected = naive_conv(&input, &filter, [1, 1], [1, 1], groups);
    for (a, e) in output.as_slice().iter().zip(&expected) {
        assert_relative_eq!(a, e, epsilon = 1e-5);
    }
    Ok(())
}

#[test]
fn conv_parallel_matches_serial() -> Result {
    let input = random_tensor([8, 4, 9, 9])?;
    let filter = random_tensor([6, 2, 3, 3])?;
    let config = ConvConfig::new([2, 1], [1, 0], 2)?;
    let shape = [8, 6, 5, 7];

    let serial = run(&mut GemmConvFunction::new(config), &input, &filter, shape)?;
    let mut parallel_conv =
        GemmConvFunction::<CpuBackend>::new(config).with_strategy(ExecutionStrategy::ParallelBatch);
    let parallel = run(&mut parallel_conv, &input, &filter, shape)?;

    assert_eq!(serial.as_slice(), parallel.as_slice());
    // the kernel-owned buffer is untouched by the parallel strategy
    assert_eq!(parallel_conv.scratch().capacity(), 0);
    Ok(())
}

#[test]
fn conv_reference_backend_agrees() -> Result {
    let input = random_tensor([2, 3, 6, 5])?;
    let filter = random_tensor([5, 3, 2, 3])?;
    let config = ConvConfig::new([1, 2], [1, 1], 1)?;
    let expected = conv2d(&input, &filter, config)?;

    let mut reference = GemmConvFunction::<ReferenceCpuBackend>::new(config);
    let mut output = Tensor::<f32, 4, _>::zeros(expected.shape, CpuAllocator)?;
    reference.calc(
        &[BufferArg::from(&input), BufferArg::from(&filter)],
        &mut [BufferArgMut::assign_to(&mut output)],
    )?;
    for (a, e) in output.as_slice().iter().zip(expected.as_slice()) {
        assert_relative_eq!(a, e, epsilon = 1e-5);
    }
    Ok(())
}

#[test]
fn conv_empty_batch() -> Result {
    let input = Tensor::<f32, 4, _>::zeros([0, 2, 5, 5], CpuAllocator)?;
    let filter = random_tensor([3, 2, 3, 3])?;
    let output = conv2d(&input, &filter, ConvConfig::default())?;
    assert_eq!(output.shape, [0, 3, 3, 3]);
    assert_eq!(output.numel(), 0);
    Ok(())
}

#[test]
fn conv_rejects_bad_arguments_without_writing() -> Result {
    let input = random_tensor([1, 2, 4, 4])?;
    let filter = random_tensor([2, 2, 3, 3])?;
    let mut conv: GemmConvFunction = GemmConvFunction::new(ConvConfig::default());

    let mut output = Tensor::<f32, 4, _>::from_shape_val([1, 2, 2, 2], f32::NAN, CpuAllocator)?;
    let err = conv.compute(
        &BufferArg::from(&input),
        &BufferArg::from(&filter),
        &mut BufferArgMut::add_to(&mut output),
    );
    assert_eq!(
        err,
        Err(OpError::Contract(ContractViolation::ArgType {
            expected: ArgType::AssignTo,
            actual: ArgType::AddTo,
        }))
    );

    let mut wrong = Tensor::<f32, 4, _>::from_shape_val([1, 2, 3, 3], f32::NAN, CpuAllocator)?;
    let err = conv.compute(
        &BufferArg::from(&input),
        &BufferArg::from(&filter),
        &mut BufferArgMut::assign_to(&mut wrong),
    );
    assert!(matches!(err, Err(OpError::Shape(ShapeError::Mismatch { .. }))));
    assert!(wrong.as_slice().iter().all(|v| v.is_nan()));

    let inputs = [BufferArg::from(&input)];
    let mut outputs = [BufferArgMut::assign_to(&mut output)];
    assert!(matches!(
        conv.calc(&inputs, &mut outputs),
        Err(OpError::Contract(ContractViolation::ArgumentCount { kind: "inputs", .. }))
    ));

    let labels = [0i32; 16];
    let inputs = [
        BufferArg::from_i32([1, 1, 4, 4], &labels)?,
        BufferArg::from(&filter),
    ];
    let mut out_data = [0.0; 8];
    let mut outputs = [BufferArgMut::from_f32([1, 2, 2, 2], &mut out_data, ArgType::AssignTo)?];
    assert!(matches!(
        conv.calc(&inputs, &mut outputs),
        Err(OpError::Shape(ShapeError::FilterChannelMismatch { .. }))
    ));
    Ok(())
}

#[test]
fn conv_huge_padding_is_an_error() -> Result {
    let input = Tensor::<f32, 4, _>::from_shape_val([1, 1, 4, 4], 1.0, CpuAllocator)?;
    let filter = Tensor::<f32, 4, _>::from_shape_val([1, 1, 2, 2], 1.0, CpuAllocator)?;

    for padding in [1 << 40, usize::MAX / 2 + 1] {
        let config = ConvConfig::new([1, 1], [padding, padding], 1)?;
        assert!(matches!(
            conv2d(&input, &filter, config),
            Err(OpError::Shape(
                ShapeError::TooLarge { .. } | ShapeError::NonPositiveOutput { .. }
            ))
        ));

        let mut conv = GemmConvFunction::<CpuBackend>::new(config);
        let mut output = Tensor::<f32, 4, _>::zeros([1, 1, 5, 5], CpuAllocator)?;
        assert!(matches!(
            conv.compute(
                &BufferArg::from(&input),
                &BufferArg::from(&filter),
                &mut BufferArgMut::assign_to(&mut output),
            ),
            Err(OpError::Shape(_))
        ));
    }
    Ok(())
}
