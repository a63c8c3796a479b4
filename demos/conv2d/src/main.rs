use argh::FromArgs;
use rand::Rng;
use std::path::PathBuf;
use std::time::Instant;

use tessera::ops::{registry, BufferArg, BufferArgMut, FuncConfig, TensorShape};
use tessera::tensor::{CpuAllocator, Device, Tensor};

#[derive(FromArgs)]
/// Run a grouped convolution through the function registry
struct Args {
    /// spatial size of the square input image
    #[argh(option, default = "32")]
    size: usize,

    /// number of input channels
    #[argh(option, default = "16")]
    channels: usize,

    /// number of filters (output channels)
    #[argh(option, default = "32")]
    filters: usize,

    /// square filter size
    #[argh(option, default = "3")]
    kernel: usize,

    /// stride along both axes
    #[argh(option, default = "1")]
    stride: usize,

    /// zero padding along both axes
    #[argh(option, default = "1")]
    padding: usize,

    /// number of channel groups
    #[argh(option, default = "1")]
    groups: usize,

    /// batch size
    #[argh(option, default = "4")]
    batch: usize,

    /// convolve the batch items in parallel
    #[argh(switch)]
    parallel: bool,

    /// JSON file with the function configuration, overriding the flags above
    #[argh(option)]
    config: Option<PathBuf>,
}

fn random_tensor(shape: [usize; 4]) -> Result<Tensor<f32, 4>, Box<dyn std::error::Error>> {
    let mut rng = rand::rng();
    let data = (0..shape.iter().product::<usize>())
        .map(|_| rng.random_range(-1.0..1.0))
        .collect();
    Ok(Tensor::from_shape_vec(shape, data, CpuAllocator)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => FuncConfig::new()
            .set("strides", [args.stride, args.stride])
            .set("paddings", [args.padding, args.padding])
            .set("groups", args.groups)
            .set("parallel", args.parallel),
    };
    log::info!("config: {}", serde_json::to_string(&config)?);

    // creation validates the configuration, groups included
    let mut conv = registry::global().create("GemmConv", Device::Cpu, &config)?;
    let groups = config.get_usize("groups")?;

    let input = random_tensor([args.batch, args.channels, args.size, args.size])?;
    let filter = random_tensor([args.filters, args.channels / groups, args.kernel, args.kernel])?;
    let shapes = conv.infer_shape(&[TensorShape::from(input.shape), TensorShape::from(filter.shape)])?;
    let output_shape = shapes[0].to_array::<4>("output")?;
    log::info!("input {:?} * filter {:?} -> output {:?}", input.shape, filter.shape, output_shape);

    let mut output = Tensor::<f32, 4, _>::zeros(output_shape, CpuAllocator)?;
    let now = Instant::now();
    conv.calc(
        &[BufferArg::from(&input), BufferArg::from(&filter)],
        &mut [BufferArgMut::assign_to(&mut output)],
    )?;
    let elapsed = now.elapsed();

    let checksum: f64 = output.as_slice().iter().map(|&v| v as f64).sum();
    log::info!("checksum {checksum:.6}, took {elapsed:?}");
    println!("output {output_shape:?} in {elapsed:?} (checksum {checksum:.6})");

    Ok(())
}
