use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use tessera_tensor::{CpuAllocator, ScratchBuffer, TensorStorage};

fn bench_scratch(c: &mut Criterion) {
    let mut group = c.benchmark_group("scratch");

    for len in [1 << 10, 1 << 16, 1 << 20].iter() {
        group.bench_with_input(BenchmarkId::new("reused", len), len, |b, &len| {
            let mut scratch = ScratchBuffer::<f32, _>::new(CpuAllocator);
            b.iter(|| {
                let buf = scratch.ensure_capacity(len).unwrap();
                buf[len - 1] = 1.0;
                black_box(buf.len())
            })
        });

        group.bench_with_input(BenchmarkId::new("fresh", len), len, |b, &len| {
            b.iter(|| {
                let mut storage = TensorStorage::from_elem(len, 0.0f32, CpuAllocator).unwrap();
                storage.as_mut_slice()[len - 1] = 1.0;
                black_box(storage.len())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_scratch);
criterion_main!(benches);
