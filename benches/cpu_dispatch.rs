//! Benchmarks for CPU kernel dispatch

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use zivc_rs::prelude::*;

fn scale(item: &WorkItem, (data, factor): (GlobalPtr<f32>, f32)) {
    let i = item.global_id(0) as usize;
    unsafe {
        *data.unsafe_index_mut(i) *= factor;
    }
}

fn setup(batch_size: usize) -> (Context, Device) {
    let options = ContextOptions::builder()
        .task_batch_size(batch_size)
        .build()
        .unwrap();
    let context = create_context(options).unwrap();
    let device = context.query_device(0).unwrap();
    (context, device)
}

fn bench_launch_overhead(c: &mut Criterion) {
    let (_context, device) = setup(32);
    let data = device.make_buffer::<f32>(BufferUsage::PreferHost).unwrap();
    data.set_size(1).unwrap();
    let mut kernel = device
        .create_kernel(KernelInit::<(Global<f32>, f32)>::new("scale", 1).cpu(scale))
        .unwrap();
    let options = LaunchOptions::new().work_size([1, 1, 1]);

    c.bench_function("launch_overhead", |b| {
        b.iter(|| kernel.run((&data, black_box(1.0)), &options).unwrap());
    });
}

fn bench_batch_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_size");
    let n = 1 << 20;

    for batch_size in [1, 8, 32, 128] {
        let (_context, device) = setup(batch_size);
        let data = device.make_buffer::<f32>(BufferUsage::PreferHost).unwrap();
        data.set_size(n).unwrap();
        let mut kernel = device
            .create_kernel(KernelInit::<(Global<f32>, f32)>::new("scale", 1).cpu(scale))
            .unwrap();
        let options = LaunchOptions::new().work_size([n as u32, 1, 1]);

        group.bench_with_input(BenchmarkId::from_parameter(batch_size), &batch_size, |b, _| {
            b.iter(|| kernel.run((&data, black_box(1.0001)), &options).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_launch_overhead, bench_batch_size);
criterion_main!(benches);
