//! Criterion benchmarks for the per-frame work outside the models.
//!
//! Run with:
//!   cargo bench -p wmscope
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use wmscope::physics::{CartPoleRenderer, Frame, PhysicalState, Renderer};
use wmscope::tensor::{frame_to_tensor, image_to_planar, planar_to_image};

fn posed() -> PhysicalState {
    PhysicalState {
        x: 0.7,
        x_dot: 0.0,
        theta: 0.3,
        theta_dot: 0.0,
    }
}

/// RGBA8 <-> planar conversion at a few frame sizes.
fn bench_conversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("planar");
    let renderer = CartPoleRenderer::default();

    for size in [64usize, 96, 192].iter() {
        group.throughput(Throughput::Elements((size * size) as u64));
        let frame = renderer.render(&posed(), *size, *size);

        group.bench_with_input(BenchmarkId::new("to_planar", size), &frame, |b, frame| {
            b.iter(|| black_box(image_to_planar(black_box(frame))));
        });

        let planar = image_to_planar(&frame);
        group.bench_with_input(BenchmarkId::new("to_image", size), &planar, |b, planar| {
            let mut out = Frame::new(*size, *size);
            b.iter(|| {
                planar_to_image(black_box(planar), &mut out).unwrap();
                black_box(&out);
            });
        });
    }

    group.finish();
}

/// Ground-truth rendering with different supersampling factors.
fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");

    for ss in [1usize, 2, 4].iter() {
        let renderer = CartPoleRenderer {
            supersample: *ss,
            ..CartPoleRenderer::default()
        };
        group.bench_with_input(BenchmarkId::new("supersample", ss), ss, |b, _| {
            let mut frame = Frame::new(96, 96);
            b.iter(|| {
                renderer.render_into(black_box(&posed()), &mut frame);
                black_box(&frame);
            });
        });
    }

    group.bench_function("render_and_tensor_96", |b| {
        let renderer = CartPoleRenderer::default();
        b.iter(|| {
            let frame = renderer.render(black_box(&posed()), 96, 96);
            black_box(frame_to_tensor(&frame))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_conversion, bench_render);
criterion_main!(benches);
