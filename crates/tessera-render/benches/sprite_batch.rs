//! Benchmarks for sprite batch submission and flushing

use std::rc::Rc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tessera_core::geometry::Rect;
use tessera_core::math::Vec2;
use tessera_render::{Color, Gradient, Poly2, SpriteBatch, SpriteBatchDescriptor};
use tessera_test_utils::MockRenderDevice;

fn setup() -> (Rc<MockRenderDevice>, SpriteBatch) {
    let device = Rc::new(MockRenderDevice::new());
    let mut batch = SpriteBatch::new(device.clone(), SpriteBatchDescriptor::default())
        .expect("Failed to create sprite batch");
    batch.set_viewport(1920.0, 1080.0);
    (device, batch)
}

fn grid(count: usize) -> Vec<Rect<f32>> {
    (0..count)
        .map(|i| Rect::new((i % 100) as f32 * 10.0, (i / 100) as f32 * 10.0, 8.0, 8.0))
        .collect()
}

fn bench_fill_rects(c: &mut Criterion) {
    let (device, mut batch) = setup();
    let mut group = c.benchmark_group("fill_rects");

    for count in [100, 1_000, 10_000] {
        let rects = grid(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &rects, |b, rects| {
            b.iter(|| {
                batch.begin().unwrap();
                for rect in rects {
                    batch.fill_rect(black_box(*rect)).unwrap();
                }
                batch.end().unwrap();
                device.clear_calls();
            });
        });
    }

    group.finish();
}

fn bench_state_changes(c: &mut Criterion) {
    let (device, mut batch) = setup();
    let mut group = c.benchmark_group("state_changes");
    let rects = grid(1_000);
    let gradients = [
        Gradient::linear(Vec2::ZERO, Vec2::Y, Color::RED, Color::BLUE),
        Gradient::radial_simple(Vec2::splat(0.5), 0.5, Color::WHITE, Color::BLACK),
    ];

    // A gradient switch on every shape: one context and one uniform block each.
    group.bench_function("gradient_per_shape", |b| {
        b.iter(|| {
            batch.begin().unwrap();
            for (i, rect) in rects.iter().enumerate() {
                batch.set_gradient(Some(&gradients[i % 2]));
                batch.fill_rect(*rect).unwrap();
            }
            batch.set_gradient(None);
            batch.end().unwrap();
            device.clear_calls();
        });
    });

    group.bench_function("color_per_shape", |b| {
        b.iter(|| {
            batch.begin().unwrap();
            for (i, rect) in rects.iter().enumerate() {
                let shade = (i % 255) as u8;
                batch.set_color(Color::from_rgb_u8(shade, shade, 255));
                batch.fill_rect(*rect).unwrap();
            }
            batch.end().unwrap();
            device.clear_calls();
        });
    });

    group.finish();
}

fn bench_large_poly(c: &mut Criterion) {
    let (device, mut batch) = setup();
    let mut group = c.benchmark_group("large_poly");

    for sides in [64, 1_024, 16_384] {
        let points: Vec<Vec2> = (0..sides)
            .map(|i| Vec2::from_angle(i as f32 * std::f32::consts::TAU / sides as f32) * 400.0)
            .collect();
        let poly = Poly2::convex_fan(&points);
        group.bench_with_input(BenchmarkId::from_parameter(sides), &poly, |b, poly| {
            b.iter(|| {
                batch.begin().unwrap();
                batch.fill_poly(black_box(poly), Vec2::new(960.0, 540.0)).unwrap();
                batch.end().unwrap();
                device.clear_calls();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fill_rects, bench_state_changes, bench_large_poly);
criterion_main!(benches);
