//! Benchmarks for the CPU-bound pipeline stages
//!
//! Mask resolution and compositing dominate per-request CPU time once the
//! model is warm, so they are measured in isolation over synthetic data.

use bg_matte::{
    AlphaMask, CanonicalImage, Compositor, ImagePreprocessor, OutputMode, Preprocessor,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array4;

fn synthetic_image(width: u32, height: u32) -> CanonicalImage {
    let rgba = image::RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([x as u8, y as u8, (x ^ y) as u8, 255])
    });
    CanonicalImage::from_dynamic(&image::DynamicImage::ImageRgba8(rgba))
}

/// Radial logit field like a segmentation model would emit
fn synthetic_logits(size: usize) -> Array4<f32> {
    let center = (size as f32 - 1.0) / 2.0;
    let radius = size as f32 / 3.0;
    Array4::from_shape_fn((1, 1, size, size), |(_, _, y, x)| {
        let dy = y as f32 - center;
        let dx = x as f32 - center;
        radius - (dx * dx + dy * dy).sqrt()
    })
}

fn bench_mask_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("mask_resolution");
    let logits = synthetic_logits(512);

    for target in [512u32, 1024, 2048] {
        group.bench_with_input(BenchmarkId::from_parameter(target), &target, |b, &t| {
            b.iter(|| AlphaMask::resolve(black_box(&logits), (t, t)).unwrap());
        });
    }
    group.finish();
}

fn bench_preprocessing(c: &mut Criterion) {
    let image = synthetic_image(1920, 1080);
    let preprocessor = Preprocessor {
        target_size: [1024, 1024],
        normalization_mean: [0.5, 0.5, 0.5],
        normalization_std: [1.0, 1.0, 1.0],
    };

    c.bench_function("preprocess_1080p_to_1024", |b| {
        b.iter(|| ImagePreprocessor::to_tensor(black_box(&image), &preprocessor).unwrap());
    });
}

fn bench_compositing(c: &mut Criterion) {
    let mut group = c.benchmark_group("compositing");
    let image = synthetic_image(1024, 1024);
    let logits = synthetic_logits(512);
    let mask = AlphaMask::resolve(&logits, (1024, 1024)).unwrap();

    for mode in [OutputMode::Foreground, OutputMode::Background] {
        group.bench_with_input(BenchmarkId::from_parameter(mode), &mode, |b, &m| {
            b.iter(|| Compositor::composite(black_box(&image), &mask, m, 90).unwrap());
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_mask_resolution,
    bench_preprocessing,
    bench_compositing
);
criterion_main!(benches);
