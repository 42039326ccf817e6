//! Benchmarks for histogram thresholding

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use geoclaim_algorithms::threshold::{otsu_mask, otsu_threshold};
use geoclaim_core::backend::{HistogramSummary, LocalBackend, RasterBackend, MAX_HISTOGRAM_BUCKETS};
use geoclaim_core::{Aoi, GeoTransform, Image, Raster};

fn bimodal_histogram(buckets: usize) -> HistogramSummary {
    let bucket_means = (0..buckets).map(|i| i as f64 / buckets as f64).collect();
    let counts = (0..buckets)
        .map(|i| {
            let low = (i as i64 - buckets as i64 / 4).unsigned_abs();
            let high = (i as i64 - 3 * buckets as i64 / 4).unsigned_abs();
            1000 / (1 + low.min(high))
        })
        .collect();
    HistogramSummary {
        bucket_means,
        counts,
    }
}

/// Change surface with a bright block in the upper-left quarter
fn create_delta(size: usize) -> Raster {
    let mut delta = Raster::filled(size, size, 0.0);
    delta.set_transform(GeoTransform::new(0.0, size as f64, 1.0, -1.0));
    for row in 0..size {
        for col in 0..size {
            let noise = ((row * 7 + col * 13) % 100) as f64 / 1000.0;
            let base = if row < size / 2 && col < size / 2 { 0.6 } else { 0.0 };
            delta.set(row, col, base + noise).unwrap();
        }
    }
    delta
}

fn bench_otsu_threshold(c: &mut Criterion) {
    let mut group = c.benchmark_group("otsu_threshold");

    for buckets in [64, 256, 1024].iter() {
        let histogram = bimodal_histogram(*buckets);

        group.bench_with_input(BenchmarkId::from_parameter(buckets), buckets, |b, _| {
            b.iter(|| otsu_threshold(black_box(&histogram), "delta").unwrap())
        });
    }

    group.finish();
}

fn bench_otsu_mask(c: &mut Criterion) {
    let mut group = c.benchmark_group("otsu_mask");

    for size in [128, 256, 512].iter() {
        let backend = LocalBackend::new()
            .with_meters_per_unit(1.0)
            .with_layer("bench", "delta", create_delta(*size));
        let aoi = Aoi::from_bbox([0.0, 0.0, *size as f64, *size as f64]).unwrap();
        let delta = Image::band("bench", "delta");

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let summary = backend
                    .histogram(black_box(&delta), &aoi, 1.0, MAX_HISTOGRAM_BUCKETS)
                    .unwrap();
                let mask = otsu_mask(&backend, &delta, &aoi, 1.0).unwrap();
                (summary, mask)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_otsu_threshold, bench_otsu_mask);
criterion_main!(benches);
