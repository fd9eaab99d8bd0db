//! Per-frame detector cost.
//!
//! Run with: cargo bench --bench detectors
//!
//! Both detectors run inline on the capture thread, so their cost comes out
//! of the frame period. These numbers show how much headroom is left at a
//! given resolution and rate.

use camwatch::capture::Frame;
use camwatch::detection::{
    BrightSpotDetector, DetectionConfig, Detector, Detectors, FlashDetector,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// Gray gradient with a small bright square, similar to a laser dot on a wall.
fn scene(width: u32, height: u32, channels: u8) -> Frame {
    let mut data = Vec::with_capacity((width * height) as usize * usize::from(channels));
    for y in 0..height {
        for x in 0..width {
            let spot = (100..104).contains(&x) && (100..104).contains(&y);
            let level = if spot { 255 } else { ((x + y) % 64) as u8 };
            data.extend(std::iter::repeat(level).take(usize::from(channels)));
        }
    }
    Frame::with_channels(data, width, height, channels, 0)
}

const RESOLUTIONS: [(u32, u32, &str); 2] = [(640, 480, "480p"), (1280, 720, "720p")];

fn bench_flash(c: &mut Criterion) {
    let mut group = c.benchmark_group("flash");
    for (width, height, name) in RESOLUTIONS {
        let frame = scene(width, height, 3);
        group.throughput(Throughput::Elements(u64::from(width * height)));
        group.bench_with_input(BenchmarkId::new("rgb", name), &frame, |b, frame| {
            let mut detector = FlashDetector::new(5.0);
            b.iter(|| black_box(detector.check(black_box(frame))));
        });
    }
    group.finish();
}

fn bench_bright_spot(c: &mut Criterion) {
    let mut group = c.benchmark_group("bright_spot");
    for (width, height, name) in RESOLUTIONS {
        for channels in [1u8, 3] {
            let frame = scene(width, height, channels);
            let label = if channels == 1 { "gray" } else { "rgb" };
            group.throughput(Throughput::Elements(u64::from(width * height)));
            group.bench_with_input(BenchmarkId::new(label, name), &frame, |b, frame| {
                let mut detector = BrightSpotDetector::new(20, 5, 50);
                detector.check(frame);
                b.iter(|| black_box(detector.check(black_box(frame))));
            });
        }
    }
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let frame = scene(640, 480, 3);
    let mut detectors = Detectors::new(&DetectionConfig::default());
    detectors.evaluate(&frame);
    c.bench_function("detectors/480p_rgb", |b| {
        b.iter(|| black_box(detectors.evaluate(black_box(&frame))))
    });
}

criterion_group!(benches, bench_flash, bench_bright_spot, bench_pipeline);
criterion_main!(benches);
