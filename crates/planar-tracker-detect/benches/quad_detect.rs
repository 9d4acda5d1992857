use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use planar_tracker_core::{GrayImage, Rect};
use planar_tracker_detect::{QuadDetector, QuadDetectorParams};

const SIZES: [(usize, usize); 2] = [(640, 480), (1280, 720)];

/// Bright sheet covering roughly the middle third of the frame.
fn synthetic_frame(width: usize, height: usize) -> GrayImage {
    let mut img = GrayImage::filled(width, height, 40);
    let (x0, x1) = (width / 3, 2 * width / 3);
    let (y0, y1) = (height / 4, 3 * height / 4);
    for y in y0..y1 {
        let skew = (y - y0) / 12;
        for x in x0 + skew..x1 + skew {
            img.set(x, y, 215);
        }
    }
    img
}

fn bench_detect(c: &mut Criterion) {
    let detector = QuadDetector::new(QuadDetectorParams::default()).expect("default params");
    let mut group = c.benchmark_group("quad_detect");
    for &(width, height) in SIZES.iter() {
        let frame = synthetic_frame(width, height);
        let label = format!("{width}x{height}");

        group.bench_with_input(BenchmarkId::new("full_frame", &label), &frame, |b, f| {
            b.iter(|| detector.detect_gray(black_box(&f.view()), Rect::full(width, height)))
        });

        let roi = Rect::new(
            (width / 3) as i32 - 40,
            (height / 4) as i32 - 40,
            (width / 3 + height / 24) as i32 + 80,
            (height / 2) as i32 + 80,
        );
        group.bench_with_input(BenchmarkId::new("tracked_roi", &label), &frame, |b, f| {
            b.iter(|| detector.detect_gray(black_box(&f.view()), roi))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_detect);
criterion_main!(benches);
