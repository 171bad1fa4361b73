use criterion::{criterion_group, criterion_main, Criterion};
use rastro::{AccessMode, CacheConfig, Context, PixelType, ResamplePolicy, Window};

const SIZE: (usize, usize) = (2048, 2048);
const WINDOW: Window = Window {
    x_off: 128,
    y_off: 128,
    width: 1024,
    height: 1024,
};

fn context_with_dataset() -> Context {
    let context = Context::with_default_drivers(CacheConfig::default().with_max_bytes(256 << 20));
    let dataset = context
        .create(
            "MEM",
            "MEM:bench",
            SIZE,
            3,
            PixelType::U16,
            &[
                ("BLOCKXSIZE".to_string(), "256".to_string()),
                ("BLOCKYSIZE".to_string(), "256".to_string()),
            ],
        )
        .unwrap();
    let data: Vec<u16> = (0..SIZE.0 * 64).map(|i| (i % 65536) as u16).collect();
    for band in dataset.bands() {
        for row in (0..SIZE.1).step_by(64) {
            band.write_window(Window::new(0, row, SIZE.0, 64), &data)
                .unwrap();
        }
    }
    dataset.close().unwrap();
    context
}

fn bench_read_window(c: &mut Criterion) {
    let context = context_with_dataset();
    let dataset = context.open("MEM:bench", AccessMode::ReadOnly).unwrap();
    c.bench_function("read_window_cached", |b| {
        b.iter(|| {
            dataset
                .read_window::<u16>(&[0, 1, 2], WINDOW, WINDOW.shape(), ResamplePolicy::Nearest)
                .unwrap()
        })
    });
}

fn bench_read_window_decimated(c: &mut Criterion) {
    let context = context_with_dataset();
    let dataset = context.open("MEM:bench", AccessMode::ReadOnly).unwrap();
    c.bench_function("read_window_decimated", |b| {
        b.iter(|| {
            dataset
                .read_window::<u16>(&[0, 1, 2], WINDOW, (256, 256), ResamplePolicy::Average)
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_read_window, bench_read_window_decimated);
criterion_main!(benches);
