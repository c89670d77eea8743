use bigimage::{
    DiskReader, Extent, IndexKind, IndexMethod, PyramidStore, Rgb8, SpatialIndex, StoreConfig,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

// Benchmark index position calculation
fn bench_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("index");
    group.measurement_time(Duration::from_secs(5));
    let extent = Extent::new(1 << 20, 1 << 20).unwrap();

    for kind in [IndexKind::ZOrder, IndexKind::ZOrderIntuition] {
        let index = IndexMethod::new(kind, extent).unwrap();
        group.bench_with_input(BenchmarkId::new("position", index.name()), &index, |b, index| {
            b.iter(|| black_box(index.position(black_box(0x5A5A5), black_box(0xA5A5A))))
        });
        group.bench_with_input(BenchmarkId::new("origin", index.name()), &index, |b, index| {
            b.iter(|| black_box(index.origin(black_box(0x1234_5678_9ABC))))
        });
    }

    let block = IndexMethod::new(
        IndexKind::Block2D {
            row_shift: 8,
            col_shift: 8,
        },
        extent,
    )
    .unwrap();
    group.bench_function("position/Block2DIndex", |b| {
        b.iter(|| black_box(block.position(black_box(0x5A5A5), black_box(0xA5A5A))))
    });

    group.finish();
}

fn gradient_store(size: u64, config: StoreConfig) -> PyramidStore<Rgb8> {
    let mut store = PyramidStore::new(size, size, config).unwrap();
    for row in 0..size {
        for col in 0..size {
            store
                .set_pixel(row, col, Rgb8::new(row as u8, col as u8, (row ^ col) as u8))
                .unwrap();
        }
    }
    store
}

// Benchmark pyramid writes with different group widths
fn bench_pyramid_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("pyramid_write");
    group.sample_size(10);
    let temp_dir = tempfile::tempdir().expect("Failed to create temporary directory");
    let config = StoreConfig::default()
        .with_node_bytes(64 * 1024 * 3)
        .with_min_size(16, 16)
        .with_thumbnail(false);

    for ways in [1usize, 2, 8] {
        let mut store = gradient_store(1024, config.clone());
        store.set_concurrent_levels(ways);
        let header = temp_dir.path().join(format!("w{}.bigimage", ways));
        group.bench_with_input(BenchmarkId::from_parameter(ways), &ways, |b, _| {
            b.iter(|| store.write(&header).unwrap())
        });
    }

    group.finish();
}

// Benchmark random range reads through the node cache
fn bench_range_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_read");
    let temp_dir = tempfile::tempdir().expect("Failed to create temporary directory");
    let header = temp_dir.path().join("read.bigimage");
    let config = StoreConfig::default()
        .with_node_bytes(16 * 1024 * 3)
        .with_min_size(64, 64)
        .with_thumbnail(false);
    gradient_store(2048, config).write(&header).unwrap();

    for (size, cache) in [(64u64, 4usize), (256, 4), (256, 64)] {
        let mut reader = DiskReader::<Rgb8>::open_with_cache(&header, cache).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        group.bench_function(BenchmarkId::new(format!("{}px", size), cache), |b| {
            b.iter(|| {
                let row = rng.gen_range(0..2048 - size);
                let col = rng.gen_range(0..2048 - size);
                black_box(reader.get_range(0, row, col, size, size).unwrap())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_index, bench_pyramid_write, bench_range_read);
criterion_main!(benches);
