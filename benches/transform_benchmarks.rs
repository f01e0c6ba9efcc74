//! Input pipeline benchmarks
//!
//! Benchmarks for the per-record hot path:
//! - Full normalization (crop, cbrt, standardize, binarize)
//! - Standardization alone (trueno reductions)
//! - Batch assembly from a decoded dataset
//! - Parquet record directory loading

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use discharge_net::pipeline::{Dataset, InputPipeline};
use discharge_net::record::{ExampleRecord, SIGNAL_LEN};
use discharge_net::storage::write_records;
use discharge_net::transform::{binarize, crop, standardize, NormalizedSample};

/// Deterministic pseudo-spectrogram record
#[allow(clippy::cast_precision_loss)]
fn create_test_record(signal_id: i64) -> ExampleRecord {
    let signal = (0..SIGNAL_LEN)
        .map(|i| ((i as i64 * 7919 + signal_id * 104_729) % 1000) as f32 / 10.0)
        .collect();
    ExampleRecord::new(signal, signal_id, signal_id / 3, Some(signal_id % 2)).unwrap()
}

/// Benchmark the full record → sample transform
fn bench_normalize_record(c: &mut Criterion) {
    let record = create_test_record(1);

    c.bench_function("normalize_record", |b| {
        b.iter(|| {
            let sample = NormalizedSample::from_record(black_box(&record));
            black_box(sample);
        });
    });
}

/// Benchmark standardization and binarization separately
fn bench_transform_stages(c: &mut Criterion) {
    let record = create_test_record(2);
    let cropped = crop(record.signal()).to_vec();
    let mut group = c.benchmark_group("transform_stages");

    group.bench_function("standardize", |b| {
        b.iter(|| {
            let mut values = cropped.clone();
            standardize(black_box(&mut values));
            black_box(values);
        });
    });

    group.bench_function("binarize", |b| {
        b.iter(|| {
            let bw = binarize(black_box(&cropped));
            black_box(bw);
        });
    });

    group.finish();
}

/// Benchmark assembling one pass of batches (normalization included)
fn bench_batch_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_assembly");
    let records: Vec<ExampleRecord> = (0..80).map(create_test_record).collect();

    for batch_size in [10, 40, 80].iter() {
        let dataset = Dataset::from_records(records.clone(), *batch_size).unwrap();
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, _| {
                b.iter(|| {
                    let batches: Vec<_> = dataset.batches().collect();
                    black_box(batches);
                });
            },
        );
    }

    group.finish();
}

/// Benchmark decoding a record directory
fn bench_directory_loading(c: &mut Criterion) {
    let mut group = c.benchmark_group("directory_loading");

    for rows in [16, 64].iter() {
        let dir = std::env::temp_dir().join(format!("discharge_net_bench_{rows}"));
        std::fs::create_dir_all(&dir).unwrap();
        let records: Vec<ExampleRecord> = (0..*rows).map(create_test_record).collect();
        write_records(dir.join("records.parquet"), &records).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(rows), rows, |b, _| {
            b.iter(|| {
                let dataset = InputPipeline::new(&dir, 40).build().unwrap();
                black_box(dataset);
            });
        });

        // Clean up
        std::fs::remove_dir_all(&dir).ok();
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_normalize_record,
    bench_transform_stages,
    bench_batch_assembly,
    bench_directory_loading
);
criterion_main!(benches);
