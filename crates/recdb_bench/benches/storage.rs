//! Storage backend benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use recdb_bench::random_data;
use recdb_storage::{FileBackend, FileOptions, InMemoryBackend, StorageBackend};
use tempfile::TempDir;

fn temp_file(dir: &TempDir) -> FileBackend {
    FileBackend::open(&dir.path().join("bench.log"), &FileOptions::default().create(true)).unwrap()
}

/// Benchmark appends against both backends.
fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");

    for size in [64, 256, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("memory", size), size, |b, &size| {
            let mut backend = InMemoryBackend::new();
            let data = random_data(size);
            b.iter(|| {
                let offset = backend.append(black_box(&data)).unwrap();
                black_box(offset);
            });
        });
        group.bench_with_input(BenchmarkId::new("file", size), size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let mut backend = temp_file(&dir);
            let data = random_data(size);
            b.iter(|| {
                let offset = backend.append(black_box(&data)).unwrap();
                black_box(offset);
            });
        });
    }
    group.finish();
}

/// Benchmark reads from a file backend.
fn bench_file_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_read");

    for size in [64, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let mut backend = temp_file(&dir);
            let offset = backend.append(&random_data(size)).unwrap();
            backend.flush().unwrap();

            b.iter(|| {
                let result = backend.read_at(black_box(offset), black_box(size)).unwrap();
                black_box(result);
            });
        });
    }
    group.finish();
}

/// Benchmark sync after a write.
fn bench_sync(c: &mut Criterion) {
    c.bench_function("file_append_sync", |b| {
        let dir = TempDir::new().unwrap();
        let mut backend = temp_file(&dir);
        let data = random_data(256);
        b.iter(|| {
            backend.append(&data).unwrap();
            backend.sync().unwrap();
        });
    });
}

criterion_group!(benches, bench_append, bench_file_read, bench_sync);
criterion_main!(benches);
