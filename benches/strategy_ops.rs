//! Payload preparation benchmark suite
//!
//! Benchmarks for the work done before a ledger write:
//! - Direct strategy base64 encoding at various payload sizes
//! - Decoding back to raw bytes
//! - Content id hashing used by the filesystem content store

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ledger_payload_bench::generate::payload_bytes;
use ledger_payload_bench::store::fs::content_id;
use ledger_payload_bench::strategy::DirectStrategy;

/// Benchmark direct strategy encode/decode at various sizes
fn bench_direct_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("direct_encoding");

    let sizes = vec![
        (100 * 1024, "100KB"),
        (1024 * 1024, "1MB"),
        (10 * 1024 * 1024, "10MB"),
    ];

    for (size, label) in sizes {
        let data = payload_bytes(size as u64, 42);
        let encoded = DirectStrategy::encode(&data).unwrap();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("encode", label), &data, |bencher, data| {
            bencher.iter(|| black_box(DirectStrategy::encode(black_box(data)).unwrap()))
        });

        group.bench_with_input(BenchmarkId::new("decode", label), &encoded, |bencher, encoded| {
            bencher.iter(|| black_box(DirectStrategy::decode(black_box(encoded)).unwrap()))
        });
    }

    group.finish();
}

/// Benchmark content id derivation for the reference strategy
fn bench_content_id(c: &mut Criterion) {
    let mut group = c.benchmark_group("content_id");
    group.sample_size(20);

    for (size, label) in [(100 * 1024, "100KB"), (10 * 1024 * 1024, "10MB")] {
        let data = payload_bytes(size as u64, 7);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("sha256", label), &data, |bencher, data| {
            bencher.iter(|| black_box(content_id(black_box(data))))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_direct_encoding, bench_content_id);
criterion_main!(benches);
