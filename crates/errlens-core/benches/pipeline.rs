//! Benchmarks for the deterministic half of the pipeline
//! Run: cargo bench -p errlens-core --bench pipeline

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use errlens_core::chunker::Chunker;
use errlens_core::{Deduplicator, LogParser, Normalizer};
use std::hint::black_box;

const LINES: &[&str] = &[
    "2024-01-15 10:30:45 ERROR [database] Connection timeout after 30 seconds to database server db-prod-01:5432",
    "2024-01-15 10:30:46 INFO [api] GET /api/users/123 served in 12ms",
    "2024-01-15 10:30:47 WARN [cache] Redis latency 250ms on 10.0.0.7:6379",
    "2024-01-15 10:30:48 ERROR [payment] IllegalStateException: card processor unavailable",
    "    at com.shop.Payment.charge(Payment.java:88)",
    "Feb 10 14:30:45 server-01 sshd[12345]: Failed password for invalid user admin from 10.0.0.1 port 22",
    "[Tue Feb 10 14:30:45 2026] [error] [client 192.168.1.100] Failed to connect to database: connection refused",
    "2024-01-15 10:31:30 CRITICAL [kernel] Out of memory: killed process 4411",
];

fn sample_log(lines: usize) -> String {
    (0..lines)
        .map(|i| LINES[i % LINES.len()])
        .collect::<Vec<_>>()
        .join("\n")
}

fn bench_parse(c: &mut Criterion) {
    let parser = LogParser::default();
    let mut group = c.benchmark_group("parse");

    for size in [100, 1_000, 10_000] {
        let text = sample_log(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &text, |b, text| {
            b.iter(|| parser.parse(black_box(text)))
        });
    }

    group.finish();
}

fn bench_chunk_and_dedup(c: &mut Criterion) {
    let entries = LogParser::default().parse(&sample_log(10_000));
    let chunker = Chunker::new(500);
    let dedup = Deduplicator::default();

    c.bench_function("chunk_10k", |b| b.iter(|| chunker.chunk(black_box(&entries))));

    c.bench_function("chunk_dedup_10k", |b| {
        b.iter(|| dedup.deduplicate(chunker.chunk(black_box(&entries))))
    });
}

fn bench_normalize(c: &mut Criterion) {
    let normalizer = Normalizer::default();

    c.bench_function("normalize_line", |b| {
        b.iter(|| normalizer.normalize(black_box(LINES[0])))
    });
}

criterion_group!(benches, bench_parse, bench_chunk_and_dedup, bench_normalize);
criterion_main!(benches);
