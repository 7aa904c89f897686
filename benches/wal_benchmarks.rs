// SPDX-License-Identifier: PMPL-1.0-or-later
//! Performance benchmarks for the write-ahead log append and read paths.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tempfile::TempDir;

use segwal::{StartAt, Wal, WalConfig};

const PAYLOAD: &[u8] = b"benchmark-payload-0123456789abcdef";

fn bench_append(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let config = WalConfig {
        max_segment_size: 64 * 1024 * 1024,
        ..Default::default()
    };
    let mut wal = Wal::new(tmp.path().join("bench-append"), config).unwrap();

    let mut group = c.benchmark_group("wal");
    group.throughput(Throughput::Bytes(PAYLOAD.len() as u64));
    group.bench_function("append", |b| {
        b.iter(|| black_box(wal.write(PAYLOAD).unwrap()));
    });
    group.finish();

    wal.close().unwrap();
}

fn bench_append_with_cycling(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    // Small segments so the rollover path is exercised continuously.
    let config = WalConfig {
        max_segment_size: 64 * 1024,
        ..Default::default()
    };
    let mut wal = Wal::new(tmp.path().join("bench-cycle"), config).unwrap();

    let mut group = c.benchmark_group("wal");
    group.throughput(Throughput::Bytes(PAYLOAD.len() as u64));
    group.bench_function("append_with_cycling", |b| {
        b.iter(|| black_box(wal.write(PAYLOAD).unwrap()));
    });
    group.finish();

    wal.close().unwrap();
}

fn bench_sequential_read(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let config = WalConfig {
        max_segment_size: 64 * 1024 * 1024,
        ..Default::default()
    };
    let mut wal = Wal::new(tmp.path().join("bench-read"), config).unwrap();
    for _ in 0..10_000 {
        wal.write(PAYLOAD).unwrap();
    }
    wal.flush().unwrap();

    let mut group = c.benchmark_group("wal");
    group.throughput(Throughput::Elements(10_000));
    group.bench_function("read_10k", |b| {
        b.iter(|| {
            let mut reader = wal.reader(StartAt::Beginning).unwrap();
            let mut count = 0u64;
            while let Ok(entry) = reader.next() {
                black_box(&entry);
                count += 1;
            }
            reader.close().unwrap();
            assert_eq!(count, 10_000);
        });
    });
    group.finish();

    wal.close().unwrap();
}

criterion_group!(
    benches,
    bench_append,
    bench_append_with_cycling,
    bench_sequential_read
);
criterion_main!(benches);
