//! Benchmarks for binstore storage operations

use std::fs::{self, File};

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use tempfile::TempDir;

use binstore::{codec, Config, Engine, StreamInfo};

const PAYLOAD_SIZE: usize = 64 * 1024;

fn codec_benchmarks(c: &mut Criterion) {
    let payload = vec![0xA5u8; PAYLOAD_SIZE];

    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Bytes(PAYLOAD_SIZE as u64));
    group.bench_function("crc16_64k", |b| b.iter(|| codec::crc16(&payload)));
    group.bench_function("content_hash_64k", |b| b.iter(|| codec::content_hash(&payload)));
    group.bench_function("compress_64k", |b| b.iter(|| codec::compress(&payload).unwrap()));
    group.finish();
}

fn read_benchmarks(c: &mut Criterion) {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path().join("store"))
        .compression_threshold(u64::MAX) // isolate raw read path
        .cache_fetch_threshold(0)
        .build();
    let engine = Engine::open(config).unwrap();

    let source_path = temp.path().join("payload.bin");
    fs::write(&source_path, vec![0x42u8; PAYLOAD_SIZE]).unwrap();
    let key = source_path.to_string_lossy().into_owned();
    let source = File::open(&source_path).unwrap();
    engine.add(&key, &source, &StreamInfo::empty()).unwrap();
    // Settle the background write before measuring reads
    engine.get(&key).unwrap();

    let mut group = c.benchmark_group("engine");
    group.throughput(Throughput::Bytes(PAYLOAD_SIZE as u64));
    group.bench_function("get_64k_uncached", |b| {
        b.iter(|| engine.get(&key).unwrap())
    });
    group.finish();
}

criterion_group!(benches, codec_benchmarks, read_benchmarks);
criterion_main!(benches);
