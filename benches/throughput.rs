//! Throughput Benchmark for relaykv
//!
//! Measures the storage engine, the RESP codec, and write propagation to
//! registered replicas.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use relaykv::config::InstanceConfig;
use relaykv::connection::Outbound;
use relaykv::protocol::{decode, RespParser, RespValue};
use relaykv::replication::ReplicationState;
use relaykv::storage::StorageEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Benchmark SET operations
fn bench_set(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            engine.set(key, Bytes::from("small_value"), None);
            i += 1;
        });
    });

    group.bench_function("set_1kb", |b| {
        let mut i = 0u64;
        let value = Bytes::from("x".repeat(1024));
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            engine.set(key, value.clone(), None);
            i += 1;
        });
    });

    group.bench_function("set_with_px", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("ttl:{}", i));
            engine.set(key, Bytes::from("value"), Some(Duration::from_secs(3600)));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    for i in 0..100_000 {
        let key = Bytes::from(format!("key:{}", i));
        let value = Bytes::from(format!("value:{}", i));
        engine.set(key, value, None);
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i % 100_000));
            black_box(engine.get(&key));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("missing:{}", i));
            black_box(engine.get(&key));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark concurrent access
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let engine = Arc::new(StorageEngine::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let engine = Arc::clone(&engine);
                    thread::spawn(move || {
                        for i in 0..10_000 {
                            let key = Bytes::from(format!("key:{}:{}", t, i));
                            engine.set(key.clone(), Bytes::from("value"), None);
                            engine.get(&key);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(engine.len());
        });
    });

    group.finish();
}

/// Benchmark the RESP codec
fn bench_codec(c: &mut Criterion) {
    let command = RespValue::command(["SET", "user:1000", "some moderately sized value"]);
    let wire = command.serialize();
    let pipeline: Vec<u8> = (0..100).flat_map(|_| wire.iter().copied()).collect();
    let parser = RespParser::new();

    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Bytes(wire.len() as u64));

    group.bench_function("encode_set", |b| {
        b.iter(|| black_box(command.serialize()));
    });

    group.bench_function("parse_set", |b| {
        b.iter(|| black_box(parser.parse(&wire).unwrap()));
    });

    group.throughput(Throughput::Elements(100));
    group.bench_function("decode_pipeline_100", |b| {
        b.iter(|| black_box(decode(&pipeline).unwrap()));
    });

    group.finish();
}

/// Benchmark forwarding writes to registered replicas
fn bench_propagation(c: &mut Criterion) {
    let peer: SocketAddr = "127.0.0.1:7000".parse().unwrap();
    let storage = StorageEngine::new();
    let state = ReplicationState::new(InstanceConfig::primary(6379));

    // Receivers stay alive so the replicas never go inactive
    let receivers: Vec<_> = (0..4)
        .map(|_| {
            let (outbound, rx) = Outbound::channel();
            state.register_replica(peer, &outbound);
            rx
        })
        .collect();

    let command = vec![Bytes::from("SET"), Bytes::from("key"), Bytes::from("value")];

    let mut group = c.benchmark_group("propagation");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_to_4_replicas", |b| {
        b.iter(|| {
            state.propagate_write(&command, || {
                storage.set(command[1].clone(), command[2].clone(), None)
            });
        });
    });

    group.finish();
    drop(receivers);
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_concurrent,
    bench_codec,
    bench_propagation,
);

criterion_main!(benches);
