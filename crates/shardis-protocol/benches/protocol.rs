//! Micro-benchmarks for reply parsing and request encoding.
//!
//! Run with `cargo bench -p shardis-protocol`.

use std::hint::black_box;

use bytes::{Bytes, BytesMut};
use criterion::{criterion_group, criterion_main, Criterion};
use shardis_protocol::{parse_frame, parse_frame_bytes, Frame};

/// Builds the raw bytes of an EXEC reply holding `count` bulk values.
fn build_exec_reply(count: usize, value_size: usize) -> Vec<u8> {
    let value = "x".repeat(value_size);
    let mut out = format!("*{count}\r\n");
    for _ in 0..count {
        out.push_str(&format!("${}\r\n{}\r\n", value.len(), value));
    }
    out.into_bytes()
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("reply_parse");

    let ok = b"+OK\r\n";
    group.bench_function("ok", |b| {
        b.iter(|| black_box(parse_frame(ok).unwrap().unwrap()));
    });

    let nil = b"$-1\r\n";
    group.bench_function("nil", |b| {
        b.iter(|| black_box(parse_frame(nil).unwrap().unwrap()));
    });

    let exec_small = build_exec_reply(16, 64);
    group.bench_function("exec_16x64B", |b| {
        b.iter(|| black_box(parse_frame(&exec_small).unwrap().unwrap()));
    });

    let exec_large = Bytes::from(build_exec_reply(256, 1024));
    group.bench_function("exec_256x1KB_zerocopy", |b| {
        b.iter(|| black_box(parse_frame_bytes(&exec_large).unwrap().unwrap()));
    });

    group.finish();
}

fn bench_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_encode");

    group.bench_function("get", |b| {
        let mut buf = BytesMut::with_capacity(64);
        b.iter(|| {
            buf.clear();
            Frame::serialize_command(&["GET", "key:12345"], &mut buf);
            black_box(&buf);
        });
    });

    let value = "v".repeat(1024);
    group.bench_function("set_1KB", |b| {
        let mut buf = BytesMut::with_capacity(2048);
        b.iter(|| {
            buf.clear();
            Frame::serialize_command(&["SET", "key:12345", value.as_str()], &mut buf);
            black_box(&buf);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_serialize);
criterion_main!(benches);
