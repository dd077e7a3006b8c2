//! Frame codec benchmark suite.
//!
//! Benchmarks encode/decode of the array envelope at different payload
//! sizes, plus the full round trip.
//!
//! Run with: cargo bench --bench codec
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};

use realtime_channels::{Frame, JoinRef, PushRef};

// ============================================================================
// Fixtures
// ============================================================================

fn payload(entries: usize) -> Value {
    let body: String = "x".repeat(64);
    let items: Vec<Value> = (0..entries)
        .map(|i| json!({"id": i, "body": body, "flags": [1, 2, 3]}))
        .collect();
    json!({ "items": items })
}

fn frame(entries: usize) -> Frame {
    Frame::push(
        "room:42",
        "new_msg",
        payload(entries),
        JoinRef::from_u64(3),
        PushRef::from_u64(7),
    )
}

const PAYLOAD_SIZES: &[usize] = &[0, 8, 64];

// ============================================================================
// Benchmark: Encode
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for &size in PAYLOAD_SIZES {
        let frame = frame(size);
        group.bench_with_input(BenchmarkId::new("entries", size), &frame, |b, frame| {
            b.iter(|| black_box(frame.encode()));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for &size in PAYLOAD_SIZES {
        let text = frame(size).encode();
        group.bench_with_input(BenchmarkId::new("entries", size), &text, |b, text| {
            b.iter(|| Frame::decode(black_box(text)).expect("decode"));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Round Trip
// ============================================================================

fn bench_round_trip(c: &mut Criterion) {
    let frame = frame(8);

    c.bench_function("round_trip", |b| {
        b.iter(|| Frame::decode(&black_box(&frame).encode()).expect("decode"));
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_round_trip);
criterion_main!(benches);
