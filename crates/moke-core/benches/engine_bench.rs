//! Criterion benchmarks for the Moke translation engine.
//!
//! Measures the per-batch cost of the hot path: decoding a read buffer,
//! evaluating the rules and encoding the output batch.
//!
//! Run with:
//! ```bash
//! cargo bench --package moke-core --bench engine_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use moke_core::keymap::codes::{EV_MSC, KEY_LEFTALT, KEY_LEFTMETA};
use moke_core::{
    decode_records, encode_records, Engine, InputRecord, MappingTable, Passthrough,
};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn default_engine(passthrough: Passthrough) -> Engine {
    Engine::new(
        MappingTable::new()
            .finalize()
            .expect("default mapping is valid"),
        passthrough,
    )
}

/// Press and release of the middle-button chord, four frames.
fn chord_cycle() -> Vec<Vec<InputRecord>> {
    let scan = InputRecord::new(EV_MSC, 4, 0x7e);
    vec![
        vec![scan, InputRecord::key(KEY_LEFTMETA, 1), InputRecord::syn_report()],
        vec![scan, InputRecord::key(KEY_LEFTALT, 1), InputRecord::syn_report()],
        vec![scan, InputRecord::key(KEY_LEFTALT, 0), InputRecord::syn_report()],
        vec![scan, InputRecord::key(KEY_LEFTMETA, 0), InputRecord::syn_report()],
    ]
}

/// A full read of ordinary typing: unwanted keys only.
fn typing_batch() -> Vec<InputRecord> {
    let mut batch = Vec::new();
    for code in [30u16, 48, 46] {
        batch.push(InputRecord::key(code, 1));
        batch.push(InputRecord::syn_report());
    }
    batch.push(InputRecord::key(30, 0));
    batch.push(InputRecord::syn_report());
    batch
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

/// Benchmarks rule evaluation for a chord press/release cycle.
fn bench_chord_cycle(c: &mut Criterion) {
    let frames = chord_cycle();
    let mut group = c.benchmark_group("chord_cycle");
    for (name, passthrough) in [("off", Passthrough::Off), ("wanted", Passthrough::WantedKeys)] {
        group.bench_with_input(BenchmarkId::new("passthrough", name), &frames, |b, frames| {
            let mut engine = default_engine(passthrough);
            b.iter(|| {
                for frame in frames {
                    black_box(engine.feed(black_box(frame)).unwrap());
                }
            })
        });
    }
    group.finish();
}

/// Benchmarks the common case: a batch with nothing to translate.
fn bench_typing_batch(c: &mut Criterion) {
    let batch = typing_batch();
    let mut engine = default_engine(Passthrough::WantedKeys);
    c.bench_function("typing_batch", |b| {
        b.iter(|| black_box(engine.feed(black_box(&batch)).unwrap()))
    });
}

/// Benchmarks decode, translate and encode for one read buffer.
fn bench_bytes_round_trip(c: &mut Criterion) {
    let mut input = Vec::new();
    for frame in chord_cycle() {
        encode_records(&frame, &mut input);
    }
    let mut engine = default_engine(Passthrough::Off);
    let mut output = Vec::new();
    c.bench_function("bytes_round_trip", |b| {
        b.iter(|| {
            let records = decode_records(black_box(&input)).unwrap();
            for batch in engine.feed(&records).unwrap() {
                output.clear();
                encode_records(&batch, &mut output);
                black_box(&output);
            }
        })
    });
}

criterion_group!(
    benches,
    bench_chord_cycle,
    bench_typing_batch,
    bench_bytes_round_trip
);
criterion_main!(benches);
