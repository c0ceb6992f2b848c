//! Criterion benchmarks for the per-transfer decision rules.
//!
//! These run on every interrupt-IN completion (up to 1000 per second on a
//! wired controller polled at 1 ms), so they must stay in the nanosecond range.
//!
//! Run with:
//! ```bash
//! cargo bench --package xusb-core --bench classify_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use xusb_core::{
    check_legacy_payload, classify_report, format_hex, is_input_poll, BulkOrInterruptTransfer,
    ReportRules, TransferReport, Urb, DEFAULT_INPUT_PIPE_HANDLE,
};

fn bench_classify(c: &mut Criterion) {
    let rules = ReportRules::default();
    let mut group = c.benchmark_group("classify_report");

    for len in [0usize, 3, 14, 20] {
        let payload = vec![0u8; len];
        group.bench_with_input(BenchmarkId::from_parameter(len), &payload, |b, p| {
            b.iter(|| classify_report(black_box(&TransferReport::new(p)), black_box(&rules)))
        });
    }

    group.finish();
}

fn bench_intercept(c: &mut Criterion) {
    let poll = Urb::BulkOrInterruptTransfer(BulkOrInterruptTransfer::new_in(
        DEFAULT_INPUT_PIPE_HANDLE,
        32,
    ));
    let other = Urb::Other { function: 0x0008 };

    c.bench_function("is_input_poll/match", |b| {
        b.iter(|| is_input_poll(black_box(&poll), DEFAULT_INPUT_PIPE_HANDLE))
    });
    c.bench_function("is_input_poll/other_function", |b| {
        b.iter(|| is_input_poll(black_box(&other), DEFAULT_INPUT_PIPE_HANDLE))
    });
}

fn bench_legacy(c: &mut Criterion) {
    c.bench_function("check_legacy_payload", |b| {
        b.iter(|| check_legacy_payload(black_box(&[0x01, 0x01])))
    });
}

fn bench_hex(c: &mut Criterion) {
    let report = [0u8; 20];
    c.bench_function("format_hex/20_bytes", |b| b.iter(|| format_hex(black_box(&report))));
}

criterion_group!(benches, bench_classify, bench_intercept, bench_legacy, bench_hex);
criterion_main!(benches);
