//! Benchmarks for transcript append and snapshot.
//!
//! Snapshots clone a list of shared pointers, so their cost should grow with
//! the number of messages but stay far below copying message bodies.

use std::time::Duration;

use aquamind_chat::input::InputCapture;
use aquamind_chat::transcript::{MessageDraft, TranscriptStore};
use aquamind_core::types::MessageKind;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

fn filled_store(turns: usize) -> TranscriptStore {
    let store = TranscriptStore::new();
    for i in 0..turns {
        let _ = store.append(MessageDraft::user(format!(
            "Show me temperature profiles for float {i}"
        )));
        let _ = store.append(MessageDraft::assistant(
            "The ocean temperature profile shows a thermocline at approximately 150m depth.",
            MessageKind::ChartRef,
        ));
    }
    store
}

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("transcript_append");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("append_turn", |b| {
        let store = TranscriptStore::new();
        b.iter(|| {
            let _ = store.append(MessageDraft::user("Where are the ARGO floats?"));
            store.append(MessageDraft::assistant(
                "I found 23 ARGO floats in the Arabian Sea region.",
                MessageKind::Text,
            ))
        });
    });

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("transcript_snapshot");

    for turns in [10usize, 100, 1000] {
        let store = filled_store(turns);
        group.bench_with_input(BenchmarkId::from_parameter(turns * 2), &store, |b, store| {
            b.iter(|| store.snapshot());
        });
    }

    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let input = InputCapture::default();
    c.bench_function("normalize_query", |b| {
        b.iter(|| input.submit_text("  Compare   salinity levels\tbetween Arabian Sea and Bay of Bengal  "));
    });
}

criterion_group!(benches, bench_append, bench_snapshot, bench_normalize);
criterion_main!(benches);
