//! # Grading Benchmarks
//!
//! Performance benchmarks for the graders and the progress upsert path.
//!
//! Run with: `cargo bench -p devquest-core`

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use devquest_core::{
    InMemoryStore, LevelId, LevelStatistics, Outcome, ProgressRecord, ProgressUpserter,
    RetryPolicy, Stars, dedup_commands, grade_commands, grade_potions,
};
use std::collections::{BTreeMap, BTreeSet};
use std::hint::black_box;

fn command_set(size: usize, prefix: &str) -> BTreeSet<String> {
    (0..size).map(|i| format!("{}{}", prefix, i)).collect()
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_command_grading(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_grading");

    for size in [4, 32, 256].iter() {
        let expected = command_set(*size, "CMD");
        let submitted: Vec<String> = expected
            .iter()
            .cloned()
            .chain(expected.iter().take(size / 2).cloned())
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let received = dedup_commands(black_box(&submitted));
                black_box(grade_commands(&expected, &received))
            });
        });
    }

    group.finish();
}

fn bench_potion_grading(c: &mut Criterion) {
    let expected: BTreeMap<String, u32> = (0..16).map(|i| (format!("POCION{}", i), i)).collect();
    let mut actual = expected.clone();
    actual.insert("POCION3".to_string(), 99);

    c.bench_function("potion_grading", |b| {
        b.iter(|| black_box(grade_potions(&expected, black_box(&actual), 12, Some(10))));
    });
}

fn bench_progress_upsert(c: &mut Criterion) {
    let store = InMemoryStore::new();
    let upserter = ProgressUpserter::new(&store, RetryPolicy::none());
    let outcome = Outcome {
        stars: Stars::new(2),
        score: 200,
        solution: None,
    };

    c.bench_function("progress_upsert", |b| {
        b.iter(|| {
            black_box(
                upserter
                    .record("bench", LevelId(1), &outcome, Utc::now())
                    .expect("upsert"),
            )
        });
    });
}

fn bench_statistics(c: &mut Criterion) {
    let mut group = c.benchmark_group("level_statistics");
    let start = Utc::now();

    for size in [10, 1000, 10000].iter() {
        let records: Vec<ProgressRecord> = (0..*size)
            .map(|i| ProgressRecord {
                progress_id: ProgressRecord::key(&format!("u{}", i), LevelId(1)),
                user_id: format!("u{}", i),
                level_id: LevelId(1),
                stars: Stars::new((i % 4) as u8),
                score: 0,
                start_date: start,
                completion_date: Some(start + chrono::Duration::seconds(i as i64)),
                solution: None,
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), &records, |b, records| {
            b.iter(|| black_box(LevelStatistics::from_records(records)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_command_grading,
    bench_potion_grading,
    bench_progress_upsert,
    bench_statistics
);
criterion_main!(benches);
