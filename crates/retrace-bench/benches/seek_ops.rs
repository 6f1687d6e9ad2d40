//! Criterion benchmarks for seeks over the 5K-action reference session.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use retrace_bench::{open_replayer, quirk_log, reference_log, QUIRK_ACTION, REFERENCE_ACTIONS};
use retrace_engine::ReplayConfig;

/// Benchmark: Step forward 100 actions from a checkpoint.
fn bench_step_forward_100(c: &mut Criterion) {
    let builder = reference_log(7);
    let log = builder.build();

    c.bench_function("seek_step_forward_100", |b| {
        b.iter_batched(
            || open_replayer(builder.initial_simulation(), &log, ReplayConfig::default()),
            |mut replayer| {
                black_box(replayer.goto(101, false).unwrap());
            },
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark: Backward seek across the whole session once checkpoints exist.
fn bench_backward_seek_warm(c: &mut Criterion) {
    let builder = reference_log(7);
    let log = builder.build();
    let mut replayer = open_replayer(builder.initial_simulation(), &log, ReplayConfig::default());
    replayer.goto(REFERENCE_ACTIONS, false).unwrap();

    let mut flip = false;
    c.bench_function("seek_backward_warm", |b| {
        b.iter(|| {
            flip = !flip;
            let target = if flip { 1_234 } else { 4_321 };
            black_box(replayer.goto(target, false).unwrap());
        });
    });
}

/// Benchmark: Forward far seek that jumps through a checkpoint.
fn bench_far_jump_warm(c: &mut Criterion) {
    let builder = reference_log(7);
    let log = builder.build();
    let mut replayer = open_replayer(builder.initial_simulation(), &log, ReplayConfig::default());
    replayer.goto(REFERENCE_ACTIONS, false).unwrap();

    c.bench_function("seek_far_jump_warm", |b| {
        b.iter(|| {
            replayer.goto(1, false).unwrap();
            black_box(replayer.goto(4_990, false).unwrap());
        });
    });
}

/// Benchmark: Replay across a desynced stretch from change data.
fn bench_desynced_stretch(c: &mut Criterion) {
    let (builder, sim) = quirk_log(7);
    let log = builder.build();
    let mut replayer = open_replayer(sim, &log, ReplayConfig::default());
    replayer.goto(QUIRK_ACTION + 10, false).unwrap();

    c.bench_function("seek_desynced_stretch", |b| {
        b.iter(|| {
            replayer.goto(QUIRK_ACTION - 45, false).unwrap();
            black_box(replayer.goto(QUIRK_ACTION + 5, false).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_step_forward_100,
    bench_backward_seek_warm,
    bench_far_jump_warm,
    bench_desynced_stretch
);
criterion_main!(benches);
