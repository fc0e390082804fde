//! Criterion benchmarks for the change queue and the reconciler block loop
//!
//! Run with: cargo bench -p segue-core --bench queue_bench
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use segue_core::{
    ChangeSet, EngineState, EngineTarget, InstrumentChange, ParamSlot, ParameterChange,
    PerformanceChange, ReconcilerConfig, change_queue, compute_diff, initialize,
};

const BLOCK_SIZES: &[usize] = &[64, 256, 1024];

#[derive(Default)]
struct Sink {
    acc: f32,
}

impl EngineTarget for Sink {
    fn prepare(&mut self, _sample_rate: f64, _max_block_size: usize) {}
    fn swap_instrument(&mut self, _change: &InstrumentChange) {}
    fn apply_performance(&mut self, change: &PerformanceChange) {
        self.acc += change.new_density;
    }
    fn set_parameter(&mut self, _slot: ParamSlot, value: f32) {
        self.acc += value;
    }
    fn automate_parameter(&mut self, _slot: ParamSlot, values: &[f32]) {
        self.acc += values.iter().sum::<f32>();
    }
    fn render(&mut self, frames: usize) {
        black_box(frames);
    }
}

fn bench_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("ChangeQueue");

    group.bench_function("push+pop", |b| {
        let (mut tx, mut rx) = change_queue::<u64>(64);
        b.iter(|| {
            let _ = tx.push(black_box(7));
            black_box(rx.try_pop());
        });
    });

    group.bench_function("cancel_pending", |b| {
        let (mut tx, mut rx) = change_queue::<u64>(64);
        b.iter(|| {
            for i in 0..8 {
                let _ = tx.push(i);
            }
            black_box(tx.cancel_pending());
            while rx.try_pop().is_some() {}
        });
    });

    group.finish();
}

fn bench_diff(c: &mut Criterion) {
    let mut before = EngineState::new().with_performance("piano");
    let mut after = EngineState::new().with_performance("techno");
    for i in 0..64 {
        before = before.with_parameter(format!("p{i}"), 0.0, 0.01);
        after = after.with_parameter(format!("p{i}"), i as f32, 0.01);
    }

    c.bench_function("compute_diff/64_params", |b| {
        b.iter(|| black_box(compute_diff(black_box(&before), black_box(&after))));
    });
}

fn bench_reconciler(c: &mut Criterion) {
    let mut group = c.benchmark_group("AudioReconciler");

    for &block in BLOCK_SIZES {
        group.bench_with_input(BenchmarkId::new("process_32_ramps", block), &block, |b, &block| {
            let (mut control, mut audio) =
                initialize(Sink::default(), ReconcilerConfig::new(48000.0)).unwrap();
            let mut set = ChangeSet::new();
            for i in 0..32 {
                // Long enough that no ramp completes during measurement.
                set.push(ParameterChange::new(format!("p{i}"), 0.0, 1.0, 3600.0));
            }
            control.apply_diff(&set).unwrap();
            audio.process(block);
            b.iter(|| audio.process(black_box(block)));
        });
    }

    group.bench_function("apply_diff+process/idle", |b| {
        let (mut control, mut audio) =
            initialize(Sink::default(), ReconcilerConfig::new(48000.0)).unwrap();
        let set = ChangeSet::new().with(PerformanceChange {
            new_performance_id: "p".into(),
            new_density: 0.5,
            ..Default::default()
        });
        b.iter(|| {
            control.apply_diff(&set).unwrap();
            audio.process(64);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_queue, bench_diff, bench_reconciler);
criterion_main!(benches);
