//! Benchmark tests for adwatch-core operations
//!
//! Run with: cargo bench -p adwatch-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use adwatch_core::{
    JsonLinesSink, ManualClock, MemorySink, SimulatedSource, TeardownReason, TrackerConfig,
    WatchSessionTracker,
};

// ============================================================================
// Tracker Benchmarks
// ============================================================================

fn bench_poll(c: &mut Criterion) {
    let mut group = c.benchmark_group("Milestone Poll");

    for ticks in [30u32, 300, 3000] {
        group.bench_with_input(BenchmarkId::new("ticks", ticks), &ticks, |b, &ticks| {
            b.iter(|| {
                let source = SimulatedSource::new(ticks as f64);
                let clock = ManualClock::new();
                let mut tracker = WatchSessionTracker::new(
                    TrackerConfig::default(),
                    source.clone(),
                    JsonLinesSink::new(std::io::sink()),
                    clock.clone(),
                );
                tracker.enable_tracking();
                tracker.on_play(0.0);
                for t in 1..=ticks {
                    clock.set(t as f64);
                    source.set_position(t as f64);
                    black_box(tracker.poll_progress());
                }
                tracker.on_ended(ticks as f64);
                black_box(tracker.report_final_results(TeardownReason::Unload))
            });
        });
    }

    group.finish();
}

fn bench_pause_resume(c: &mut Criterion) {
    let mut group = c.benchmark_group("Pause/Resume");

    group.bench_function("100_cycles", |b| {
        b.iter(|| {
            let clock = ManualClock::new();
            let mut tracker = WatchSessionTracker::new(
                TrackerConfig::default(),
                SimulatedSource::new(600.0),
                MemorySink::new(),
                clock.clone(),
            );
            tracker.enable_tracking();
            for i in 0..100 {
                let t = i as f64 * 2.0;
                clock.set(t);
                tracker.on_play(t);
                clock.set(t + 1.5);
                tracker.on_pause(t + 1.5);
            }
            black_box(tracker.session().accumulated_watch_seconds())
        });
    });

    group.bench_function("snapshot", |b| {
        let clock = ManualClock::new();
        let mut tracker = WatchSessionTracker::new(
            TrackerConfig::default(),
            SimulatedSource::new(600.0),
            MemorySink::new(),
            clock.clone(),
        );
        tracker.enable_tracking();
        tracker.on_play(0.0);
        clock.set(42.0);
        b.iter(|| black_box(tracker.snapshot()));
    });

    group.finish();
}

criterion_group!(tracker_benches, bench_poll, bench_pause_resume);

criterion_main!(tracker_benches);
