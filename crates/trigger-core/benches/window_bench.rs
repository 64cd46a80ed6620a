//! Window engine benchmarks
//!
//! Measures per-hit cost of the sliding-window triggers on a random hit
//! stream, and of the bare window with a multiplicity condition.
//!
//! Run with: cargo bench --bench window_bench

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trigger_core::algorithm::{
    AlgorithmConfig, AlgorithmCore, ClusterTrigger, SimpleMajorityTrigger, TriggerAlgorithm,
};
use trigger_core::payload::{ChannelId, Hit, Payload, SourceId, TriggerKey};
use trigger_core::time::{DaqTime, Flushable};
use trigger_core::window::{Multiplicity, SlidingWindow};

const HITS: usize = 10_000;

/// Hits with uniformly random spacing of up to 2 µs over 60 strings.
fn hit_stream(seed: u64) -> Vec<Hit> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut time = 0i64;
    (0..HITS)
        .map(|_| {
            time += rng.gen_range(0..20_000);
            let channel = ChannelId::new(rng.gen_range(1..=60), rng.gen_range(1..=60));
            Hit::spe(DaqTime::new(time), channel)
        })
        .collect()
}

fn smt(threshold: usize) -> Box<dyn TriggerAlgorithm> {
    let config = AlgorithmConfig::new(
        "smt",
        SimpleMajorityTrigger::TYPE,
        TriggerKey::new(0, 1006, SourceId::IN_ICE_TRIGGER),
    )
    .with_param("threshold", threshold)
    .with_param("timeWindow", 5_000);
    Box::new(SimpleMajorityTrigger::from_config(&config, 0).unwrap())
}

fn cluster() -> Box<dyn TriggerAlgorithm> {
    let config = AlgorithmConfig::new(
        "cluster",
        ClusterTrigger::TYPE,
        TriggerKey::new(2, 3, SourceId::IN_ICE_TRIGGER),
    )
    .with_param("threshold", 4)
    .with_param("timeWindow", 5_000)
    .with_param("stringRadius", 1);
    Box::new(ClusterTrigger::from_config(&config, 0).unwrap())
}

fn run(mut algorithm: Box<dyn TriggerAlgorithm>, hits: Vec<Hit>) -> u64 {
    for hit in hits {
        algorithm.process(Payload::Hit(hit)).unwrap();
    }
    algorithm.process(Payload::flush_sentinel()).unwrap();
    algorithm.stats().emitted
}

/// Full trigger processing per hit
fn bench_triggers(c: &mut Criterion) {
    let mut group = c.benchmark_group("window_trigger");
    group.throughput(Throughput::Elements(HITS as u64));
    let hits = hit_stream(7);

    for threshold in [3usize, 8] {
        group.bench_with_input(BenchmarkId::new("smt", threshold), &threshold, |b, &threshold| {
            b.iter_batched(
                || (smt(threshold), hits.clone()),
                |(algorithm, hits)| black_box(run(algorithm, hits)),
                BatchSize::LargeInput,
            );
        });
    }

    group.bench_function("cluster", |b| {
        b.iter_batched(
            || (cluster(), hits.clone()),
            |(algorithm, hits)| black_box(run(algorithm, hits)),
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

/// The window engine alone, without the trait dispatch
fn bench_sliding_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("sliding_window");
    group.throughput(Throughput::Elements(HITS as u64));
    let hits = hit_stream(11);
    let config = AlgorithmConfig::new(
        "bare",
        SimpleMajorityTrigger::TYPE,
        TriggerKey::new(0, 1006, SourceId::IN_ICE_TRIGGER),
    );

    group.bench_function("multiplicity_5", |b| {
        b.iter_batched(
            || {
                (
                    AlgorithmCore::new(&config, 0),
                    SlidingWindow::new(5_000, Multiplicity::new(5)),
                    hits.clone(),
                )
            },
            |(mut core, mut window, hits)| {
                for hit in hits {
                    window.process_hit(&mut core, hit).unwrap();
                }
                black_box(core.cache().len())
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_triggers, bench_sliding_window);
criterion_main!(benches);
