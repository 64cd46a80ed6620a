//! Threshold, prescale and watermark properties of the hit triggers.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trigger_core::algorithm::{AlgorithmConfig, AlgorithmRegistry, TriggerAlgorithm};
use trigger_core::payload::{ChannelId, Hit, HitType, Payload, SourceId, TriggerKey};
use trigger_core::time::{DaqTime, Flushable, Interval};

fn create(config: &AlgorithmConfig) -> Box<dyn TriggerAlgorithm> {
    AlgorithmRegistry::with_builtins().create(config).unwrap()
}

fn in_ice(name: &str, algorithm: &str, trigger_type: i32) -> AlgorithmConfig {
    AlgorithmConfig::new(
        name,
        algorithm,
        TriggerKey::new(trigger_type, 1, SourceId::IN_ICE_TRIGGER),
    )
}

fn hit_ns(ns: i64) -> Payload {
    Hit::spe(DaqTime::from_nanos(ns), ChannelId::new(21, 30)).into()
}

fn release_all(algorithm: &mut Box<dyn TriggerAlgorithm>) -> Vec<trigger_core::TriggerRequest> {
    algorithm.release(Interval::new(DaqTime::ZERO, DaqTime::MAX))
}

#[test]
fn test_threshold_three_in_250ns() {
    let mut smt = create(
        &in_ice("smt3", "SimpleMajorityTrigger", 0)
            .with_param("threshold", 3)
            .with_param("timeWindow", 250),
    );
    for ns in [0, 100, 200, 300] {
        smt.process(hit_ns(ns)).unwrap();
    }
    smt.process(Payload::flush_sentinel()).unwrap();

    let released = release_all(&mut smt);
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].first_time(), DaqTime::from_nanos(0));
    assert_eq!(released[0].last_time(), DaqTime::from_nanos(200));
    let times: Vec<_> = released[0].hits().iter().map(|h| h.time).collect();
    assert_eq!(
        times,
        vec![DaqTime::from_nanos(0), DaqTime::from_nanos(100), DaqTime::from_nanos(200)]
    );
}

#[test]
fn test_prescale_ten_thousand() {
    let mut min_bias = create(&in_ice("mb", "MinBiasTrigger", 2).with_param("prescale", 10_000));
    for ns in 1..=10_000 {
        min_bias.process(hit_ns(ns)).unwrap();
    }
    min_bias.process(Payload::flush_sentinel()).unwrap();

    let released = release_all(&mut min_bias);
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].first_time(), DaqTime::from_nanos(10_000));
    assert_eq!(min_bias.stats().inputs, 10_000);
}

#[test]
fn test_calibration_counts_only_flasher_hits() {
    let mut cal = create(&in_ice("flasher", "CalibrationTrigger", 7));
    cal.process(hit_ns(10)).unwrap();
    let flasher = Hit::new(
        DaqTime::from_nanos(20),
        ChannelId::new(21, 30),
        SourceId::string_hub(21),
        HitType::Flasher,
    );
    cal.process(flasher.into()).unwrap();
    cal.process(hit_ns(30)).unwrap();
    cal.process(Payload::flush_sentinel()).unwrap();

    let released = release_all(&mut cal);
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].hits()[0].kind, HitType::Flasher);
    assert_eq!(cal.stats().rejected, 2);
}

fn random_hits(seed: u64, count: usize) -> Vec<Payload> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut time = 0i64;
    (0..count)
        .map(|_| {
            time += rng.gen_range(0..3_000);
            let channel = ChannelId::new(rng.gen_range(1..=8), rng.gen_range(1..=64));
            let kind = if rng.gen_bool(0.1) {
                HitType::Mpe
            } else {
                HitType::Spe
            };
            Hit::new(DaqTime::new(time), channel, SourceId::string_hub(channel.string), kind).into()
        })
        .collect()
}

fn random_stream_algorithms() -> Vec<Box<dyn TriggerAlgorithm>> {
    vec![
        create(
            &in_ice("smt4", "SimpleMajorityTrigger", 0)
                .with_param("threshold", 4)
                .with_param("timeWindow", 1_000),
        ),
        create(
            &in_ice("smt-mpe", "SimpleMajorityTrigger", 1)
                .with_param("threshold", 2)
                .with_param("timeWindow", 500)
                .with_param("hitType", "mpe"),
        ),
        create(
            &in_ice("cluster", "ClusterTrigger", 3)
                .with_param("threshold", 3)
                .with_param("timeWindow", 1_500)
                .with_param("coherenceLength", 10)
                .with_param("stringRadius", 1),
        ),
        create(&in_ice("mb", "MinBiasTrigger", 2).with_param("prescale", 97)),
        create(&in_ice("fixed", "FixedRateTrigger", 23).with_param("interval", 50_000)),
    ]
}

#[test]
fn test_watermarks_never_regress_and_bound_emissions() {
    let hits = random_hits(42, 5_000);
    for mut algorithm in random_stream_algorithms() {
        let mut seen = 0;
        let mut watermark = algorithm.watermark();
        for hit in hits.iter().cloned() {
            let before = algorithm.watermark();
            algorithm.process(hit).unwrap();
            let after = algorithm.watermark();
            assert!(after >= watermark, "{} watermark went back", algorithm.name());
            watermark = after;

            let cached = algorithm.core().cache().len();
            if cached > seen {
                let newest = algorithm
                    .core()
                    .cache()
                    .iter()
                    .map(|r| r.first_time())
                    .max()
                    .unwrap();
                assert!(newest >= before, "{} emitted below its watermark", algorithm.name());
            }
            seen = cached;
        }
        algorithm.process(Payload::flush_sentinel()).unwrap();
        assert_eq!(algorithm.watermark(), DaqTime::MAX);
        assert!(algorithm.stats().emitted > 0, "{} never fired", algorithm.name());
    }
}

#[test]
fn test_reset_restarts_uids_and_watermark() {
    let mut smt = create(
        &in_ice("smt2", "SimpleMajorityTrigger", 0)
            .with_param("threshold", 2)
            .with_param("timeWindow", 100),
    );
    for ns in [0, 10, 500, 510] {
        smt.process(hit_ns(ns)).unwrap();
    }
    smt.process(Payload::flush_sentinel()).unwrap();
    let first_run: Vec<_> = release_all(&mut smt).iter().map(|r| r.uid()).collect();
    assert_eq!(first_run, vec![0, 1]);

    smt.reset();
    assert_eq!(smt.watermark(), DaqTime::ZERO);
    assert!(!smt.is_flushed());
    for ns in [0, 10] {
        smt.process(hit_ns(ns)).unwrap();
    }
    smt.process(Payload::flush_sentinel()).unwrap();
    let second_run: Vec<_> = release_all(&mut smt).iter().map(|r| r.uid()).collect();
    assert_eq!(second_run, vec![0]);
    assert_eq!(smt.stats().emitted, 3);
}
