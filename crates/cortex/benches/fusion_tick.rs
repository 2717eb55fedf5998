use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use magnifier_cortex::shared_state::{latest_value, SharedState};
use magnifier_cortex::*;
use std::time::Instant;

fn detections(count: usize) -> Vec<DetectedRegion> {
    (0..count)
        .map(|i| {
            let x = (i * 137 % 1800) as f64;
            let y = (i * 71 % 1000) as f64;
            let class = match i % 4 {
                0 => Classification::Button,
                1 => Classification::Title,
                2 => Classification::Error,
                _ => Classification::Plain,
            };
            DetectedRegion::new(Rect::new(x, y, 120.0, 18.0), "Some detected label", 80.0, class)
        })
        .collect()
}

fn bench_fusion_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("fusion_tick");
    let config = CortexConfig::default();
    let scorer = ImportanceScorer::from_config(&config);
    let map = scorer.rebuild(&detections(200), &config.weights, config.grid_dims());

    let (gaze, gaze_reader) = latest_value();
    let (importance, importance_reader) = latest_value();
    let shared = SharedState::new(config, gaze_reader, importance_reader);
    gaze.publish(Coordinate::new(900.0, 400.0));
    importance.publish(map);

    for mode in [FusionMode::Blended, FusionMode::ImportanceBased] {
        shared.set_mode(mode);
        let inputs = shared.fusion_inputs(Some(Coordinate::new(300.0, 700.0)));
        let mut core = FusionCore::new();
        group.bench_with_input(BenchmarkId::new("tick", format!("{mode:?}")), &inputs, |b, inputs| {
            b.iter(|| black_box(core.tick(black_box(inputs), Instant::now())));
        });
    }

    group.bench_function("snapshot_and_tick", |b| {
        let mut core = FusionCore::new();
        b.iter(|| {
            let inputs = shared.fusion_inputs(Some(Coordinate::new(300.0, 700.0)));
            black_box(core.tick(&inputs, Instant::now()))
        });
    });

    group.finish();
}

fn bench_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("importance_rebuild");
    let config = CortexConfig::default();
    let scorer = ImportanceScorer::from_config(&config);

    for count in [10usize, 100, 1000] {
        let regions = detections(count);
        group.bench_with_input(BenchmarkId::new("regions", count), &regions, |b, regions| {
            b.iter(|| scorer.rebuild(black_box(regions), &config.weights, config.grid_dims()));
        });
    }

    group.finish();
}

fn bench_calibration_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("calibration");
    let config = CortexConfig::default();
    let profile = CalibrationProfile::linear(config.screen(), config.calibration_margin_px).unwrap();

    group.bench_function("map", |b| {
        b.iter(|| {
            for i in 0..100 {
                let t = i as f64 / 100.0;
                black_box(profile.map(black_box(GazeRatio::new(t, 1.0 - t))));
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_fusion_tick, bench_rebuild, bench_calibration_map);
criterion_main!(benches);
