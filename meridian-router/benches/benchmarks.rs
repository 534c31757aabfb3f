use criterion::{black_box, criterion_group, criterion_main, Criterion};
use meridian_router::score::{self, ScoreInputs, ScoreWeights, Sample};
use meridian_router::weight::{WeightConfig, WeightManager};
use std::sync::Arc;

fn sample_history(n: usize) -> Vec<Sample> {
    (0..n)
        .map(|i| Sample {
            response_time: 0.2 + (i % 5) as f64 * 0.05,
            success: i % 11 != 0,
            age_hours: (i as f64) * 0.1,
        })
        .collect()
}

fn bench_score_components(c: &mut Criterion) {
    let samples = sample_history(200);
    let peer_costs = vec![0.002, 0.0015, 0.003];
    let availabilities = vec![1.0, 1.0, 0.98, 1.0, 0.95];
    let weights = ScoreWeights::default();

    c.bench_function("score_compute_components_200_samples", |b| {
        b.iter(|| {
            let inputs = ScoreInputs {
                samples: black_box(&samples),
                cost_per_request: black_box(0.002),
                peer_costs: black_box(&peer_costs),
                availabilities: black_box(&availabilities),
            };
            let components = score::compute_components(&inputs);
            black_box(score::composite(&components, &weights));
        });
    });
}

fn bench_time_decay_weight(c: &mut Criterion) {
    c.bench_function("score_time_decay_weight", |b| {
        b.iter(|| {
            for hour in 0..48 {
                black_box(score::time_decay_weight(black_box(hour as f64)));
            }
        });
    });
}

fn bench_trend_score(c: &mut Criterion) {
    let samples = sample_history(50);
    c.bench_function("score_trend_score_50_samples", |b| {
        b.iter(|| black_box(score::trend_score(black_box(&samples))));
    });
}

fn bench_weight_manager_record_outcome(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let manager = Arc::new(WeightManager::new(WeightConfig::default()));
    runtime.block_on(manager.register("anthropic", 1.0));

    c.bench_function("weight_manager_record_outcome", |b| {
        b.iter(|| {
            runtime.block_on(manager.record_outcome("anthropic", black_box(0.45), black_box(true), black_box(0.002), black_box(1.0)));
        });
    });
}

fn bench_weight_manager_rebalance(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let manager = Arc::new(WeightManager::new(WeightConfig::default()));
    runtime.block_on(async {
        for name in ["anthropic", "openai", "ollama"] {
            manager.register(name, 1.0).await;
            for i in 0..20 {
                manager
                    .record_outcome(name, 0.3 + (i % 3) as f64 * 0.1, i % 7 != 0, 0.001, 1.0)
                    .await;
            }
        }
    });

    c.bench_function("weight_manager_rebalance_three_providers", |b| {
        b.iter(|| {
            runtime.block_on(manager.rebalance());
        });
    });
}

criterion_group!(
    benches,
    bench_score_components,
    bench_time_decay_weight,
    bench_trend_score,
    bench_weight_manager_record_outcome,
    bench_weight_manager_rebalance
);
criterion_main!(benches);
