//! Score Calculator: a pure, stateless function from a provider's recent
//! performance samples to a composite score in `[0, 1]`.
//!
//! Percentile/time-decay formulas, a distinct, richer scoring system from
//! the simpler EMA-normalized scores [`crate::weight`] uses for its own
//! periodic rebalance — the two stay separate rather than merged into one.

use serde::{Deserialize, Serialize};

/// One timestamped observation feeding the score. `age_hours` is the
/// observation's age at scoring time, used for time-decay weighting.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub response_time: f64,
    pub success: bool,
    pub age_hours: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub latency: f64,
    pub throughput: f64,
    pub reliability: f64,
    pub cost: f64,
    pub quality: f64,
    pub consistency: f64,
    pub availability: f64,
    pub trend: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            latency: 0.25,
            throughput: 0.15,
            reliability: 0.20,
            cost: 0.15,
            quality: 0.10,
            consistency: 0.10,
            availability: 0.03,
            trend: 0.02,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub latency_score: f64,
    pub reliability_score: f64,
    pub cost_score: f64,
    pub availability_score: f64,
    pub consistency_score: f64,
    pub trend_score: f64,
}

/// Everything the calculator needs for one provider. `peer_costs` are the
/// other candidate providers' per-request costs, used for relative cost
/// normalization; empty when there's nothing to compare against.
pub struct ScoreInputs<'a> {
    pub samples: &'a [Sample],
    pub cost_per_request: f64,
    pub peer_costs: &'a [f64],
    pub availabilities: &'a [f64],
}

/// `max(0.1, 1 - h/24)`.
pub fn time_decay_weight(age_hours: f64) -> f64 {
    (1.0 - age_hours / 24.0).max(0.1)
}

fn normalize_inverse(value: f64, lo: f64, hi: f64) -> f64 {
    (1.0 - (value - lo) / (hi - lo)).clamp(0.0, 1.0)
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn weighted_mean(values: &[f64], weights: &[f64]) -> f64 {
    let weight_sum: f64 = weights.iter().sum();
    if weight_sum <= 0.0 {
        return 0.0;
    }
    values
        .iter()
        .zip(weights)
        .map(|(v, w)| v * w)
        .sum::<f64>()
        / weight_sum
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m.abs() < f64::EPSILON {
        return 0.0;
    }
    variance(values).sqrt() / m
}

/// Pearson correlation coefficient between two equal-length series, 0.0 when
/// either series has no variance (guards the otherwise unavoidable
/// divide-by-zero).
pub fn pearson_correlation(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let mean_x = mean(&xs[..n]);
    let mean_y = mean(&ys[..n]);
    let mut numerator = 0.0;
    let mut denom_x = 0.0;
    let mut denom_y = 0.0;
    for i in 0..n {
        let dx = xs[i] - mean_x;
        let dy = ys[i] - mean_y;
        numerator += dx * dy;
        denom_x += dx * dx;
        denom_y += dy * dy;
    }
    if denom_x == 0.0 || denom_y == 0.0 {
        return 0.0;
    }
    (numerator / (denom_x.sqrt() * denom_y.sqrt())).clamp(-1.0, 1.0)
}

/// Correlation of negated response times (lower is better) with success
/// rate, remapped from `[-1, 1]` to `[0, 1]` via `0.5 + trend/4`.
pub fn trend_score(samples: &[Sample]) -> f64 {
    if samples.len() < 2 {
        return 0.5;
    }
    let response_times: Vec<f64> = samples.iter().map(|s| -s.response_time).collect();
    let successes: Vec<f64> = samples
        .iter()
        .map(|s| if s.success { 1.0 } else { 0.0 })
        .collect();
    let index: Vec<f64> = (0..samples.len()).map(|i| i as f64).collect();
    let response_trend = pearson_correlation(&index, &response_times);
    let success_trend = pearson_correlation(&index, &successes);
    (0.5 + (response_trend + success_trend) / 4.0).clamp(0.0, 1.0)
}

/// Compute every sub-score for one provider from its recent samples.
pub fn compute_components(inputs: &ScoreInputs) -> ScoreComponents {
    if inputs.samples.is_empty() {
        return ScoreComponents {
            latency_score: 0.5,
            reliability_score: 0.5,
            cost_score: 0.5,
            availability_score: 0.5,
            consistency_score: 0.5,
            trend_score: 0.5,
        };
    }

    let decay_weights: Vec<f64> = inputs
        .samples
        .iter()
        .map(|s| time_decay_weight(s.age_hours))
        .collect();

    let mut response_times: Vec<f64> = inputs.samples.iter().map(|s| s.response_time).collect();
    response_times.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let median = percentile(&response_times, 0.5);
    let p95 = percentile(&response_times, 0.95);
    let latency_score =
        0.7 * normalize_inverse(median, 0.5, 5.0) + 0.3 * normalize_inverse(p95, 1.0, 10.0);

    let success_values: Vec<f64> = inputs
        .samples
        .iter()
        .map(|s| if s.success { 1.0 } else { 0.0 })
        .collect();
    let weighted_success_rate = weighted_mean(&success_values, &decay_weights);
    let success_variance = variance(&success_values);
    let consistency_term = (1.0 - success_variance / 0.1).clamp(0.0, 1.0);
    let reliability_score = 0.8 * weighted_success_rate + 0.2 * consistency_term;

    let cost_score = if !inputs.peer_costs.is_empty() {
        let min_cost = inputs
            .peer_costs
            .iter()
            .cloned()
            .fold(inputs.cost_per_request, f64::min);
        let max_cost = inputs
            .peer_costs
            .iter()
            .cloned()
            .fold(inputs.cost_per_request, f64::max);
        if (max_cost - min_cost).abs() < f64::EPSILON {
            0.5
        } else {
            (1.0 - (inputs.cost_per_request - min_cost) / (max_cost - min_cost)).clamp(0.0, 1.0)
        }
    } else {
        (1.0 - (inputs.cost_per_request - 0.001) / (0.1 - 0.001)).clamp(0.0, 1.0)
    };

    let availability_score = if inputs.availabilities.is_empty() {
        0.5
    } else {
        weighted_mean(
            inputs.availabilities,
            &decay_weights[..inputs.availabilities.len().min(decay_weights.len())],
        )
    };

    let response_time_cv = coefficient_of_variation(&response_times);
    let success_cv = coefficient_of_variation(&success_values);
    let consistency_score = (1.0 - (response_time_cv + success_cv) / 2.0).clamp(0.0, 1.0);

    ScoreComponents {
        latency_score,
        reliability_score,
        cost_score,
        availability_score,
        consistency_score,
        trend_score: trend_score(inputs.samples),
    }
}

/// `latency` and `throughput` weights both apply to `latency_score` — the
/// default weight table has no separate throughput signal in the sample
/// data, so throughput rides along with latency rather than contributing a
/// phantom sub-score.
pub fn composite(components: &ScoreComponents, weights: &ScoreWeights) -> f64 {
    let weight_sum = weights.latency
        + weights.throughput
        + weights.reliability
        + weights.cost
        + weights.quality
        + weights.consistency
        + weights.availability
        + weights.trend;
    if weight_sum <= 0.0 {
        return 0.0;
    }

    let raw = components.latency_score * (weights.latency + weights.throughput)
        + components.reliability_score * (weights.reliability + weights.quality)
        + components.cost_score * weights.cost
        + components.consistency_score * weights.consistency
        + components.availability_score * weights.availability
        + components.trend_score * weights.trend;

    (raw / weight_sum).clamp(0.0, 1.0)
}
