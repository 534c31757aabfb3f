//! Weight Manager: maintains one [`WeightMetrics`] per provider and drives
//! two update paths — synchronous EMA ingestion plus immediate trigger
//! checks on every dispatch outcome, and a periodic rebalance loop.
//!
//! Sub-scores here use simple EMA-normalized formulas, distinct from the
//! richer percentile/time-decay scores in [`crate::score`] that the Router
//! uses for ranking candidates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const SAMPLE_WINDOW: usize = 100;
const TRIGGER_WINDOW: usize = 10;
const MIN_TRIGGER_SAMPLES: usize = 5;
const MAX_HISTORY: usize = 1000;

#[derive(Debug, Clone, Copy)]
struct Outcome {
    response_time: f64,
    success: bool,
    cost: f64,
    availability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightMetrics {
    pub base_weight: f64,
    pub current_weight: f64,
    pub ema_response_time: Option<f64>,
    pub ema_success_rate: Option<f64>,
    pub ema_cost: Option<f64>,
    pub ema_availability: Option<f64>,
    pub performance_score: f64,
    pub trend_score: f64,
    pub load_balance_score: f64,
    pub last_updated: DateTime<Utc>,
}

impl WeightMetrics {
    fn new(base_weight: f64) -> Self {
        Self {
            base_weight,
            current_weight: base_weight,
            ema_response_time: None,
            ema_success_rate: None,
            ema_cost: None,
            ema_availability: None,
            performance_score: 0.5,
            trend_score: 0.5,
            load_balance_score: 0.5,
            last_updated: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightAdjustmentEvent {
    pub provider_name: String,
    pub old_weight: f64,
    pub new_weight: f64,
    pub adjustment_type: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightConfig {
    pub min_weight: f64,
    pub max_weight: f64,
    pub adjustment_sensitivity: f64,
    pub rebalance_threshold: f64,
    pub trend_window: usize,
    pub rebalance_interval: Duration,
    pub performance_weight: f64,
    pub availability_weight: f64,
    pub cost_weight: f64,
    pub response_time_weight: f64,
    pub load_balance_weight: f64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            min_weight: 0.1,
            max_weight: 10.0,
            adjustment_sensitivity: 0.5,
            rebalance_threshold: 0.3,
            trend_window: 20,
            rebalance_interval: Duration::from_secs(60),
            performance_weight: 0.3,
            availability_weight: 0.25,
            cost_weight: 0.2,
            response_time_weight: 0.15,
            load_balance_weight: 0.1,
        }
    }
}

struct ProviderState {
    metrics: WeightMetrics,
    samples: VecDeque<Outcome>,
    request_count: u64,
}

/// Exported shape for [`WeightManager::checkpoint`]/[`WeightManager::restore`].
#[derive(Serialize, Deserialize)]
struct Checkpoint {
    metrics: WeightMetrics,
}

pub struct WeightManager {
    config: WeightConfig,
    providers: RwLock<HashMap<String, ProviderState>>,
    history: RwLock<VecDeque<WeightAdjustmentEvent>>,
    task: RwLock<Option<JoinHandle<()>>>,
}

fn ema_update(previous: Option<f64>, observation: f64, alpha: f64) -> f64 {
    match previous {
        Some(prev) => alpha * observation + (1.0 - alpha) * prev,
        None => observation,
    }
}

fn clamp_weight(weight: f64, config: &WeightConfig) -> f64 {
    weight.clamp(config.min_weight, config.max_weight)
}

impl WeightManager {
    pub fn new(config: WeightConfig) -> Self {
        Self {
            config,
            providers: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::with_capacity(MAX_HISTORY)),
            task: RwLock::new(None),
        }
    }

    pub async fn register(&self, provider_name: &str, base_weight: f64) {
        let mut providers = self.providers.write().await;
        providers.entry(provider_name.to_string()).or_insert_with(|| ProviderState {
            metrics: WeightMetrics::new(base_weight),
            samples: VecDeque::with_capacity(SAMPLE_WINDOW),
            request_count: 0,
        });
    }

    pub async fn unregister(&self, provider_name: &str) {
        self.providers.write().await.remove(provider_name);
    }

    pub async fn metrics(&self, provider_name: &str) -> Option<WeightMetrics> {
        let providers = self.providers.read().await;
        providers.get(provider_name).map(|p| p.metrics.clone())
    }

    pub async fn current_weight(&self, provider_name: &str) -> Option<f64> {
        self.metrics(provider_name).await.map(|m| m.current_weight)
    }

    pub async fn weights(&self) -> HashMap<String, f64> {
        let providers = self.providers.read().await;
        providers
            .iter()
            .map(|(name, state)| (name.clone(), state.metrics.current_weight))
            .collect()
    }

    async fn record_event(&self, provider_name: &str, old: f64, new: f64, kind: &str, reason: String) {
        let mut history = self.history.write().await;
        if history.len() >= MAX_HISTORY {
            history.pop_front();
        }
        history.push_back(WeightAdjustmentEvent {
            provider_name: provider_name.to_string(),
            old_weight: old,
            new_weight: new,
            adjustment_type: kind.to_string(),
            reason,
            timestamp: Utc::now(),
        });
    }

    pub async fn history(&self) -> Vec<WeightAdjustmentEvent> {
        self.history.read().await.iter().cloned().collect()
    }

    /// Synchronous, non-blocking outcome ingestion: update EMAs and run the
    /// immediate trigger checks in the same call.
    pub async fn record_outcome(
        &self,
        provider_name: &str,
        response_time: f64,
        success: bool,
        cost: f64,
        availability: f64,
    ) {
        let (old_weight, trigger) = {
            let mut providers = self.providers.write().await;
            let Some(state) = providers.get_mut(provider_name) else {
                return;
            };

            if state.samples.len() >= SAMPLE_WINDOW {
                state.samples.pop_front();
            }
            state.samples.push_back(Outcome {
                response_time,
                success,
                cost,
                availability,
            });
            state.request_count += 1;

            let metrics = &mut state.metrics;
            metrics.ema_response_time = Some(ema_update(metrics.ema_response_time, response_time, 0.2));
            metrics.ema_success_rate =
                Some(ema_update(metrics.ema_success_rate, if success { 1.0 } else { 0.0 }, 0.3));
            metrics.ema_cost = Some(ema_update(metrics.ema_cost, cost, 0.1));
            metrics.ema_availability = Some(ema_update(metrics.ema_availability, availability, 0.4));

            let old_weight = metrics.current_weight;
            let trigger = check_immediate_trigger(state, &self.config);
            (old_weight, trigger)
        };

        if let Some((kind, factor, reason)) = trigger {
            self.apply_factor(provider_name, old_weight, factor, kind, reason).await;
        }
    }

    async fn apply_factor(
        &self,
        provider_name: &str,
        old_weight: f64,
        factor: f64,
        kind: &'static str,
        reason: String,
    ) {
        let new_weight = clamp_weight(old_weight * factor, &self.config);
        {
            let mut providers = self.providers.write().await;
            if let Some(state) = providers.get_mut(provider_name) {
                state.metrics.current_weight = new_weight;
                state.metrics.last_updated = Utc::now();
            }
        }
        self.record_event(provider_name, old_weight, new_weight, kind, reason).await;
    }

    /// The periodic rebalance loop's body: recompute every registered
    /// provider's weight from its current EMA metrics.
    pub async fn rebalance(&self) {
        let names: Vec<String> = self.providers.read().await.keys().cloned().collect();
        for name in &names {
            self.recompute_provider_scores(name).await;
        }
        self.global_rebalance(&names).await;
    }

    async fn recompute_provider_scores(&self, provider_name: &str) {
        let (total_requests, provider_count, peer_costs) = {
            let providers = self.providers.read().await;
            let total_requests = providers.values().map(|s| s.request_count).sum();
            let provider_count = providers.len().max(1);
            let peer_costs = providers_costs_excluding(&providers, provider_name);
            (total_requests, provider_count, peer_costs)
        };

        let (old_weight, new_weight, performance_score, trend, load_balance) = {
            let mut providers = self.providers.write().await;
            let Some(state) = providers.get_mut(provider_name) else {
                return;
            };
            if state.samples.len() < 3 {
                return;
            }

            let response_time_score = sub_score_response_time(state.metrics.ema_response_time);
            let success_rate_score = state.metrics.ema_success_rate.unwrap_or(0.5).clamp(0.0, 1.0);
            let availability_score = state.metrics.ema_availability.unwrap_or(0.5).clamp(0.0, 1.0);
            let cost_efficiency_score = sub_score_cost(state.metrics.ema_cost, &peer_costs);
            let load_balance_score = sub_score_load_balance(
                state.request_count,
                total_requests,
                provider_count,
            );
            let trend = trend_score_from_samples(&state.samples, self.config.trend_window);

            let performance_score = response_time_score * self.config.response_time_weight
                + success_rate_score * self.config.performance_weight
                + availability_score * self.config.availability_weight
                + cost_efficiency_score * self.config.cost_weight
                + load_balance_score * self.config.load_balance_weight;

            state.metrics.performance_score = performance_score;
            state.metrics.trend_score = trend;
            state.metrics.load_balance_score = load_balance_score;

            let trend_factor = 0.8 + trend * 0.4;
            let target =
                clamp_weight(state.metrics.base_weight * performance_score * trend_factor, &self.config);
            let old_weight = state.metrics.current_weight;
            let damped = old_weight + self.config.adjustment_sensitivity * (target - old_weight);
            let new_weight = clamp_weight(damped, &self.config);
            state.metrics.current_weight = new_weight;
            state.metrics.last_updated = Utc::now();

            (old_weight, new_weight, performance_score, trend, load_balance_score)
        };

        if (new_weight - old_weight).abs() > 0.05 {
            self.record_event(
                provider_name,
                old_weight,
                new_weight,
                "performance",
                format!(
                    "performance_score={performance_score:.3} trend_score={trend:.3} load_balance_score={load_balance:.3}"
                ),
            )
            .await;
        }
    }

    async fn global_rebalance(&self, names: &[String]) {
        if names.len() < 2 {
            return;
        }
        let total_weight: f64 = {
            let providers = self.providers.read().await;
            providers.values().map(|s| s.metrics.current_weight).sum()
        };
        if total_weight <= 0.0 {
            return;
        }
        let expected_share = 1.0 / names.len() as f64;

        let shares: HashMap<String, f64> = {
            let providers = self.providers.read().await;
            names
                .iter()
                .filter_map(|name| {
                    providers
                        .get(name)
                        .map(|s| (name.clone(), s.metrics.current_weight / total_weight))
                })
                .collect()
        };

        let max_deviation = shares
            .values()
            .map(|share| (share - expected_share).abs())
            .fold(0.0_f64, f64::max);
        if max_deviation <= self.config.rebalance_threshold {
            return;
        }

        for name in names {
            let Some(&share) = shares.get(name) else {
                continue;
            };
            let factor = 1.0 + (expected_share - share) * 0.1;
            let old_weight = {
                let providers = self.providers.read().await;
                match providers.get(name) {
                    Some(s) => s.metrics.current_weight,
                    None => continue,
                }
            };
            let new_weight = clamp_weight(old_weight * factor, &self.config);
            if (new_weight - old_weight).abs() <= 0.01 {
                continue;
            }
            {
                let mut providers = self.providers.write().await;
                if let Some(state) = providers.get_mut(name) {
                    state.metrics.current_weight = new_weight;
                    state.metrics.last_updated = Utc::now();
                }
            }
            self.record_event(
                name,
                old_weight,
                new_weight,
                "rebalance",
                format!("share={share:.3} expected={expected_share:.3}"),
            )
            .await;
        }
    }

    pub fn spawn_loop(self: &Arc<Self>) {
        let manager = self.clone();
        let guard = manager.task.try_write();
        if let Ok(mut slot) = guard {
            let handle = tokio::spawn({
                let manager = manager.clone();
                async move {
                    let mut interval = tokio::time::interval(manager.config.rebalance_interval);
                    loop {
                        interval.tick().await;
                        manager.rebalance().await;
                    }
                }
            });
            if let Some(old) = slot.replace(handle) {
                old.abort();
                warn!("weight manager loop restarted while a prior loop was running");
            } else {
                info!(
                    interval_secs = manager.config.rebalance_interval.as_secs(),
                    "weight manager loop started"
                );
            }
        }
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.task.write().await.take() {
            handle.abort();
        }
    }

    /// Persist every provider's `WeightMetrics` as `<dir>/<provider>.json`.
    /// Best-effort: a failure to write one provider's file is logged and
    /// skipped rather than aborting the whole checkpoint.
    pub async fn checkpoint(&self, dir: &Path) -> std::io::Result<()> {
        tokio::fs::create_dir_all(dir).await?;
        let providers = self.providers.read().await;
        for (name, state) in providers.iter() {
            let path = checkpoint_path(dir, name);
            let checkpoint = Checkpoint {
                metrics: state.metrics.clone(),
            };
            match serde_json::to_vec_pretty(&checkpoint) {
                Ok(bytes) => {
                    if let Err(e) = tokio::fs::write(&path, bytes).await {
                        warn!(provider = name.as_str(), error = %e, "failed to write weight checkpoint");
                    }
                }
                Err(e) => warn!(provider = name.as_str(), error = %e, "failed to serialize weight checkpoint"),
            }
        }
        Ok(())
    }

    /// Restore a provider's `current_weight`/EMAs from a prior checkpoint if
    /// one exists. Called right after `register`; a missing or unreadable
    /// file just leaves the freshly-registered defaults in place.
    pub async fn restore(&self, dir: &Path, provider_name: &str) {
        let path = checkpoint_path(dir, provider_name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(_) => return,
        };
        let checkpoint: Checkpoint = match serde_json::from_slice(&bytes) {
            Ok(c) => c,
            Err(e) => {
                warn!(provider = provider_name, error = %e, "ignoring corrupt weight checkpoint");
                return;
            }
        };
        let mut providers = self.providers.write().await;
        if let Some(state) = providers.get_mut(provider_name) {
            state.metrics = checkpoint.metrics;
        }
    }
}

fn checkpoint_path(dir: &Path, provider_name: &str) -> PathBuf {
    dir.join(format!("{provider_name}.json"))
}

fn sub_score_response_time(ema: Option<f64>) -> f64 {
    let Some(ema) = ema else { return 0.5 };
    let normalized = ema.clamp(0.5, 10.0);
    (1.0 - (normalized - 0.5) / 9.5).clamp(0.0, 1.0)
}

fn sub_score_cost(ema_cost: Option<f64>, peer_costs: &[(String, f64)]) -> f64 {
    let Some(ema_cost) = ema_cost else { return 0.5 };
    let mut all: Vec<f64> = peer_costs.iter().map(|(_, c)| *c).collect();
    all.push(ema_cost);
    if all.len() <= 1 {
        return 0.5;
    }
    let min_cost = all.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_cost = all.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (max_cost - min_cost).abs() < f64::EPSILON {
        return 0.5;
    }
    (1.0 - (ema_cost - min_cost) / (max_cost - min_cost)).clamp(0.0, 1.0)
}

fn providers_costs_excluding(
    providers: &HashMap<String, ProviderState>,
    exclude: &str,
) -> Vec<(String, f64)> {
    providers
        .iter()
        .filter(|(name, _)| name.as_str() != exclude)
        .filter_map(|(name, state)| state.metrics.ema_cost.map(|c| (name.clone(), c)))
        .collect()
}

fn sub_score_load_balance(provider_requests: u64, total_requests: u64, provider_count: usize) -> f64 {
    if provider_count <= 1 {
        return 1.0;
    }
    if total_requests == 0 {
        return 0.5;
    }
    let expected_share = 1.0 / provider_count as f64;
    let actual_share = provider_requests as f64 / total_requests as f64;
    let deviation = (actual_share - expected_share).abs();
    (1.0 - deviation / expected_share).max(0.0)
}

fn trend_score_from_samples(samples: &VecDeque<Outcome>, window: usize) -> f64 {
    if samples.len() < window {
        return 0.5;
    }
    let recent: Vec<&Outcome> = samples.iter().rev().take(window).collect();
    let index: Vec<f64> = (0..recent.len()).map(|i| i as f64).collect();
    let successes: Vec<f64> = recent.iter().map(|o| if o.success { 1.0 } else { 0.0 }).collect();
    let response_times: Vec<f64> = recent.iter().map(|o| -o.response_time).collect();
    let success_trend = crate::score::pearson_correlation(&index, &successes);
    let response_trend = crate::score::pearson_correlation(&index, &response_times);
    (0.5 + (success_trend + response_trend) / 4.0).clamp(0.0, 1.0)
}

/// Returns `Some((kind, multiplicative_factor, reason))` for the first
/// trigger that fires, evaluated over the last `TRIGGER_WINDOW` outcomes.
/// Needs at least `MIN_TRIGGER_SAMPLES` to avoid reacting to noise.
fn check_immediate_trigger(
    state: &ProviderState,
    _config: &WeightConfig,
) -> Option<(&'static str, f64, String)> {
    let recent: Vec<&Outcome> = state.samples.iter().rev().take(TRIGGER_WINDOW).collect();
    if recent.len() < MIN_TRIGGER_SAMPLES {
        return None;
    }

    let recent_success_rate =
        recent.iter().filter(|o| o.success).count() as f64 / recent.len() as f64;
    let recent_response_time =
        recent.iter().map(|o| o.response_time).sum::<f64>() / recent.len() as f64;
    let recent_availability =
        recent.iter().map(|o| o.availability).sum::<f64>() / recent.len() as f64;

    if let Some(baseline) = state.metrics.ema_success_rate {
        if recent_success_rate < baseline - 0.2 {
            return Some((
                "performance_degradation",
                0.8,
                format!("recent success rate {recent_success_rate:.2} below baseline {baseline:.2} - 0.2"),
            ));
        }
    }
    if let Some(baseline) = state.metrics.ema_availability {
        if recent_availability < baseline - 0.2 {
            return Some((
                "availability_drop",
                0.7,
                format!("recent availability {recent_availability:.2} below baseline {baseline:.2} - 0.2"),
            ));
        }
    }
    if let Some(baseline) = state.metrics.ema_response_time {
        if recent_response_time > baseline * 1.3 {
            return Some((
                "response_time_spike",
                0.9,
                format!("recent response time {recent_response_time:.2}s exceeds baseline*1.3 ({:.2}s)", baseline * 1.3),
            ));
        }
    }
    None
}
