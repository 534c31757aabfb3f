//! Intelligent Router: given a request, derives its characteristics, picks a
//! selector, resolves candidates, and reorders them by a score combining the
//! Score Calculator's composite with request-driven adjustments.
//!
//! Candidate ranking is request-feature-driven rather than a single fixed
//! strategy picked over a preconfigured provider list: every request is
//! profiled (complexity, task type, cost sensitivity) and that profile feeds
//! the scoring weights used to reorder candidates.

use crate::alias::AliasResolver;
use crate::geo::GeoRouter;
use crate::health::HealthMonitor;
use crate::models::{Candidate as RankedCandidate, Complexity, GenerationRequest};
use crate::pattern::{Complexity as PatternComplexity, PatternAdvisor, PatternKey, TaskType};
use crate::pool::ProviderConnectionPool;
use crate::score::{self, Sample, ScoreInputs, ScoreWeights};
use crate::weight::WeightManager;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

const SAMPLE_WINDOW: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostSensitivity {
    High,
    Medium,
    Low,
}

/// The request-characteristic analysis step: complexity, task type, and
/// cost sensitivity derived from the incoming request.
#[derive(Debug, Clone, Copy)]
pub struct RequestProfile {
    pub complexity: Complexity,
    pub urgency_high: bool,
    pub cost_sensitivity: CostSensitivity,
    pub quality_requirement_high: bool,
}

const URGENT_TASK_TYPES: &[&str] = &["triage", "outcome_detection", "sentiment_analysis"];
const QUALITY_TASK_TYPES: &[&str] = &["critique", "refinement"];

pub fn analyze_request(request: &GenerationRequest) -> RequestProfile {
    let complexity = request
        .complexity
        .unwrap_or_else(|| Complexity::from_prompt_len(request.prompt.len()));

    let urgency_high = request
        .task_type
        .as_deref()
        .map(|t| URGENT_TASK_TYPES.contains(&t))
        .unwrap_or(false);

    let cost_sensitivity = if urgency_high || complexity == Complexity::Simple {
        CostSensitivity::High
    } else if complexity == Complexity::Complex {
        CostSensitivity::Low
    } else {
        CostSensitivity::Medium
    };

    let quality_requirement_high = complexity == Complexity::Complex
        || request
            .task_type
            .as_deref()
            .map(|t| QUALITY_TASK_TYPES.contains(&t))
            .unwrap_or(false);

    RequestProfile {
        complexity,
        urgency_high,
        cost_sensitivity,
        quality_requirement_high,
    }
}

fn classify_task_type(task_type: Option<&str>) -> TaskType {
    match task_type {
        Some("code" | "code_generation") => TaskType::Code,
        Some("critique" | "refinement" | "reasoning" | "triage" | "outcome_detection") => {
            TaskType::Reasoning
        }
        Some("creative" | "storytelling") => TaskType::Creative,
        Some("chat" | "sentiment_analysis") => TaskType::Chat,
        Some(_) => TaskType::Other,
        None => TaskType::Other,
    }
}

fn classify_pattern_complexity(complexity: Complexity) -> PatternComplexity {
    match complexity {
        Complexity::Simple => PatternComplexity::Simple,
        Complexity::Medium => PatternComplexity::Moderate,
        Complexity::Complex => PatternComplexity::Complex,
    }
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// `task_type -> alias_name`, from the config file's `task_routing` key.
    pub task_routing: HashMap<String, String>,
    pub cost_optimization: bool,
    /// Providers flagged as "high-quality" in configuration.
    pub high_quality_providers: HashSet<String>,
    pub score_weights: ScoreWeights,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            task_routing: HashMap::new(),
            cost_optimization: false,
            high_quality_providers: HashSet::new(),
            score_weights: ScoreWeights::default(),
        }
    }
}

/// Select the selector string: the request's task type resolved through
/// `task_routing` to an alias name, falling back to the request's model.
pub fn select_selector(
    config: &RouterConfig,
    request: &GenerationRequest,
    profile: &RequestProfile,
    user_selector: Option<&str>,
) -> String {
    if let Some(task_type) = request.task_type.as_deref() {
        if let Some(alias) = config.task_routing.get(task_type) {
            return alias.clone();
        }
    }
    if config.cost_optimization {
        match profile.complexity {
            Complexity::Simple => return "cheapest".to_string(),
            Complexity::Complex => return "best".to_string(),
            Complexity::Medium => {}
        }
    }
    user_selector.unwrap_or("balanced").to_string()
}

struct RawSample {
    timestamp: DateTime<Utc>,
    response_time: f64,
    success: bool,
    cost: f64,
    availability: f64,
}

#[derive(Default)]
struct ProviderSamples {
    samples: VecDeque<RawSample>,
}

impl ProviderSamples {
    fn record(&mut self, response_time: f64, success: bool, cost: f64, availability: f64) {
        if self.samples.len() >= SAMPLE_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(RawSample {
            timestamp: Utc::now(),
            response_time,
            success,
            cost,
            availability,
        });
    }

    fn mean_cost(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|s| s.cost).sum::<f64>() / self.samples.len() as f64
    }

    fn to_score_samples(&self, now: DateTime<Utc>) -> Vec<Sample> {
        self.samples
            .iter()
            .map(|s| Sample {
                response_time: s.response_time,
                success: s.success,
                age_hours: (now - s.timestamp).num_seconds().max(0) as f64 / 3600.0,
            })
            .collect()
    }

    fn availabilities(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.availability).collect()
    }
}

/// Maintains each provider's own rolling performance history, independent
/// of the Weight Manager's EMAs, so percentiles come from real recent
/// samples rather than being derived from a single scalar EMA.
pub struct ScoreTracker {
    providers: RwLock<HashMap<String, ProviderSamples>>,
}

impl ScoreTracker {
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, provider_name: &str) {
        self.providers
            .write()
            .await
            .entry(provider_name.to_string())
            .or_default();
    }

    pub async fn unregister(&self, provider_name: &str) {
        self.providers.write().await.remove(provider_name);
    }

    pub async fn record_outcome(&self, provider_name: &str, response_time: f64, success: bool, cost: f64, availability: f64) {
        let mut providers = self.providers.write().await;
        providers
            .entry(provider_name.to_string())
            .or_default()
            .record(response_time, success, cost, availability);
    }

    async fn composite_score(&self, provider_name: &str, peer_names: &[String], weights: &ScoreWeights) -> f64 {
        let providers = self.providers.read().await;
        let Some(own) = providers.get(provider_name) else {
            return 0.5;
        };

        let peer_costs: Vec<f64> = peer_names
            .iter()
            .filter(|name| name.as_str() != provider_name)
            .filter_map(|name| providers.get(name).map(|p| p.mean_cost()))
            .collect();

        let now = Utc::now();
        let samples = own.to_score_samples(now);
        let availabilities = own.availabilities();
        let inputs = ScoreInputs {
            samples: &samples,
            cost_per_request: own.mean_cost(),
            peer_costs: &peer_costs,
            availabilities: &availabilities,
        };
        let components = score::compute_components(&inputs);
        score::composite(&components, weights)
    }
}

impl Default for ScoreTracker {
    fn default() -> Self {
        Self::new()
    }
}

pub struct IntelligentRouter {
    config: RouterConfig,
    alias_resolver: Arc<AliasResolver>,
    score_tracker: ScoreTracker,
    weight_manager: Arc<WeightManager>,
    health_monitor: Arc<HealthMonitor>,
    pool: Arc<ProviderConnectionPool>,
    geo_router: Option<GeoRouter>,
    pattern_advisor: Option<Arc<PatternAdvisor>>,
}

impl IntelligentRouter {
    pub fn new(
        config: RouterConfig,
        alias_resolver: Arc<AliasResolver>,
        weight_manager: Arc<WeightManager>,
        health_monitor: Arc<HealthMonitor>,
        pool: Arc<ProviderConnectionPool>,
        geo_router: Option<GeoRouter>,
        pattern_advisor: Option<Arc<PatternAdvisor>>,
    ) -> Self {
        Self {
            config,
            alias_resolver,
            score_tracker: ScoreTracker::new(),
            weight_manager,
            health_monitor,
            pool,
            geo_router,
            pattern_advisor,
        }
    }

    pub async fn register_provider(&self, provider_name: &str) {
        self.score_tracker.register(provider_name).await;
    }

    pub async fn unregister_provider(&self, provider_name: &str) {
        self.score_tracker.unregister(provider_name).await;
    }

    /// Feed a completed dispatch outcome into this router's own performance
    /// history, alongside whatever the Weight Manager and Health Monitor
    /// separately record from the same outcome.
    pub async fn record_outcome(&self, provider_name: &str, response_time: f64, success: bool, cost: f64, availability: f64) {
        self.score_tracker
            .record_outcome(provider_name, response_time, success, cost, availability)
            .await;
    }

    /// The Weight Manager's EMA-smoothed per-request cost, 0.0 for a
    /// provider with no recorded outcomes yet.
    async fn ema_cost(&self, provider_name: &str) -> f64 {
        self.weight_manager
            .metrics(provider_name)
            .await
            .and_then(|m| m.ema_cost)
            .unwrap_or(0.0)
    }

    pub async fn route(
        &self,
        request: &GenerationRequest,
        user_selector: Option<&str>,
        client_ip: Option<IpAddr>,
    ) -> Vec<RankedCandidate> {
        let profile = analyze_request(request);
        let selector = select_selector(&self.config, request, &profile, user_selector);
        let candidates = self.alias_resolver.resolve(&selector).await;

        let candidates = match &self.geo_router {
            Some(geo) => geo.filter(candidates, client_ip),
            None => candidates,
        };

        if candidates.is_empty() {
            return Vec::new();
        }

        let peer_names: Vec<String> = candidates.iter().map(|c| c.provider_name.clone()).collect();

        let min_ema_cost = {
            let mut costs = Vec::with_capacity(peer_names.len());
            for name in &peer_names {
                costs.push(self.ema_cost(name).await);
            }
            costs.into_iter().fold(f64::INFINITY, f64::min)
        };

        let pattern_key = PatternKey {
            task_type: classify_task_type(request.task_type.as_deref()),
            complexity: classify_pattern_complexity(profile.complexity),
        };

        let mut scored: Vec<RankedCandidate> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let base = self
                .score_tracker
                .composite_score(&candidate.provider_name, &peer_names, &self.config.score_weights)
                .await
                * 100.0;
            let mut adjusted = base;

            if profile.urgency_high {
                if let Some(metrics) = self.weight_manager.metrics(&candidate.provider_name).await {
                    if metrics.ema_response_time.map(|rt| rt < 2.0).unwrap_or(false) {
                        adjusted *= 1.3;
                    }
                }
            }

            if profile.quality_requirement_high && self.config.high_quality_providers.contains(&candidate.provider_name) {
                adjusted *= 1.3;
            }

            if profile.cost_sensitivity == CostSensitivity::High {
                let own_cost = self.ema_cost(&candidate.provider_name).await;
                if (own_cost - min_ema_cost).abs() < f64::EPSILON {
                    adjusted *= 1.4;
                }
            }

            let unavailable = !self.health_monitor.is_available(&candidate.provider_name).await;
            let pool_full = !self.pool.has_capacity(&candidate.provider_name).await;
            if unavailable || pool_full {
                adjusted -= 50.0;
            }

            if let Some(advisor) = &self.pattern_advisor {
                adjusted += advisor.nudge(pattern_key, &candidate.provider_name).await * 100.0;
            }

            scored.push(RankedCandidate {
                provider_name: candidate.provider_name,
                model_id: candidate.model_id,
                priority: 0,
                score: adjusted,
            });
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::{AliasConfig, AliasEntry};
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::health::HealthMonitorConfig;
    use crate::weight::WeightConfig;

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest::new(prompt)
    }

    #[test]
    fn short_prompt_with_no_task_type_is_low_urgency_high_cost_sensitivity() {
        let profile = analyze_request(&request("hi"));
        assert_eq!(profile.complexity, Complexity::Simple);
        assert!(!profile.urgency_high);
        assert_eq!(profile.cost_sensitivity, CostSensitivity::High);
    }

    #[test]
    fn triage_task_type_is_urgent() {
        let mut req = request("short");
        req.task_type = Some("triage".to_string());
        let profile = analyze_request(&req);
        assert!(profile.urgency_high);
        assert_eq!(profile.cost_sensitivity, CostSensitivity::High);
    }

    #[test]
    fn long_prompt_is_complex_and_quality_sensitive() {
        let profile = analyze_request(&request(&"x".repeat(2000)));
        assert_eq!(profile.complexity, Complexity::Complex);
        assert!(profile.quality_requirement_high);
        assert_eq!(profile.cost_sensitivity, CostSensitivity::Low);
    }

    #[test]
    fn task_routing_table_takes_priority_over_cost_optimization() {
        let mut config = RouterConfig {
            cost_optimization: true,
            ..RouterConfig::default()
        };
        config.task_routing.insert("critique".to_string(), "powerful".to_string());
        let mut req = request(&"x".repeat(2000));
        req.task_type = Some("critique".to_string());
        let profile = analyze_request(&req);
        let selector = select_selector(&config, &req, &profile, None);
        assert_eq!(selector, "powerful");
    }

    #[test]
    fn cost_optimization_picks_cheapest_for_simple_requests() {
        let config = RouterConfig {
            cost_optimization: true,
            ..RouterConfig::default()
        };
        let req = request("hi");
        let profile = analyze_request(&req);
        let selector = select_selector(&config, &req, &profile, None);
        assert_eq!(selector, "cheapest");
    }

    async fn build_router() -> IntelligentRouter {
        let mut aliases = HashMap::new();
        aliases.insert(
            "balanced".to_string(),
            vec![
                AliasEntry {
                    provider_name: "anthropic".to_string(),
                    model_id: "claude".to_string(),
                    priority: 1,
                    registration_order: 0,
                },
                AliasEntry {
                    provider_name: "openai".to_string(),
                    model_id: "gpt".to_string(),
                    priority: 2,
                    registration_order: 1,
                },
            ],
        );
        let alias_resolver = Arc::new(AliasResolver::new(AliasConfig { aliases }));
        alias_resolver.on_provider_registered("anthropic", vec![]).await;
        alias_resolver.on_provider_registered("openai", vec![]).await;

        let weight_manager = Arc::new(WeightManager::new(WeightConfig::default()));
        weight_manager.register("anthropic", 1.0).await;
        weight_manager.register("openai", 1.0).await;

        let health_monitor = Arc::new(HealthMonitor::new(HealthMonitorConfig {
            circuit_breaker: CircuitBreakerConfig::default(),
            ..HealthMonitorConfig::default()
        }));
        health_monitor.register("anthropic").await;
        health_monitor.register("openai").await;
        health_monitor
            .record_outcome("anthropic", true, std::time::Duration::from_millis(200), None, false)
            .await;
        health_monitor
            .record_outcome("openai", true, std::time::Duration::from_millis(200), None, false)
            .await;

        let pool = Arc::new(ProviderConnectionPool::new());

        let router = IntelligentRouter::new(
            RouterConfig::default(),
            alias_resolver,
            weight_manager,
            health_monitor,
            pool,
            None,
            None,
        );
        router.register_provider("anthropic").await;
        router.register_provider("openai").await;
        router
    }

    #[tokio::test]
    async fn routing_a_balanced_request_returns_both_candidates_scored() {
        let router = build_router().await;
        let candidates = router.route(&request("hello"), None, None).await;
        assert_eq!(candidates.len(), 2);
    }

    #[tokio::test]
    async fn unhealthy_provider_is_penalized_below_a_healthy_peer() {
        let router = build_router().await;
        router
            .record_outcome("anthropic", 0.2, true, 0.001, 1.0)
            .await;
        router
            .record_outcome("openai", 0.2, true, 0.001, 1.0)
            .await;
        router
            .health_monitor
            .record_outcome("openai", false, std::time::Duration::from_secs(1), Some("boom".into()), true)
            .await;

        let candidates = router.route(&request("hello"), None, None).await;
        let anthropic_rank = candidates.iter().position(|c| c.provider_name == "anthropic").unwrap();
        let openai_rank = candidates.iter().position(|c| c.provider_name == "openai").unwrap();
        assert!(anthropic_rank < openai_rank);
    }
}
