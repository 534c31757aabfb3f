//! Gateway: the single composed value owning every provider, subsystem, and
//! background task. Registration is data-driven from [`GatewayConfig`], not
//! a fluent builder — every provider comes from one config file, not ad hoc
//! `.with_openai(key)` calls. There is one gateway service, not a
//! standalone/gateway mode distinction with a separate builder fleet per
//! mode.

use crate::alias::{AliasConfig, AliasResolver, ModelEntry};
use crate::dispatcher::{Dispatcher, DispatcherConfig};
use crate::geo::{GeoRouter, Region};
use crate::health::{HealthMonitor, HealthMonitorConfig};
use crate::models::{DispatchMethod, GenerationRequest, GenerationResponse, ModelMetadata};
use crate::pattern::{PatternAdvisor, PatternConfig};
use crate::pool::ProviderConnectionPool;
use crate::prober::{LatencyProber, LatencyProberConfig};
use crate::provider::{Provider, ProviderConfig};
use crate::providers::create_provider;
use crate::router::{IntelligentRouter, RouterConfig};
use crate::score::ScoreWeights;
use crate::weight::{WeightConfig, WeightManager};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// One provider's static configuration plus the models it advertises, as
/// read from the config file's `providers.<name>` block.
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    pub config: ProviderConfig,
    pub models: Vec<ModelMetadata>,
}

pub struct GatewayConfig {
    pub providers: Vec<ProviderSpec>,
    pub aliases: AliasConfig,
    pub task_routing: HashMap<String, String>,
    pub cost_optimization: bool,
    pub fallback_enabled: bool,
    pub dispatch_timeout: std::time::Duration,
    pub health: HealthMonitorConfig,
    pub weight: WeightConfig,
    pub score_weights: ScoreWeights,
    pub pattern: PatternConfig,
    pub prober: Option<LatencyProberConfig>,
    pub weight_checkpoint_dir: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            aliases: AliasConfig::default(),
            task_routing: HashMap::new(),
            cost_optimization: false,
            fallback_enabled: true,
            dispatch_timeout: std::time::Duration::from_secs(60),
            health: HealthMonitorConfig::default(),
            weight: WeightConfig::default(),
            score_weights: ScoreWeights::default(),
            pattern: PatternConfig::default(),
            prober: None,
            weight_checkpoint_dir: None,
        }
    }
}

pub struct Gateway {
    providers: Arc<RwLock<HashMap<String, Arc<dyn Provider>>>>,
    pool: Arc<ProviderConnectionPool>,
    health_monitor: Arc<HealthMonitor>,
    weight_manager: Arc<WeightManager>,
    alias_resolver: Arc<AliasResolver>,
    router: Arc<IntelligentRouter>,
    dispatcher: Arc<Dispatcher>,
    prober: Option<Arc<LatencyProber>>,
    weight_checkpoint_dir: Option<PathBuf>,
}

impl Gateway {
    /// Build a gateway from configuration. A provider that fails to
    /// construct or initialize is skipped and logged, never fatal.
    pub async fn new(config: GatewayConfig) -> Self {
        let providers: Arc<RwLock<HashMap<String, Arc<dyn Provider>>>> = Arc::new(RwLock::new(HashMap::new()));
        let pool = Arc::new(ProviderConnectionPool::new());
        let health_monitor = Arc::new(HealthMonitor::new(config.health));
        let weight_manager = Arc::new(WeightManager::new(config.weight));
        let alias_resolver = Arc::new(AliasResolver::new(config.aliases));
        let pattern_advisor = Arc::new(PatternAdvisor::new(config.pattern));

        let mut high_quality_providers = HashSet::new();
        let mut regions: HashMap<String, Region> = HashMap::new();

        for spec in config.providers {
            if !spec.config.enabled {
                continue;
            }
            let provider_name = spec.config.name.clone();

            let provider = match create_provider(spec.config.clone(), spec.models.clone()) {
                Ok(provider) => provider,
                Err(err) => {
                    warn!(provider = provider_name, error = %err, "provider construction failed, skipping");
                    continue;
                }
            };
            if !provider.initialize().await {
                warn!(provider = provider_name, "provider initialization failed, skipping");
                continue;
            }

            if spec.config.high_quality {
                high_quality_providers.insert(provider_name.clone());
            }
            if let Some(region) = &spec.config.region {
                regions.insert(provider_name.clone(), Region::from_config_str(region));
            }

            pool.register(&provider_name, spec.config.max_pool_size).await;
            health_monitor.register(&provider_name).await;
            weight_manager.register(&provider_name, 1.0).await;

            let model_entries: Vec<ModelEntry> = spec
                .models
                .iter()
                .map(|m| ModelEntry {
                    provider_name: provider_name.clone(),
                    model_id: m.model_id.clone(),
                })
                .collect();
            alias_resolver.on_provider_registered(&provider_name, model_entries).await;

            if let Some(dir) = &config.weight_checkpoint_dir {
                weight_manager.restore(dir, &provider_name).await;
            }

            providers.write().await.insert(provider_name.clone(), Arc::from(provider));
            info!(provider = provider_name, "provider registered");
        }

        let router_config = RouterConfig {
            task_routing: config.task_routing,
            cost_optimization: config.cost_optimization,
            high_quality_providers,
            score_weights: config.score_weights,
        };
        let geo_router = Some(GeoRouter::new(regions));
        let router = Arc::new(IntelligentRouter::new(
            router_config,
            alias_resolver.clone(),
            weight_manager.clone(),
            health_monitor.clone(),
            pool.clone(),
            geo_router,
            Some(pattern_advisor),
        ));
        for name in providers.read().await.keys() {
            router.register_provider(name).await;
        }

        let dispatcher = Arc::new(Dispatcher::new(
            DispatcherConfig {
                timeout: config.dispatch_timeout,
                fallback_enabled: config.fallback_enabled,
            },
            providers.clone(),
            router.clone(),
            pool.clone(),
            health_monitor.clone(),
            weight_manager.clone(),
        ));

        let prober = config.prober.map(|prober_config| Arc::new(LatencyProber::new(prober_config, weight_manager.clone())));

        Self {
            providers,
            pool,
            health_monitor,
            weight_manager,
            alias_resolver,
            router,
            dispatcher,
            prober,
            weight_checkpoint_dir: config.weight_checkpoint_dir,
        }
    }

    pub async fn dispatch(
        &self,
        request: &GenerationRequest,
        selector: Option<&str>,
        method: DispatchMethod,
        client_ip: Option<IpAddr>,
    ) -> GenerationResponse {
        self.dispatcher.dispatch(request, selector, method, client_ip).await
    }

    /// Start every periodic background task. Idempotent per task: calling
    /// twice just replaces each loop.
    pub fn start_background_tasks(self: &Arc<Self>) {
        self.health_monitor.spawn_loop(self.providers.clone());
        self.weight_manager.spawn_loop();
        if let Some(prober) = &self.prober {
            prober.spawn_loop(self.providers.clone());
        }
        info!("gateway background tasks started");
    }

    pub async fn stop_background_tasks(&self) {
        self.health_monitor.stop().await;
        self.weight_manager.stop().await;
        if let Some(prober) = &self.prober {
            prober.stop().await;
        }
        if let Some(dir) = &self.weight_checkpoint_dir {
            if let Err(err) = self.weight_manager.checkpoint(dir).await {
                warn!(error = %err, "failed to checkpoint weight manager state on shutdown");
            }
        }
        info!("gateway background tasks stopped");
    }

    pub async fn registered_providers(&self) -> Vec<String> {
        self.providers.read().await.keys().cloned().collect()
    }

    pub async fn provider_health(&self, provider_name: &str) -> Option<crate::health::HealthState> {
        self.health_monitor.state(provider_name).await
    }

    pub async fn provider_weight(&self, provider_name: &str) -> Option<f64> {
        self.weight_manager.current_weight(provider_name).await
    }

    pub async fn provider_metrics(&self, provider_name: &str) -> Option<crate::weight::WeightMetrics> {
        self.weight_manager.metrics(provider_name).await
    }

    pub async fn provider_active_connections(&self, provider_name: &str) -> usize {
        self.pool.active(provider_name).await
    }

    pub fn alias_resolver(&self) -> Arc<AliasResolver> {
        self.alias_resolver.clone()
    }
}
