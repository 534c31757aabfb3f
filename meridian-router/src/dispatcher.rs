//! Dispatcher: walks the Intelligent Router's ranked candidate list, trying
//! each in turn until one succeeds or the list is exhausted.
//!
//! One attempt per candidate — there is no per-candidate retry loop, since
//! falling back to the next candidate fills that role — with each outcome's
//! error category reported to the Health Monitor.

use crate::error::ProviderError;
use crate::health::HealthMonitor;
use crate::models::{Capability, DispatchMethod, GenerationRequest, GenerationResponse};
use crate::pool::ProviderConnectionPool;
use crate::provider::Provider;
use crate::router::IntelligentRouter;
use crate::weight::WeightManager;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    pub timeout: Duration,
    pub fallback_enabled: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            fallback_enabled: true,
        }
    }
}

pub struct Dispatcher {
    config: DispatcherConfig,
    providers: Arc<RwLock<HashMap<String, Arc<dyn Provider>>>>,
    router: Arc<IntelligentRouter>,
    pool: Arc<ProviderConnectionPool>,
    health_monitor: Arc<HealthMonitor>,
    weight_manager: Arc<WeightManager>,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        providers: Arc<RwLock<HashMap<String, Arc<dyn Provider>>>>,
        router: Arc<IntelligentRouter>,
        pool: Arc<ProviderConnectionPool>,
        health_monitor: Arc<HealthMonitor>,
        weight_manager: Arc<WeightManager>,
    ) -> Self {
        Self {
            config,
            providers,
            router,
            pool,
            health_monitor,
            weight_manager,
        }
    }

    pub async fn dispatch(
        &self,
        request: &GenerationRequest,
        selector: Option<&str>,
        method: DispatchMethod,
        client_ip: Option<IpAddr>,
    ) -> GenerationResponse {
        let candidates = self.router.route(request, selector, client_ip).await;
        if candidates.is_empty() {
            return GenerationResponse::failure("gateway", "", "no candidates available for this request");
        }

        let mut last_error: Option<String> = None;

        for candidate in candidates {
            let provider = {
                let providers = self.providers.read().await;
                match providers.get(&candidate.provider_name) {
                    Some(p) => p.clone(),
                    None => continue,
                }
            };

            if !self.health_monitor.is_available(&candidate.provider_name).await {
                continue;
            }
            if !self.pool.has_capacity(&candidate.provider_name).await {
                continue;
            }
            if method == DispatchMethod::GenerateStructuredOutput
                && !model_supports_structured_output(provider.as_ref(), &candidate.model_id)
            {
                continue;
            }

            let Some(guard) = self.pool.acquire(&candidate.provider_name).await else {
                continue;
            };

            let start = Instant::now();
            let outcome = tokio::time::timeout(
                self.config.timeout,
                call_provider(provider.as_ref(), request, &candidate.model_id, method),
            )
            .await;
            drop(guard);
            let response_time = start.elapsed().as_secs_f64();

            let (response, provider_error) = match outcome {
                Ok(Ok(response)) => (Some(response), None),
                Ok(Err(err)) => (None, Some(err)),
                Err(_) => (None, Some(ProviderError::Timeout)),
            };

            let success = response.is_some();
            let cost = response.as_ref().map(|r| r.cost).unwrap_or(0.0);
            let error_message = provider_error.as_ref().map(|e| e.to_string());

            self.weight_manager
                .record_outcome(&candidate.provider_name, response_time, success, cost, if success { 1.0 } else { 0.0 })
                .await;
            self.router
                .record_outcome(&candidate.provider_name, response_time, success, cost, if success { 1.0 } else { 0.0 })
                .await;

            let counts_toward_trip = provider_error.as_ref().map(|e| e.counts_toward_trip()).unwrap_or(true);
            let trip_immediately = provider_error.as_ref().map(|e| e.trips_immediately()).unwrap_or(false);
            if success || counts_toward_trip {
                self.health_monitor
                    .record_outcome(
                        &candidate.provider_name,
                        success,
                        Duration::from_secs_f64(response_time),
                        error_message.clone(),
                        trip_immediately,
                    )
                    .await;
            }

            info!(
                provider = candidate.provider_name,
                model = candidate.model_id,
                response_time_ms = response_time * 1000.0,
                success,
                error = error_message.as_deref().unwrap_or(""),
                "dispatch attempt"
            );

            if let Some(response) = response {
                return response;
            }

            let kind = provider_error.as_ref().map(|e| e.kind()).unwrap_or("unknown");
            last_error = error_message;

            if !self.config.fallback_enabled {
                return GenerationResponse::failure(
                    candidate.provider_name.clone(),
                    candidate.model_id.clone(),
                    last_error.unwrap_or_else(|| kind.to_string()),
                );
            }
        }

        warn!(last_error = last_error.as_deref().unwrap_or("unknown"), "all candidates exhausted");
        GenerationResponse::gateway_failure(last_error.unwrap_or_else(|| "no upstream error recorded".to_string()))
    }
}

fn model_supports_structured_output(provider: &dyn Provider, model_id: &str) -> bool {
    provider
        .available_models()
        .into_iter()
        .find(|m| m.model_id == model_id)
        .map(|m| m.has_capability(Capability::StructuredOutput))
        .unwrap_or(false)
}

async fn call_provider(
    provider: &dyn Provider,
    request: &GenerationRequest,
    model_id: &str,
    method: DispatchMethod,
) -> Result<GenerationResponse, ProviderError> {
    match method {
        DispatchMethod::GenerateText => provider.generate_text(request, model_id).await,
        DispatchMethod::GenerateStructuredOutput => provider.generate_structured_output(request, model_id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::{AliasConfig, AliasEntry};
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::health::HealthMonitorConfig;
    use crate::providers::mock::{MockProvider, Scripted};
    use crate::router::{IntelligentRouter, RouterConfig};
    use crate::weight::WeightConfig;

    async fn build(providers: Vec<(&str, MockProvider)>, fallback_enabled: bool) -> Dispatcher {
        let mut aliases = HashMap::new();
        let entries: Vec<AliasEntry> = providers
            .iter()
            .enumerate()
            .map(|(i, (name, _))| AliasEntry {
                provider_name: name.to_string(),
                model_id: "claude".to_string(),
                priority: i as i32,
                registration_order: i,
            })
            .collect();
        aliases.insert("balanced".to_string(), entries);
        let alias_resolver = Arc::new(crate::alias::AliasResolver::new(AliasConfig { aliases }));

        let weight_manager = Arc::new(WeightManager::new(WeightConfig::default()));
        let health_monitor = Arc::new(HealthMonitor::new(HealthMonitorConfig {
            circuit_breaker: CircuitBreakerConfig::default(),
            ..HealthMonitorConfig::default()
        }));
        let pool = Arc::new(ProviderConnectionPool::new());

        let router = Arc::new(IntelligentRouter::new(
            RouterConfig::default(),
            alias_resolver.clone(),
            weight_manager.clone(),
            health_monitor.clone(),
            pool.clone(),
            None,
            None,
        ));

        let mut provider_map: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        for (name, provider) in providers {
            alias_resolver.on_provider_registered(name, vec![]).await;
            weight_manager.register(name, 1.0).await;
            health_monitor.register(name).await;
            pool.register(name, 10).await;
            router.register_provider(name).await;
            provider_map.insert(name.to_string(), Arc::new(provider));
        }

        Dispatcher::new(
            DispatcherConfig {
                timeout: Duration::from_secs(5),
                fallback_enabled,
            },
            Arc::new(RwLock::new(provider_map)),
            router,
            pool,
            health_monitor,
            weight_manager,
        )
    }

    #[tokio::test]
    async fn successful_first_candidate_short_circuits() {
        let dispatcher = build(vec![("anthropic", MockProvider::healthy("anthropic", "claude"))], true).await;
        let response = dispatcher
            .dispatch(&GenerationRequest::new("hi"), None, DispatchMethod::GenerateText, None)
            .await;
        assert!(response.is_success());
        assert_eq!(response.provider_name, "anthropic");
    }

    #[tokio::test]
    async fn rate_limited_first_candidate_falls_back_to_second() {
        let failing = MockProvider::new(
            "anthropic",
            MockProvider::healthy("anthropic", "claude").available_models(),
            vec![Scripted::Failure(ProviderError::RateLimit)],
        );
        let healthy = MockProvider::healthy("openai", "gpt");
        let dispatcher = build(vec![("anthropic", failing), ("openai", healthy)], true).await;

        let response = dispatcher
            .dispatch(&GenerationRequest::new("hi"), None, DispatchMethod::GenerateText, None)
            .await;
        assert!(response.is_success());
        assert_eq!(response.provider_name, "openai");
    }

    #[tokio::test]
    async fn no_candidates_yields_gateway_no_candidates_error() {
        let dispatcher = build(vec![], true).await;
        let response = dispatcher
            .dispatch(&GenerationRequest::new("hi"), Some("balanced"), DispatchMethod::GenerateText, None)
            .await;
        assert!(!response.is_success());
        assert_eq!(response.provider_name, "gateway");
    }

    #[tokio::test]
    async fn fallback_disabled_returns_first_failure_immediately() {
        let failing = MockProvider::new(
            "anthropic",
            MockProvider::healthy("anthropic", "claude").available_models(),
            vec![Scripted::Failure(ProviderError::UpstreamServerError)],
        );
        let healthy = MockProvider::healthy("openai", "gpt");
        let dispatcher = build(vec![("anthropic", failing), ("openai", healthy)], false).await;

        let response = dispatcher
            .dispatch(&GenerationRequest::new("hi"), None, DispatchMethod::GenerateText, None)
            .await;
        assert!(!response.is_success());
        assert_eq!(response.provider_name, "anthropic");
    }

    #[tokio::test]
    async fn every_candidate_failing_yields_gateway_failure_with_last_error() {
        let a = MockProvider::new(
            "anthropic",
            MockProvider::healthy("anthropic", "claude").available_models(),
            vec![Scripted::Failure(ProviderError::UpstreamServerError)],
        );
        let b = MockProvider::new(
            "openai",
            MockProvider::healthy("openai", "gpt").available_models(),
            vec![Scripted::Failure(ProviderError::Timeout)],
        );
        let dispatcher = build(vec![("anthropic", a), ("openai", b)], true).await;

        let response = dispatcher
            .dispatch(&GenerationRequest::new("hi"), None, DispatchMethod::GenerateText, None)
            .await;
        assert!(!response.is_success());
        assert_eq!(response.provider_name, "gateway");
        assert!(response.error.unwrap().contains("All providers failed"));
    }
}
