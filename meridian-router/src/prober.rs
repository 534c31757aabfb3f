//! Latency Prober: an independent background loop that times each provider
//! out-of-band and feeds the result into the Weight Manager's EMA, separate
//! from both the Health Monitor's probe cadence and request-driven outcomes.
//!
//! Rather than timing raw HTTP HEAD requests against hardcoded vendor
//! endpoints, this reuses [`crate::provider::Provider::health_check`] as
//! the timing probe, since every adapter already implements one.

use crate::provider::Provider;
use crate::weight::WeightManager;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct LatencyProberConfig {
    pub interval: Duration,
}

impl Default for LatencyProberConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
        }
    }
}

pub struct LatencyProber {
    config: LatencyProberConfig,
    weight_manager: Arc<WeightManager>,
    task: RwLock<Option<JoinHandle<()>>>,
}

impl LatencyProber {
    pub fn new(config: LatencyProberConfig, weight_manager: Arc<WeightManager>) -> Self {
        Self {
            config,
            weight_manager,
            task: RwLock::new(None),
        }
    }

    async fn probe_one(&self, provider_name: &str, provider: &dyn Provider) {
        let outcome = provider.health_check().await;
        match outcome {
            Ok(result) => {
                self.weight_manager
                    .record_outcome(
                        provider_name,
                        result.response_time.as_secs_f64(),
                        result.success,
                        0.0,
                        if result.success { 1.0 } else { 0.0 },
                    )
                    .await;
                debug!(
                    provider = provider_name,
                    source = "prober",
                    response_time = result.response_time.as_secs_f64(),
                    "latency probe complete"
                );
            }
            Err(err) => {
                warn!(provider = provider_name, source = "prober", error = %err, "latency probe failed");
            }
        }
    }

    async fn probe_all(&self, providers: &HashMap<String, Arc<dyn Provider>>) {
        let mut handles = Vec::with_capacity(providers.len());
        for (name, provider) in providers {
            handles.push(async move {
                self.probe_one(name, provider.as_ref()).await;
            });
        }
        futures::future::join_all(handles).await;
    }

    /// Start the background probing loop, independent of the Health
    /// Monitor's own loop. Calling this twice replaces the prior loop.
    pub fn spawn_loop(self: &Arc<Self>, providers: Arc<RwLock<HashMap<String, Arc<dyn Provider>>>>) {
        let prober = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(prober.config.interval);
            loop {
                interval.tick().await;
                let snapshot = providers.read().await.clone();
                prober.probe_all(&snapshot).await;
            }
        });
        if let Ok(mut slot) = self.task.try_write() {
            if let Some(old) = slot.replace(handle) {
                old.abort();
                warn!("latency prober loop restarted while a prior loop was running");
            } else {
                info!(interval_secs = self.config.interval.as_secs(), "latency prober loop started");
            }
        }
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.task.write().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;
    use crate::weight::WeightConfig;

    #[tokio::test]
    async fn probing_a_healthy_provider_updates_its_weight_metrics() {
        let weight_manager = Arc::new(WeightManager::new(WeightConfig::default()));
        weight_manager.register("anthropic", 1.0).await;
        let prober = LatencyProber::new(LatencyProberConfig::default(), weight_manager.clone());

        let provider = MockProvider::healthy("anthropic", "claude-3-5-haiku-20241022");
        prober.probe_one("anthropic", &provider).await;

        let metrics = weight_manager.metrics("anthropic").await.unwrap();
        assert!(metrics.ema_response_time.is_some());
    }
}
