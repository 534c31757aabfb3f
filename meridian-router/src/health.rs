//! Health Monitor: a periodic probing loop that keeps one [`HealthState`] per
//! provider up to date and drives that provider's circuit breaker.
//!
//! Per-provider status derives from probe cadence and outcome, with circuit
//! breaker transitions living in [`crate::circuit_breaker`] instead of a
//! parallel hand-rolled state dict.

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::provider::Provider;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct HealthState {
    pub status: Status,
    pub last_probe_time: DateTime<Utc>,
    pub consecutive_failures: u32,
    pub total_errors: u64,
    pub last_error: Option<String>,
    pub response_time: f64,
    pub circuit: CircuitState,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            status: Status::Unknown,
            last_probe_time: Utc::now(),
            consecutive_failures: 0,
            total_errors: 0,
            last_error: None,
            response_time: 0.0,
            circuit: CircuitState::Closed,
        }
    }
}

pub struct HealthMonitorConfig {
    pub check_interval: Duration,
    /// `consecutive_failures` threshold below which a provider is degraded
    /// rather than unhealthy. Distinct from the circuit breaker's trip
    /// threshold.
    pub degraded_threshold: u32,
    pub healthy_response_time_secs: f64,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            degraded_threshold: 3,
            healthy_response_time_secs: 2.0,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

struct Entry {
    state: RwLock<HealthState>,
    breaker: RwLock<CircuitBreaker>,
}

/// Owns the per-provider health state and the background probe loop.
/// Registered providers are looked up by name each tick so providers can be
/// added or removed without restarting the loop.
pub struct HealthMonitor {
    config: HealthMonitorConfig,
    entries: RwLock<HashMap<String, Arc<Entry>>>,
    task: RwLock<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(config: HealthMonitorConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            task: RwLock::new(None),
        }
    }

    pub async fn register(&self, provider_name: &str) {
        let mut entries = self.entries.write().await;
        entries.entry(provider_name.to_string()).or_insert_with(|| {
            Arc::new(Entry {
                state: RwLock::new(HealthState::default()),
                breaker: RwLock::new(CircuitBreaker::new(self.config.circuit_breaker.clone())),
            })
        });
    }

    pub async fn unregister(&self, provider_name: &str) {
        self.entries.write().await.remove(provider_name);
    }

    pub async fn state(&self, provider_name: &str) -> Option<HealthState> {
        let entries = self.entries.read().await;
        let entry = entries.get(provider_name)?;
        let state = entry.state.read().await.clone();
        Some(state)
    }

    pub async fn is_available(&self, provider_name: &str) -> bool {
        matches!(
            self.state(provider_name).await.map(|s| s.status),
            Some(Status::Healthy) | Some(Status::Degraded)
        )
    }

    /// Run one probe against `provider` and apply its state update rules.
    /// Exposed directly (rather than only via the background
    /// loop) so the Dispatcher's outcome-reporting path and tests can drive
    /// the same state machine from a real dispatch outcome.
    pub async fn record_outcome(
        &self,
        provider_name: &str,
        success: bool,
        response_time: Duration,
        error: Option<String>,
        trip_immediately: bool,
    ) {
        let entry = {
            let entries = self.entries.read().await;
            match entries.get(provider_name) {
                Some(e) => e.clone(),
                None => return,
            }
        };

        let now = Utc::now();
        let mut breaker = entry.breaker.write().await;
        breaker.record_outcome(success, now, trip_immediately);
        let circuit = breaker.state();
        drop(breaker);

        let mut state = entry.state.write().await;
        state.last_probe_time = now;
        state.response_time = response_time.as_secs_f64();
        if success {
            state.consecutive_failures = 0;
            state.last_error = None;
        } else {
            state.consecutive_failures += 1;
            state.total_errors += 1;
            state.last_error = error;
        }
        state.circuit = circuit;
        state.status = derive_status(
            circuit,
            state.consecutive_failures,
            state.response_time,
            self.config.degraded_threshold,
            self.config.healthy_response_time_secs,
        );
    }

    async fn probe_one(&self, provider_name: &str, provider: &dyn Provider) {
        let entry = {
            let entries = self.entries.read().await;
            match entries.get(provider_name) {
                Some(e) => e.clone(),
                None => return,
            }
        };

        let now = Utc::now();
        let should_skip = {
            let breaker = entry.breaker.read().await;
            breaker.should_skip_probe(now)
        };
        if should_skip {
            let mut state = entry.state.write().await;
            state.status = Status::Unhealthy;
            state.last_probe_time = now;
            return;
        }

        {
            let mut breaker = entry.breaker.write().await;
            breaker.admit_probe(now);
        }

        let outcome = provider.health_check().await;
        let (success, response_time, error) = match outcome {
            Ok(result) => (result.success, result.response_time, result.error),
            Err(e) => (false, Duration::from_secs(0), Some(e.to_string())),
        };

        // A background probe failure is never an auth failure the adapter
        // couldn't already catch at `initialize`; immediate trips are
        // reserved for the Dispatcher's outcome reporting path.
        self.record_outcome(provider_name, success, response_time, error, false)
            .await;
    }

    /// Probe every registered provider concurrently. A slow probe on one
    /// provider must never delay another's.
    pub async fn probe_all(&self, providers: &HashMap<String, Arc<dyn Provider>>) {
        let names: Vec<String> = self.entries.read().await.keys().cloned().collect();
        let mut handles = Vec::with_capacity(names.len());
        for name in names {
            if let Some(provider) = providers.get(&name).cloned() {
                handles.push(async move {
                    self.probe_one(&name, provider.as_ref()).await;
                });
            }
        }
        futures::future::join_all(handles).await;
    }

    /// Start the background probing loop. Calling this twice is a no-op
    /// while a loop is already running.
    pub fn spawn_loop(self: &Arc<Self>, providers: Arc<RwLock<HashMap<String, Arc<dyn Provider>>>>) {
        let monitor = self.clone();
        let task_slot = &self.task;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.config.check_interval);
            loop {
                interval.tick().await;
                let snapshot = providers.read().await.clone();
                monitor.probe_all(&snapshot).await;
                debug!(providers = snapshot.len(), "health probe cycle complete");
            }
        });
        // Fire-and-forget write; `spawn_loop` is called once at gateway
        // startup so the blocking try_write here never contends.
        if let Ok(mut slot) = task_slot.try_write() {
            if let Some(old) = slot.replace(handle) {
                old.abort();
                warn!("health monitor loop restarted while a prior loop was running");
            } else {
                info!(interval_secs = self.config.check_interval.as_secs(), "health monitor loop started");
            }
        }
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.task.write().await.take() {
            handle.abort();
        }
    }
}

fn derive_status(
    circuit: CircuitState,
    consecutive_failures: u32,
    response_time: f64,
    degraded_threshold: u32,
    healthy_response_time_secs: f64,
) -> Status {
    if circuit == CircuitState::Open {
        Status::Unhealthy
    } else if consecutive_failures == 0 && response_time <= healthy_response_time_secs {
        Status::Healthy
    } else if consecutive_failures < degraded_threshold {
        Status::Degraded
    } else {
        Status::Unhealthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_consecutive_failures_implies_healthy_or_degraded() {
        let monitor = HealthMonitor::new(HealthMonitorConfig::default());
        monitor.register("openai").await;
        monitor
            .record_outcome("openai", true, Duration::from_millis(500), None, false)
            .await;
        let state = monitor.state("openai").await.unwrap();
        assert_eq!(state.consecutive_failures, 0);
        assert!(matches!(state.status, Status::Healthy | Status::Degraded));
    }

    #[tokio::test]
    async fn open_circuit_implies_unhealthy() {
        let monitor = HealthMonitor::new(HealthMonitorConfig {
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 1,
                open_duration_secs: 300,
            },
            ..HealthMonitorConfig::default()
        });
        monitor.register("flaky").await;
        monitor
            .record_outcome(
                "flaky",
                false,
                Duration::from_secs(1),
                Some("boom".into()),
                false,
            )
            .await;
        let state = monitor.state("flaky").await.unwrap();
        assert_eq!(state.circuit, CircuitState::Open);
        assert_eq!(state.status, Status::Unhealthy);
    }

    #[tokio::test]
    async fn slow_but_successful_response_is_degraded_not_healthy() {
        let monitor = HealthMonitor::new(HealthMonitorConfig::default());
        monitor.register("slow").await;
        monitor
            .record_outcome("slow", true, Duration::from_secs(5), None, false)
            .await;
        let state = monitor.state("slow").await.unwrap();
        assert_eq!(state.status, Status::Degraded);
    }

    #[tokio::test]
    async fn auth_failure_trips_immediately_to_unhealthy() {
        let monitor = HealthMonitor::new(HealthMonitorConfig::default());
        monitor.register("broken-key").await;
        monitor
            .record_outcome(
                "broken-key",
                false,
                Duration::from_millis(50),
                Some("auth_failed".into()),
                true,
            )
            .await;
        let state = monitor.state("broken-key").await.unwrap();
        assert_eq!(state.circuit, CircuitState::Open);
        assert_eq!(state.status, Status::Unhealthy);
    }
}
