//! Three-state circuit breaker (closed / open / half-open) per a provider.
//!
//! This type owns only the breaker state machine; the Health Monitor owns
//! the surrounding `HealthState` (status, consecutive failures, last probe
//! time) and drives this type's transitions from its probe loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_duration_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration_secs: 300,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    failure_count: u32,
    open_until: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            open_until: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn open_until(&self) -> Option<DateTime<Utc>> {
        self.open_until
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Rule 1: while open and not yet past `open_until`, the probe is
    /// skipped entirely and the provider is reported unhealthy.
    pub fn should_skip_probe(&self, now: DateTime<Utc>) -> bool {
        self.state == CircuitState::Open && self.open_until.is_some_and(|t| now < t)
    }

    /// Rule 2: once past `open_until`, move to half-open and let the caller
    /// run one probe.
    pub fn admit_probe(&mut self, now: DateTime<Utc>) {
        if self.state == CircuitState::Open && self.open_until.is_some_and(|t| now >= t) {
            self.state = CircuitState::HalfOpen;
        }
    }

    /// Apply the outcome of a probe (or a dispatch outcome) to the breaker.
    /// `trip_immediately` bypasses the failure threshold — used for
    /// `auth_failed`, which trips on a single failure.
    pub fn record_outcome(&mut self, success: bool, now: DateTime<Utc>, trip_immediately: bool) {
        if success {
            self.failure_count = 0;
            self.state = CircuitState::Closed;
            return;
        }

        self.failure_count += 1;
        let threshold_hit = self.failure_count >= self.config.failure_threshold;
        if (threshold_hit || trip_immediately)
            && matches!(self.state, CircuitState::Closed | CircuitState::HalfOpen)
        {
            self.state = CircuitState::Open;
            self.open_until =
                Some(now + chrono::Duration::seconds(self.config.open_duration_secs as i64));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            open_duration_secs: 60,
        }
    }

    #[test]
    fn opens_after_threshold_failures() {
        let mut cb = CircuitBreaker::new(cfg());
        let now = Utc::now();
        for _ in 0..2 {
            cb.record_outcome(false, now, false);
            assert_eq!(cb.state(), CircuitState::Closed);
        }
        cb.record_outcome(false, now, false);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.open_until().is_some());
    }

    #[test]
    fn single_immediate_trip_opens_regardless_of_threshold() {
        let mut cb = CircuitBreaker::new(cfg());
        cb.record_outcome(false, Utc::now(), true);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_failure_reopens_with_fresh_deadline() {
        let mut cb = CircuitBreaker::new(cfg());
        let t0 = Utc::now();
        cb.record_outcome(false, t0, true);
        let first_deadline = cb.open_until().unwrap();
        cb.admit_probe(first_deadline + chrono::Duration::seconds(1));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_outcome(false, first_deadline + chrono::Duration::seconds(1), false);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.open_until().unwrap() > first_deadline);
    }

    #[test]
    fn half_open_success_closes() {
        let mut cb = CircuitBreaker::new(cfg());
        let t0 = Utc::now();
        cb.record_outcome(false, t0, true);
        let deadline = cb.open_until().unwrap();
        cb.admit_probe(deadline + chrono::Duration::seconds(1));
        cb.record_outcome(true, deadline + chrono::Duration::seconds(1), false);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn skips_probe_while_open_and_not_past_deadline() {
        let mut cb = CircuitBreaker::new(cfg());
        let t0 = Utc::now();
        cb.record_outcome(false, t0, true);
        assert!(cb.should_skip_probe(t0 + chrono::Duration::seconds(1)));
        let deadline = cb.open_until().unwrap();
        assert!(!cb.should_skip_probe(deadline + chrono::Duration::seconds(1)));
    }
}
