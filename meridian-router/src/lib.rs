//! # meridian-router
//!
//! Provider abstraction, health monitoring, and adaptive routing core for a
//! multi-provider LLM inference gateway.
//!
//! A request arrives carrying a model alias and optional routing hints. The
//! [`alias`] module resolves the alias to the providers currently capable of
//! serving it; the [`router`] module scores each candidate from live health,
//! weight, and pattern signals and ranks them; the [`dispatcher`] module
//! walks that ranking, trying each candidate until one succeeds or the list
//! is exhausted. [`gateway`] wires all of the above into one composed value
//! together with its background tasks.
//!
//! ## Module map
//!
//! - [`models`] — request/response/candidate value types shared everywhere.
//! - [`error`] — the `ProviderError`/`GatewayError` taxonomy and its
//!   fallback/circuit-trip classification.
//! - [`circuit_breaker`] — the generic closed/open/half-open state machine.
//! - [`provider`] — the `Provider` trait and its static configuration.
//! - [`providers`] — one adapter per upstream wire format.
//! - [`pool`] — per-provider bounded concurrency slots.
//! - [`health`] — circuit breaker + periodic active health checks per provider.
//! - [`weight`] — EMA-smoothed performance metrics driving adaptive weights.
//! - [`score`] — the pure composite scoring function over weight metrics.
//! - [`alias`] — model alias to provider/model candidate resolution.
//! - [`pattern`] — advisory score nudge from historical task-pattern success.
//! - [`geo`] — optional client-proximity candidate pre-filter.
//! - [`prober`] — independent background latency probing loop.
//! - [`router`] — the Intelligent Router tying scoring and selection together.
//! - [`dispatcher`] — candidate iteration, timeouts, and outcome reporting.
//! - [`gateway`] — the composed `Gateway` value and its lifecycle.

pub mod alias;
pub mod circuit_breaker;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod geo;
pub mod health;
pub mod models;
pub mod pattern;
pub mod pool;
pub mod prober;
pub mod provider;
pub mod providers;
pub mod router;
pub mod score;
pub mod weight;

pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{GatewayError, ProviderError};
pub use gateway::{Gateway, GatewayConfig, ProviderSpec};
pub use models::{
    Candidate, Complexity, DispatchMethod, GenerationRequest, GenerationResponse, ModelMetadata,
};
pub use provider::{Provider, ProviderConfig};
pub use router::IntelligentRouter;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GenerationRequest;

    #[test]
    fn generation_request_carries_the_prompt_unmodified() {
        let request = GenerationRequest::new("hello");
        assert_eq!(request.prompt, "hello");
        assert!(request.task_type.is_none());
    }

    #[test]
    fn provider_config_defaults_are_enabled_and_unprioritized() {
        let config = ProviderConfig::default();
        assert!(config.enabled);
        assert_eq!(config.priority, 0);
        assert!(!config.high_quality);
        assert!(config.region.is_none());
    }
}
