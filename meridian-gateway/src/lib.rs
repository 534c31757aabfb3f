//! Operator-facing binary support for a multi-provider LLM inference
//! gateway: configuration loading, an HTTP error wrapper, a Prometheus
//! snapshot renderer, and the `/healthz`/`/metrics` server built on top of
//! [`meridian_router::gateway::Gateway`].
//!
//! The gateway's actual request routing, provider adapters, health
//! monitoring, and adaptive weighting live in the `meridian-router` crate;
//! this crate only wires a `Config` file into a running `Gateway` and
//! exposes it to operators.

pub mod config;
pub mod gateway_error;
pub mod metrics;
pub mod server;

pub use server::create_server;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn default_config_has_no_providers_and_is_invalid() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }
}
