//! Error taxonomy. `ProviderError` is what an adapter returns; `GatewayError`
//! is what the Dispatcher/Router/Health Monitor deal in. The Dispatcher
//! never lets either escape to a caller — it always converts them into a
//! `GenerationResponse` with `error` populated.

use std::sync::Arc;
use thiserror::Error;

/// Errors an adapter distinguishes internally; each variant corresponds to
/// exactly one row of the error taxonomy.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("upstream API error {code}: {message}")]
    Api { code: u16, message: String },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("model not found: {model_id}")]
    ModelNotFound { model_id: String },

    #[error("rate limited")]
    RateLimit,

    #[error("request timed out")]
    Timeout,

    #[error("upstream server error (5xx)")]
    UpstreamServerError,

    #[error("service unavailable")]
    ServiceUnavailable,

    #[error("serialization error: {0}")]
    Serialization(#[from] Arc<serde_json::Error>),

    #[error("malformed response: {message}")]
    InvalidResponse { message: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("capability not supported by this provider: {capability}")]
    UnsupportedCapability { capability: String },
}

impl ProviderError {
    /// The taxonomy tag used in logs and in `GenerationResponse::error`.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::AuthenticationFailed => "auth_failed",
            ProviderError::RateLimit => "rate_limited",
            ProviderError::Timeout => "timeout",
            ProviderError::UpstreamServerError => "upstream_5xx",
            ProviderError::InvalidResponse { .. } | ProviderError::Serialization(_) => {
                "malformed_response"
            }
            ProviderError::ModelNotFound { .. } => "unknown_model",
            ProviderError::Http(_) | ProviderError::ServiceUnavailable => "upstream_5xx",
            ProviderError::Api { code, .. } if (500..600).contains(code) => "upstream_5xx",
            ProviderError::Api { .. } => "malformed_response",
            ProviderError::Configuration { .. } => "config_invalid",
            ProviderError::UnsupportedCapability { .. } => "unsupported_capability",
        }
    }

    /// Whether this error should count toward a circuit breaker trip:
    /// rate limits defer but don't trip; everything else that reaches the
    /// upstream (or fails to parse its response) does.
    pub fn counts_toward_trip(&self) -> bool {
        !matches!(self, ProviderError::RateLimit)
    }

    /// Whether a single occurrence should trip the circuit immediately
    /// regardless of the configured failure threshold.
    pub fn trips_immediately(&self) -> bool {
        matches!(self, ProviderError::AuthenticationFailed)
    }
}

/// Gateway/router/dispatcher-level failures.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("no candidates available for this request")]
    NoCandidates,

    #[error("connection pool exhausted for provider {provider_name}")]
    PoolExhausted { provider_name: String },

    #[error("unknown model: {selector}")]
    UnknownModel { selector: String },

    #[error("request cancelled")]
    Cancelled,

    #[error("invalid configuration: {message}")]
    ConfigInvalid { message: String },

    #[error("dispatch timed out after {0:?}")]
    DispatchTimeout(std::time::Duration),
}

impl GatewayError {
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Provider(e) => e.kind(),
            GatewayError::NoCandidates => "no_candidates",
            GatewayError::PoolExhausted { .. } => "pool_exhausted",
            GatewayError::UnknownModel { .. } => "unknown_model",
            GatewayError::Cancelled => "cancelled",
            GatewayError::ConfigInvalid { .. } => "config_invalid",
            GatewayError::DispatchTimeout(_) => "timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_does_not_count_toward_trip() {
        assert!(!ProviderError::RateLimit.counts_toward_trip());
        assert!(ProviderError::Timeout.counts_toward_trip());
    }

    #[test]
    fn auth_failure_trips_immediately() {
        assert!(ProviderError::AuthenticationFailed.trips_immediately());
        assert!(!ProviderError::UpstreamServerError.trips_immediately());
    }

    #[test]
    fn kind_matches_taxonomy_tags() {
        assert_eq!(ProviderError::RateLimit.kind(), "rate_limited");
        assert_eq!(GatewayError::NoCandidates.kind(), "no_candidates");
        assert_eq!(
            GatewayError::PoolExhausted {
                provider_name: "a".into()
            }
            .kind(),
            "pool_exhausted"
        );
    }
}
