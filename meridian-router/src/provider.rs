//! The Provider Adapter contract: a uniform interface over one upstream
//! model-inference API. Every adapter is an independent value implementing
//! this trait, with no shared base class.

use crate::error::ProviderError;
use crate::models::{Capability, GenerationRequest, GenerationResponse, ModelMetadata};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::time::Duration;

/// Static, operator-supplied configuration for one provider instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(with = "duration_secs", default = "default_timeout")]
    pub timeout: Duration,
    #[serde(default)]
    pub max_pool_size: usize,
    #[serde(default)]
    pub model_mapping: HashMap<String, String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub high_quality: bool,
    #[serde(default)]
    pub region: Option<String>,
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

/// A provider's config may omit `timeout` entirely; serialize/deserialize it
/// as a plain integer number of seconds rather than pulling in a whole
/// humantime-style crate for one field.
mod duration_secs {
    use super::*;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            enabled: true,
            priority: 0,
            api_key: None,
            base_url: None,
            temperature: None,
            timeout: default_timeout(),
            max_pool_size: 100,
            model_mapping: HashMap::new(),
            headers: HashMap::new(),
            high_quality: false,
            region: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthProbeResult {
    pub success: bool,
    pub response_time: Duration,
    pub error: Option<String>,
}

/// One upstream model-inference API, normalized behind the gateway's
/// request/response contract.
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Validate credentials, populate the model catalog, and verify
    /// reachability. Returns `false` (no side effects) rather than erroring
    /// when credentials are missing or the endpoint is unreachable.
    async fn initialize(&self) -> bool;

    async fn generate_text(
        &self,
        request: &GenerationRequest,
        model_id: &str,
    ) -> Result<GenerationResponse, ProviderError>;

    /// Same contract as `generate_text`; when the upstream doesn't natively
    /// support structured output, the adapter appends the schema to the
    /// prompt and validates the shape of the parsed result itself.
    async fn generate_structured_output(
        &self,
        request: &GenerationRequest,
        model_id: &str,
    ) -> Result<GenerationResponse, ProviderError>;

    fn available_models(&self) -> Vec<ModelMetadata>;

    fn supports_capability(&self, model_id: &str, capability: Capability) -> bool {
        self.available_models()
            .iter()
            .find(|m| m.model_id == model_id)
            .is_some_and(|m| m.has_capability(capability))
    }

    /// A cheap liveness probe, distinct from a real generation call.
    async fn health_check(&self) -> Result<HealthProbeResult, ProviderError>;
}

/// Estimate a token count from raw text when the upstream doesn't report
/// one. One rule, applied uniformly across adapters so token counts stay
/// comparable regardless of which upstream served the request.
pub fn estimate_tokens(text: &str) -> u32 {
    ((text.len() as f64) / 4.0).ceil() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_tokens_uses_four_chars_per_token() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens("abc"), 1);
    }

    #[test]
    fn provider_config_default_is_enabled_with_sane_pool() {
        let cfg = ProviderConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.max_pool_size, 100);
        assert_eq!(cfg.timeout, Duration::from_secs(60));
    }
}
