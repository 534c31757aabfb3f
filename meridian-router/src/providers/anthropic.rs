//! Anthropic Messages API adapter. Kept as its own adapter (rather than
//! folded into `openai_compatible`) because the wire format is genuinely
//! different: a `messages` array with no `system` role, and a dedicated
//! `system` field instead.

use crate::error::ProviderError;
use crate::models::{Capability, GenerationRequest, GenerationResponse, ModelMetadata};
use crate::provider::{estimate_tokens, HealthProbeResult, Provider, ProviderConfig};
use crate::providers::http_client::{AuthStrategy, HttpProviderClient};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug)]
pub struct AnthropicProvider {
    http: HttpProviderClient,
    config: ProviderConfig,
    models: Vec<ModelMetadata>,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContent>,
    model: String,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig, models: Vec<ModelMetadata>) -> Result<Self, ProviderError> {
        let mut headers = config.headers.clone();
        headers.insert("anthropic-version".to_string(), "2023-06-01".to_string());
        let http = HttpProviderClient::new(
            config.timeout,
            config.base_url.clone(),
            "https://api.anthropic.com",
            &headers,
            AuthStrategy::Header {
                name: "x-api-key".to_string(),
                value: config.api_key.clone().unwrap_or_default(),
            },
        )?;
        Ok(Self {
            http,
            config,
            models,
        })
    }

    fn mapped_model(&self, model_id: &str) -> String {
        self.config
            .model_mapping
            .get(model_id)
            .cloned()
            .unwrap_or_else(|| model_id.to_string())
    }

    fn metadata_for(&self, model_id: &str) -> Option<&ModelMetadata> {
        self.models.iter().find(|m| m.model_id == model_id)
    }

    fn cost(&self, model_id: &str, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        let per_1k = self
            .metadata_for(model_id)
            .map(|m| m.cost_per_1k_tokens)
            .unwrap_or(0.0);
        per_1k * ((prompt_tokens + completion_tokens) as f64) / 1000.0
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn initialize(&self) -> bool {
        if self.config.api_key.as_deref().unwrap_or("").is_empty() {
            return false;
        }
        self.health_check().await.map(|r| r.success).unwrap_or(false)
    }

    async fn generate_text(
        &self,
        request: &GenerationRequest,
        model_id: &str,
    ) -> Result<GenerationResponse, ProviderError> {
        let body = AnthropicRequest {
            model: self.mapped_model(model_id),
            max_tokens: request.max_tokens.unwrap_or(4096),
            messages: vec![AnthropicMessage {
                role: "user",
                content: &request.prompt,
            }],
            system: request.system_message.as_deref(),
            temperature: request.temperature,
        };

        let start = Instant::now();
        let resp: AnthropicResponse = self.http.post_json("/v1/messages", &body).await?;
        let response_time = start.elapsed().as_secs_f64();

        let content = resp.content.into_iter().map(|c| c.text).collect::<String>();
        let prompt_tokens = resp.usage.input_tokens;
        let completion_tokens = resp.usage.output_tokens;

        Ok(GenerationResponse {
            content,
            model_id: resp.model,
            provider_name: self.name().to_string(),
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            cost: self.cost(model_id, prompt_tokens, completion_tokens),
            response_time,
            error: None,
            raw_response: None,
        })
    }

    async fn generate_structured_output(
        &self,
        request: &GenerationRequest,
        model_id: &str,
    ) -> Result<GenerationResponse, ProviderError> {
        // Anthropic has no native structured-output mode in this adapter;
        // fold the schema into the prompt, same recipe as the OpenAI-compatible adapter.
        let Some(schema) = &request.output_schema else {
            return self.generate_text(request, model_id).await;
        };
        let mut augmented = request.clone();
        augmented.prompt = format!(
            "{}\n\nRespond with a single JSON object matching this schema:\n{}",
            request.prompt, schema
        );
        let resp = self.generate_text(&augmented, model_id).await?;
        match serde_json::from_str::<serde_json::Value>(resp.content.trim()) {
            Ok(value) => {
                let mut out = resp;
                out.raw_response = Some(value);
                Ok(out)
            }
            Err(e) => Err(ProviderError::InvalidResponse {
                message: format!("structured output was not valid JSON: {e}"),
            }),
        }
    }

    fn available_models(&self) -> Vec<ModelMetadata> {
        self.models.clone()
    }

    async fn health_check(&self) -> Result<HealthProbeResult, ProviderError> {
        let start = Instant::now();
        // Anthropic has no dedicated health endpoint; use a minimal 1-token completion.
        let body = AnthropicRequest {
            model: self
                .models
                .first()
                .map(|m| m.model_id.clone())
                .unwrap_or_else(|| "claude-3-5-haiku-20241022".to_string()),
            max_tokens: 1,
            messages: vec![AnthropicMessage {
                role: "user",
                content: "hi",
            }],
            system: None,
            temperature: Some(0.0),
        };

        let result: Result<serde_json::Value, ProviderError> =
            self.http.post_json("/v1/messages", &body).await;
        let response_time = start.elapsed();

        match result {
            Ok(_) => Ok(HealthProbeResult {
                success: true,
                response_time,
                error: None,
            }),
            Err(e) => Ok(HealthProbeResult {
                success: false,
                response_time,
                error: Some(e.to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ModelMetadata {
        ModelMetadata {
            model_id: "claude-3-5-sonnet-20241022".to_string(),
            model_name: "Claude 3.5 Sonnet".to_string(),
            provider_name: "anthropic".to_string(),
            capabilities: vec![Capability::TextGeneration],
            context_length: 200_000,
            max_output_tokens: 8192,
            cost_per_1k_tokens: 0.003,
            supports_system_messages: true,
            supports_temperature: true,
        }
    }

    #[test]
    fn cost_is_zero_for_unknown_model() {
        let config = ProviderConfig {
            api_key: Some("key".into()),
            ..Default::default()
        };
        let provider = AnthropicProvider::new(config, vec![model()]).unwrap();
        assert_eq!(provider.cost("no-such-model", 1000, 1000), 0.0);
    }

    #[test]
    fn cost_scales_with_tokens() {
        let config = ProviderConfig {
            api_key: Some("key".into()),
            ..Default::default()
        };
        let provider = AnthropicProvider::new(config, vec![model()]).unwrap();
        let cost = provider.cost("claude-3-5-sonnet-20241022", 1000, 1000);
        assert!((cost - 0.006).abs() < 1e-9);
    }
}
