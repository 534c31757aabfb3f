//! Generic adapter for every upstream that speaks the OpenAI
//! `/chat/completions` wire format (OpenAI itself, Azure OpenAI, Groq,
//! Mistral, Perplexity, OpenRouter, and any self-hosted OpenAI-compatible
//! endpoint). One adapter, constructed per-provider from config, rather than
//! one file per vendor, since these vendors share an identical wire mapping.

use crate::error::ProviderError;
use crate::models::{Capability, GenerationRequest, GenerationResponse, ModelMetadata};
use crate::provider::{estimate_tokens, HealthProbeResult, Provider, ProviderConfig};
use crate::providers::http_client::{AuthStrategy, HttpProviderClient};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;

#[derive(Debug)]
pub struct OpenAiCompatibleProvider {
    name: String,
    http: HttpProviderClient,
    config: ProviderConfig,
    models: Vec<ModelMetadata>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatWireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        name: impl Into<String>,
        config: ProviderConfig,
        models: Vec<ModelMetadata>,
    ) -> Result<Self, ProviderError> {
        let auth = match &config.api_key {
            Some(key) if !key.is_empty() => AuthStrategy::Bearer { token: key.clone() },
            _ => AuthStrategy::None,
        };
        let http = HttpProviderClient::new(
            config.timeout,
            config.base_url.clone(),
            "https://api.openai.com/v1",
            &config.headers,
            auth,
        )?;
        Ok(Self {
            name: name.into(),
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

    fn build_messages<'a>(&self, request: &'a GenerationRequest) -> Vec<ChatWireMessage<'a>> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_message {
            messages.push(ChatWireMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatWireMessage {
            role: "user",
            content: &request.prompt,
        });
        messages
    }

    async fn call_chat_completion(
        &self,
        request: &GenerationRequest,
        model_id: &str,
        extra: Option<serde_json::Value>,
    ) -> Result<(ChatCompletionResponse, f64), ProviderError> {
        let model = self.mapped_model(model_id);
        let mut body = json!({
            "model": model,
            "messages": self.build_messages(request),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stop": request.stop_sequences,
        });
        if let Some(extra) = extra {
            if let (Some(obj), Some(extra_obj)) = (body.as_object_mut(), extra.as_object()) {
                for (k, v) in extra_obj {
                    obj.insert(k.clone(), v.clone());
                }
            }
        }

        let start = Instant::now();
        let resp: ChatCompletionResponse = self.http.post_json("/chat/completions", &body).await?;
        Ok((resp, start.elapsed().as_secs_f64()))
    }

    fn to_generation_response(
        &self,
        model_id: &str,
        resp: ChatCompletionResponse,
        response_time: f64,
    ) -> GenerationResponse {
        let content = resp
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        let (prompt_tokens, completion_tokens) = resp
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or_else(|| (estimate_tokens(&content), estimate_tokens(&content)));
        let total_tokens = prompt_tokens + completion_tokens;

        GenerationResponse {
            content,
            model_id: resp.model.unwrap_or_else(|| model_id.to_string()),
            provider_name: self.name.clone(),
            prompt_tokens,
            completion_tokens,
            total_tokens,
            cost: self.cost(model_id, prompt_tokens, completion_tokens),
            response_time,
            error: None,
            raw_response: None,
        }
    }

    /// Minimal shape check that the parsed JSON carries the `output_schema`'s
    /// top-level required properties. Full JSON-schema validation is out of
    /// scope; this is just enough to distinguish "the model ignored the
    /// instruction" from a usable structured response.
    fn matches_schema_shape(value: &serde_json::Value, schema: &serde_json::Value) -> bool {
        let Some(obj) = value.as_object() else {
            return false;
        };
        let required = schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>())
            .unwrap_or_default();
        required.iter().all(|k| obj.contains_key(*k))
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> bool {
        if self.config.api_key.as_deref().unwrap_or("").is_empty() && self.config.base_url.is_none()
        {
            return false;
        }
        self.health_check().await.map(|r| r.success).unwrap_or(false)
    }

    async fn generate_text(
        &self,
        request: &GenerationRequest,
        model_id: &str,
    ) -> Result<GenerationResponse, ProviderError> {
        let (resp, response_time) = self.call_chat_completion(request, model_id, None).await?;
        Ok(self.to_generation_response(model_id, resp, response_time))
    }

    async fn generate_structured_output(
        &self,
        request: &GenerationRequest,
        model_id: &str,
    ) -> Result<GenerationResponse, ProviderError> {
        let Some(schema) = &request.output_schema else {
            return self.generate_text(request, model_id).await;
        };

        let native = self
            .metadata_for(model_id)
            .is_some_and(|m| m.has_capability(Capability::StructuredOutput));

        let (resp, response_time) = if native {
            let extra = json!({"response_format": {"type": "json_object"}});
            self.call_chat_completion(request, model_id, Some(extra))
                .await?
        } else {
            let mut augmented = request.clone();
            augmented.prompt = format!(
                "{}\n\nRespond with a single JSON object matching this schema:\n{}",
                request.prompt, schema
            );
            self.call_chat_completion(&augmented, model_id, None).await?
        };

        let content = resp
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();
        let parsed: Result<serde_json::Value, _> = serde_json::from_str(content.trim());
        match parsed {
            Ok(value) if Self::matches_schema_shape(&value, schema) => {
                let mut out = self.to_generation_response(model_id, resp, response_time);
                out.raw_response = Some(value);
                Ok(out)
            }
            Ok(_) => Err(ProviderError::InvalidResponse {
                message: "structured output did not match the requested schema shape".into(),
            }),
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
        let result: Result<serde_json::Value, ProviderError> = self.http.get_json("/models").await;
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
