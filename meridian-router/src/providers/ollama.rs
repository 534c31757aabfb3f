//! Ollama adapter — the representative local inference endpoint (no API
//! key, localhost base URL, no per-token billing upstream).

use crate::error::ProviderError;
use crate::models::{GenerationRequest, GenerationResponse, ModelMetadata};
use crate::provider::{HealthProbeResult, Provider, ProviderConfig};
use crate::providers::http_client::{AuthStrategy, HttpProviderClient};
use async_trait::async_trait;
use serde_json::json;
use std::time::Instant;

#[derive(Debug)]
pub struct OllamaProvider {
    http: HttpProviderClient,
    config: ProviderConfig,
    models: Vec<ModelMetadata>,
}

impl OllamaProvider {
    pub fn new(config: ProviderConfig, models: Vec<ModelMetadata>) -> Result<Self, ProviderError> {
        let http = HttpProviderClient::new(
            config.timeout,
            config.base_url.clone(),
            "http://localhost:11434",
            &config.headers,
            AuthStrategy::None,
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
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn initialize(&self) -> bool {
        self.health_check().await.map(|r| r.success).unwrap_or(false)
    }

    async fn generate_text(
        &self,
        request: &GenerationRequest,
        model_id: &str,
    ) -> Result<GenerationResponse, ProviderError> {
        let model = self.mapped_model(model_id);
        let mut prompt = String::new();
        if let Some(system) = &request.system_message {
            prompt.push_str(system);
            prompt.push('\n');
        }
        prompt.push_str(&request.prompt);

        let body = json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": request.temperature.unwrap_or(0.7),
                "num_predict": request.max_tokens,
            }
        });

        let start = Instant::now();
        let resp: serde_json::Value = self.http.post_json("/api/generate", &body).await?;
        let response_time = start.elapsed().as_secs_f64();

        let content = resp["response"].as_str().unwrap_or("").to_string();
        let prompt_tokens = resp["prompt_eval_count"].as_u64().unwrap_or(0) as u32;
        let completion_tokens = resp["eval_count"].as_u64().unwrap_or(0) as u32;

        Ok(GenerationResponse {
            content,
            model_id: model,
            provider_name: self.name().to_string(),
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            // Local inference has no upstream billing signal.
            cost: 0.0,
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
        let result: Result<serde_json::Value, ProviderError> = self.http.get_json("/api/tags").await;
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
