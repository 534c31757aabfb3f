//! An in-memory `Provider` double used by integration tests to exercise the
//! Dispatcher/Router/Health Monitor without hitting a real upstream.

use crate::error::ProviderError;
use crate::models::{Capability, GenerationRequest, GenerationResponse, ModelMetadata};
use crate::provider::{HealthProbeResult, Provider, ProviderConfig};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A scripted outcome the mock returns on its next call.
#[derive(Debug, Clone)]
pub enum Scripted {
    Success { content: String, response_time: f64 },
    Failure(ProviderError),
}

#[derive(Debug)]
pub struct MockProvider {
    name: String,
    models: Vec<ModelMetadata>,
    /// Outcomes are consumed in order; once exhausted the last one repeats.
    script: Mutex<Vec<Scripted>>,
    cursor: AtomicUsize,
    config: ProviderConfig,
}

impl MockProvider {
    pub fn new(name: impl Into<String>, models: Vec<ModelMetadata>, script: Vec<Scripted>) -> Self {
        Self {
            name: name.into(),
            models,
            script: Mutex::new(script),
            cursor: AtomicUsize::new(0),
            config: ProviderConfig::default(),
        }
    }

    pub fn healthy(name: impl Into<String>, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        Self::new(
            name,
            vec![ModelMetadata {
                model_id: model_id.clone(),
                model_name: model_id.clone(),
                provider_name: "mock".to_string(),
                capabilities: vec![Capability::TextGeneration, Capability::StructuredOutput],
                context_length: 8192,
                max_output_tokens: 2048,
                cost_per_1k_tokens: 0.001,
                supports_system_messages: true,
                supports_temperature: true,
            }],
            vec![Scripted::Success {
                content: "ok".to_string(),
                response_time: 0.1,
            }],
        )
    }

    pub fn with_max_pool_size(mut self, size: usize) -> Self {
        self.config.max_pool_size = size;
        self
    }

    fn next_outcome(&self) -> Scripted {
        let script = self.script.lock().unwrap();
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst);
        script[idx.min(script.len() - 1)].clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> bool {
        true
    }

    async fn generate_text(
        &self,
        _request: &GenerationRequest,
        model_id: &str,
    ) -> Result<GenerationResponse, ProviderError> {
        match self.next_outcome() {
            Scripted::Success {
                content,
                response_time,
            } => {
                tokio::time::sleep(std::time::Duration::from_secs_f64(response_time)).await;
                Ok(GenerationResponse {
                    content,
                    model_id: model_id.to_string(),
                    provider_name: self.name.clone(),
                    prompt_tokens: 10,
                    completion_tokens: 10,
                    total_tokens: 20,
                    cost: 0.0002,
                    response_time,
                    error: None,
                    raw_response: None,
                })
            }
            Scripted::Failure(err) => Err(err),
        }
    }

    async fn generate_structured_output(
        &self,
        request: &GenerationRequest,
        model_id: &str,
    ) -> Result<GenerationResponse, ProviderError> {
        self.generate_text(request, model_id).await
    }

    fn available_models(&self) -> Vec<ModelMetadata> {
        self.models.clone()
    }

    async fn health_check(&self) -> Result<HealthProbeResult, ProviderError> {
        Ok(HealthProbeResult {
            success: true,
            response_time: std::time::Duration::from_millis(10),
            error: None,
        })
    }
}
