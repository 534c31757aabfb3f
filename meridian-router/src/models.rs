//! Core data model: the request/response contract every provider adapter
//! speaks, plus the metadata and state types the rest of the crate shares.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A normalized text-generation request. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<Complexity>,
    #[serde(default)]
    pub extra_params: HashMap<String, serde_json::Value>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_message: None,
            temperature: None,
            max_tokens: None,
            stop_sequences: Vec::new(),
            output_schema: None,
            task_type: None,
            complexity: None,
            extra_params: HashMap::new(),
        }
    }

    /// True when `output_schema` is present, selecting the structured-output path.
    pub fn wants_structured_output(&self) -> bool {
        self.output_schema.is_some()
    }
}

/// Which dispatch operation a caller wants performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMethod {
    GenerateText,
    GenerateStructuredOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    /// Derive complexity from prompt length when the request doesn't supply one.
    pub fn from_prompt_len(len: usize) -> Self {
        if len < 100 {
            Complexity::Simple
        } else if len > 1000 {
            Complexity::Complex
        } else {
            Complexity::Medium
        }
    }
}

/// A normalized text-generation response. Always returned, never an `Err`
/// a caller has to unwrap — failure is signalled by `error` being set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub content: String,
    pub model_id: String,
    pub provider_name: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub cost: f64,
    pub response_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Opaque upstream payload; the core never inspects this.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<serde_json::Value>,
}

impl GenerationResponse {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn failure(provider_name: impl Into<String>, model_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            model_id: model_id.into(),
            provider_name: provider_name.into(),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            cost: 0.0,
            response_time: 0.0,
            error: Some(error.into()),
            raw_response: None,
        }
    }

    /// The synthesized response for a dispatch where every candidate failed.
    pub fn gateway_failure(last_error: impl std::fmt::Display) -> Self {
        Self::failure(
            "gateway",
            "",
            format!("All providers failed. Last error: {last_error}"),
        )
    }
}

/// Capability tags a (provider, model) pair may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    TextGeneration,
    StructuredOutput,
    FunctionCalling,
    Vision,
    Streaming,
    CodeGeneration,
}

/// Per-model metadata, scoped to one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_id: String,
    pub model_name: String,
    pub provider_name: String,
    pub capabilities: Vec<Capability>,
    pub context_length: u32,
    pub max_output_tokens: u32,
    pub cost_per_1k_tokens: f64,
    pub supports_system_messages: bool,
    pub supports_temperature: bool,
}

impl ModelMetadata {
    pub fn has_capability(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }
}

/// A (provider, model) pair eligible to serve a given request, annotated
/// with the score that ranked it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub provider_name: String,
    pub model_id: String,
    pub priority: i32,
    #[serde(default)]
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complexity_from_prompt_len() {
        assert_eq!(Complexity::from_prompt_len(10), Complexity::Simple);
        assert_eq!(Complexity::from_prompt_len(500), Complexity::Medium);
        assert_eq!(Complexity::from_prompt_len(5000), Complexity::Complex);
    }

    #[test]
    fn wants_structured_output_reflects_schema_presence() {
        let mut req = GenerationRequest::new("hello");
        assert!(!req.wants_structured_output());
        req.output_schema = Some(serde_json::json!({"type": "object"}));
        assert!(req.wants_structured_output());
    }

    #[test]
    fn gateway_failure_has_no_content_and_gateway_provider() {
        let resp = GenerationResponse::gateway_failure("rate_limited");
        assert!(!resp.is_success());
        assert_eq!(resp.provider_name, "gateway");
        assert!(resp.content.is_empty());
        assert!(resp.error.unwrap().contains("rate_limited"));
    }
}
