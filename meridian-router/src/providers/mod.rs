//! Provider adapters: one `Provider` implementation per upstream wire format.
//!
//! Anthropic and Ollama each speak a genuinely distinct protocol and get their
//! own module. Every other upstream (OpenAI, Azure OpenAI, Groq, Mistral,
//! Perplexity, OpenRouter, and self-hosted OpenAI-compatible servers) shares
//! [`openai_compatible::OpenAiCompatibleProvider`], constructed per-provider
//! from config rather than duplicated per vendor.

pub mod anthropic;
pub mod http_client;
pub mod mock;
pub mod ollama;
pub mod openai_compatible;

use crate::error::ProviderError;
use crate::models::ModelMetadata;
use crate::provider::{Provider, ProviderConfig};

/// Upstreams that speak the OpenAI `/chat/completions` wire format and get
/// routed through the shared adapter instead of a bespoke one.
const OPENAI_WIRE_COMPATIBLE: &[&str] = &[
    "openai",
    "azure",
    "groq",
    "mistral",
    "perplexity",
    "openrouter",
    "custom",
];

/// Build the `Provider` named by `config.name`, wiring in its advertised models.
pub fn create_provider(
    config: ProviderConfig,
    models: Vec<ModelMetadata>,
) -> Result<Box<dyn Provider>, ProviderError> {
    match config.name.as_str() {
        "anthropic" => Ok(Box::new(anthropic::AnthropicProvider::new(config, models)?)),
        "ollama" => Ok(Box::new(ollama::OllamaProvider::new(config, models)?)),
        name if OPENAI_WIRE_COMPATIBLE.contains(&name) => Ok(Box::new(
            openai_compatible::OpenAiCompatibleProvider::new(name.to_string(), config, models)?,
        )),
        other => Err(ProviderError::Configuration {
            message: format!("unknown provider type: {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_name_is_rejected() {
        let config = ProviderConfig {
            name: "not-a-real-provider".to_string(),
            ..Default::default()
        };
        let err = create_provider(config, vec![]).unwrap_err();
        assert_eq!(err.kind(), "config_invalid");
    }

    #[test]
    fn openai_wire_compatible_covers_known_vendors() {
        for name in OPENAI_WIRE_COMPATIBLE {
            assert_ne!(*name, "anthropic");
            assert_ne!(*name, "ollama");
        }
    }
}
