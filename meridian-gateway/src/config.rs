//! Configuration loading and validation.
//!
//! Top-level keys: `server` (the operator-facing bind address), `gateway`,
//! `providers`, `model_aliases`, `task_routing`. Layered load → env
//! override → validate.

use meridian_router::gateway::{GatewayConfig, ProviderSpec};
use meridian_router::models::{Capability, ModelMetadata};
use meridian_router::provider::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
    #[serde(default)]
    pub model_aliases: HashMap<String, Vec<AliasCandidate>>,
    #[serde(default)]
    pub task_routing: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub cost_optimization: bool,
    #[serde(default = "default_true")]
    pub performance_tracking: bool,
    /// Latency Prober cadence. `None` disables the prober entirely.
    #[serde(default)]
    pub probe_interval_secs: Option<u64>,
    #[serde(default)]
    pub weight_checkpoint_dir: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            fallback_enabled: true,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            cost_optimization: false,
            performance_tracking: true,
            probe_interval_secs: None,
            weight_checkpoint_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntryConfig {
    pub model_name: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default = "default_context_length")]
    pub context_length: u32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default)]
    pub cost_per_1k_tokens: f64,
    #[serde(default = "default_true")]
    pub supports_system_messages: bool,
    #[serde(default = "default_true")]
    pub supports_temperature: bool,
}

fn default_context_length() -> u32 {
    8192
}

fn default_max_output_tokens() -> u32 {
    4096
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_pool_size")]
    pub max_pool_size: usize,
    #[serde(default)]
    pub high_quality: bool,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub models: HashMap<String, ModelEntryConfig>,
}

fn default_pool_size() -> usize {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasCandidate {
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub priority: i32,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = if path.ends_with(".json") {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(host) = env::var("GATEWAY_HOST") {
            if !host.is_empty() {
                self.server.host = host;
            }
        }
        if let Ok(port) = env::var("GATEWAY_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid GATEWAY_PORT: {port}"))?;
        }
        if let Ok(timeout) = env::var("GATEWAY_TIMEOUT") {
            self.gateway.timeout_secs = timeout
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid GATEWAY_TIMEOUT: {timeout}"))?;
        }
        if let Ok(fallback) = env::var("GATEWAY_FALLBACK_ENABLED") {
            self.gateway.fallback_enabled = fallback
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid GATEWAY_FALLBACK_ENABLED: {fallback}"))?;
        }

        for (name, provider) in &mut self.providers {
            let env_key = format!("{}_API_KEY", name.to_uppercase().replace('-', "_"));
            if let Ok(api_key) = env::var(&env_key) {
                if !api_key.is_empty() {
                    provider.api_key = Some(api_key);
                }
            } else if provider.api_key.is_none() && !name.eq_ignore_ascii_case("ollama") {
                tracing::warn!(
                    provider = name,
                    env_var = env_key,
                    "no API key found for provider"
                );
            }
        }

        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.providers.is_empty() {
            return Err(anyhow::anyhow!("at least one provider must be configured"));
        }
        for (name, provider) in &self.providers {
            if provider.max_pool_size == 0 {
                return Err(anyhow::anyhow!("provider {name} has a zero max_pool_size"));
            }
            if let Some(base_url) = &provider.base_url {
                if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                    return Err(anyhow::anyhow!(
                        "provider {name} base_url must start with http:// or https://"
                    ));
                }
            }
        }
        for (alias, candidates) in &self.model_aliases {
            for candidate in candidates {
                if !self.providers.contains_key(&candidate.provider) {
                    return Err(anyhow::anyhow!(
                        "alias {alias} references unknown provider {}",
                        candidate.provider
                    ));
                }
            }
        }
        for (task_type, alias) in &self.task_routing {
            if !self.model_aliases.contains_key(alias) {
                return Err(anyhow::anyhow!(
                    "task_routing entry {task_type} references unknown alias {alias}"
                ));
            }
        }
        for required in meridian_router::alias::REQUIRED_ALIASES {
            if !self.model_aliases.contains_key(*required) {
                return Err(anyhow::anyhow!(
                    "model_aliases is missing the required alias {required}"
                ));
            }
        }
        Ok(())
    }

    /// Translate the file-facing schema into the gateway's runtime
    /// configuration: provider entries become [`ProviderSpec`]s, alias
    /// candidates become `meridian_router::alias::AliasEntry`s in
    /// registration order.
    pub fn to_gateway_config(&self) -> GatewayConfig {
        let mut providers = Vec::with_capacity(self.providers.len());
        for (name, entry) in &self.providers {
            let config = ProviderConfig {
                name: name.clone(),
                enabled: entry.enabled,
                priority: entry.priority,
                api_key: entry.api_key.clone(),
                base_url: entry.base_url.clone(),
                temperature: entry.temperature,
                timeout: Duration::from_secs(self.gateway.timeout_secs),
                max_pool_size: entry.max_pool_size,
                model_mapping: HashMap::new(),
                headers: HashMap::new(),
                high_quality: entry.high_quality,
                region: entry.region.clone(),
            };
            let models = entry
                .models
                .iter()
                .map(|(model_id, model)| ModelMetadata {
                    model_id: model_id.clone(),
                    model_name: model.model_name.clone(),
                    provider_name: name.clone(),
                    capabilities: model.capabilities.clone(),
                    context_length: model.context_length,
                    max_output_tokens: model.max_output_tokens,
                    cost_per_1k_tokens: model.cost_per_1k_tokens,
                    supports_system_messages: model.supports_system_messages,
                    supports_temperature: model.supports_temperature,
                })
                .collect();
            providers.push(ProviderSpec { config, models });
        }

        let mut aliases = HashMap::new();
        for (alias, candidates) in &self.model_aliases {
            let entries = candidates
                .iter()
                .enumerate()
                .map(|(i, c)| meridian_router::alias::AliasEntry {
                    provider_name: c.provider.clone(),
                    model_id: c.model_id.clone(),
                    priority: c.priority,
                    registration_order: i,
                })
                .collect();
            aliases.insert(alias.clone(), entries);
        }

        GatewayConfig {
            providers,
            aliases: meridian_router::alias::AliasConfig { aliases },
            task_routing: self.task_routing.clone(),
            cost_optimization: self.gateway.cost_optimization,
            fallback_enabled: self.gateway.fallback_enabled,
            dispatch_timeout: Duration::from_secs(self.gateway.timeout_secs),
            prober: self
                .gateway
                .probe_interval_secs
                .map(|secs| meridian_router::prober::LatencyProberConfig {
                    interval: Duration::from_secs(secs),
                }),
            weight_checkpoint_dir: self.gateway.weight_checkpoint_dir.as_ref().map(Into::into),
            ..GatewayConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            gateway: GatewaySettings::default(),
            providers: HashMap::new(),
            model_aliases: HashMap::new(),
            task_routing: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        let mut providers = HashMap::new();
        providers.insert(
            "ollama".to_string(),
            ProviderEntry {
                enabled: true,
                priority: 0,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                temperature: None,
                max_pool_size: 10,
                high_quality: false,
                region: None,
                models: HashMap::new(),
            },
        );
        let mut aliases = HashMap::new();
        for name in meridian_router::alias::REQUIRED_ALIASES {
            aliases.insert(
                name.to_string(),
                vec![AliasCandidate {
                    provider: "ollama".to_string(),
                    model_id: "llama3".to_string(),
                    priority: 0,
                }],
            );
        }
        Config {
            server: ServerConfig::default(),
            gateway: GatewaySettings::default(),
            providers,
            model_aliases: aliases,
            task_routing: HashMap::new(),
        }
    }

    #[test]
    fn rejects_empty_provider_table() {
        let mut config = sample_config();
        config.providers.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_alias_referencing_unknown_provider() {
        let mut config = sample_config();
        config.model_aliases.get_mut("balanced").unwrap()[0].provider = "nope".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_task_routing_referencing_unknown_alias() {
        let mut config = sample_config();
        config.task_routing.insert("chat".to_string(), "nonexistent".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_config_missing_a_required_alias() {
        let mut config = sample_config();
        config.model_aliases.remove("fastest");
        assert!(config.validate().is_err());
    }

    #[test]
    fn valid_config_translates_into_one_provider_spec() {
        let config = sample_config();
        assert!(config.validate().is_ok());
        let gateway_config = config.to_gateway_config();
        assert_eq!(gateway_config.providers.len(), 1);
        assert!(gateway_config.aliases.aliases.contains_key("balanced"));
    }
}
