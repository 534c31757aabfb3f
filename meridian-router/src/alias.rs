//! Alias Resolver: maps a symbolic selector string (`"fastest"`,
//! `"anthropic:claude-3-5-haiku-20241022"`, a bare model id, ...) to an
//! ordered candidate list of `(provider_name, model_id)` pairs.
//!
//! Resolution runs a fixed four-step order rather than a single
//! best-match lookup: explicit alias table, then bare `provider:model`
//! syntax, then a bare model id searched across every registered provider,
//! then failure.

use std::collections::HashMap;
use tokio::sync::RwLock;

pub const REQUIRED_ALIASES: &[&str] = &["fastest", "cheapest", "best", "balanced", "fast", "powerful"];

/// One entry in an alias's candidate list, plus the registration order used
/// to break priority ties.
#[derive(Debug, Clone)]
pub struct AliasEntry {
    pub provider_name: String,
    pub model_id: String,
    pub priority: i32,
    pub registration_order: usize,
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub provider_name: String,
    pub model_id: String,
}

/// Static configuration input: every candidate offered for each alias,
/// independent of which providers happen to be registered right now.
#[derive(Debug, Clone, Default)]
pub struct AliasConfig {
    pub aliases: HashMap<String, Vec<AliasEntry>>,
}

/// A catalog entry used by resolution step 3 (bare model id lookup).
#[derive(Debug, Clone)]
pub struct ModelEntry {
    pub provider_name: String,
    pub model_id: String,
}

struct State {
    config: AliasConfig,
    registered_providers: Vec<String>,
    /// Every model id every registered provider currently advertises, used
    /// for resolution step 3.
    models: Vec<ModelEntry>,
    /// Re-derived on each registration change: `config.aliases` filtered to
    /// entries whose provider is currently registered, sorted ascending by
    /// priority with registration order breaking ties.
    live_table: HashMap<String, Vec<AliasEntry>>,
}

pub struct AliasResolver {
    state: RwLock<State>,
}

impl AliasResolver {
    pub fn new(config: AliasConfig) -> Self {
        let live_table = HashMap::new();
        Self {
            state: RwLock::new(State {
                config,
                registered_providers: Vec::new(),
                models: Vec::new(),
                live_table,
            }),
        }
    }

    pub async fn on_provider_registered(&self, provider_name: &str, models: Vec<ModelEntry>) {
        let mut state = self.state.write().await;
        if !state.registered_providers.iter().any(|p| p == provider_name) {
            state.registered_providers.push(provider_name.to_string());
        }
        state.models.retain(|m| m.provider_name != provider_name);
        state.models.extend(models);
        rebuild_live_table(&mut state);
    }

    pub async fn on_provider_unregistered(&self, provider_name: &str) {
        let mut state = self.state.write().await;
        state.registered_providers.retain(|p| p != provider_name);
        state.models.retain(|m| m.provider_name != provider_name);
        rebuild_live_table(&mut state);
    }

    /// Resolve a selector to an ordered candidate list via the four-step
    /// rule above. Returns an empty list only when `balanced` itself has
    /// no live entries and the selector matched nothing else.
    pub async fn resolve(&self, selector: &str) -> Vec<Candidate> {
        let state = self.state.read().await;

        // Step 1: a configured alias.
        if let Some(entries) = state.live_table.get(selector) {
            return entries
                .iter()
                .map(|e| Candidate {
                    provider_name: e.provider_name.clone(),
                    model_id: e.model_id.clone(),
                })
                .collect();
        }

        // Step 2: an explicit "provider:model" selector.
        if let Some((provider_name, model_id)) = selector.split_once(':') {
            if state.registered_providers.iter().any(|p| p == provider_name) {
                return vec![Candidate {
                    provider_name: provider_name.to_string(),
                    model_id: model_id.to_string(),
                }];
            }
        }

        // Step 3: a bare model id offered by any registered adapter.
        let matches: Vec<Candidate> = state
            .models
            .iter()
            .filter(|m| m.model_id == selector)
            .map(|m| Candidate {
                provider_name: m.provider_name.clone(),
                model_id: m.model_id.clone(),
            })
            .collect();
        if !matches.is_empty() {
            return matches;
        }

        // Step 4: fall back to "balanced".
        state
            .live_table
            .get("balanced")
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| Candidate {
                        provider_name: e.provider_name.clone(),
                        model_id: e.model_id.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn rebuild_live_table(state: &mut State) {
    let registered = state.registered_providers.clone();
    state.live_table = state
        .config
        .aliases
        .iter()
        .map(|(alias, entries)| {
            let mut live: Vec<AliasEntry> = entries
                .iter()
                .filter(|e| registered.contains(&e.provider_name))
                .cloned()
                .collect();
            live.sort_by_key(|e| (e.priority, e.registration_order));
            (alias.clone(), live)
        })
        .collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AliasConfig {
        let mut aliases = HashMap::new();
        aliases.insert(
            "balanced".to_string(),
            vec![
                AliasEntry {
                    provider_name: "anthropic".to_string(),
                    model_id: "claude-3-5-sonnet-20241022".to_string(),
                    priority: 1,
                    registration_order: 0,
                },
                AliasEntry {
                    provider_name: "openai".to_string(),
                    model_id: "gpt-4o".to_string(),
                    priority: 2,
                    registration_order: 1,
                },
            ],
        );
        AliasConfig { aliases }
    }

    #[tokio::test]
    async fn alias_resolves_to_configured_entries_sorted_by_priority() {
        let resolver = AliasResolver::new(config());
        resolver.on_provider_registered("anthropic", vec![]).await;
        resolver.on_provider_registered("openai", vec![]).await;

        let candidates = resolver.resolve("balanced").await;
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].provider_name, "anthropic");
    }

    #[tokio::test]
    async fn unregistering_a_provider_drops_it_from_the_live_table() {
        let resolver = AliasResolver::new(config());
        resolver.on_provider_registered("anthropic", vec![]).await;
        resolver.on_provider_registered("openai", vec![]).await;
        resolver.on_provider_unregistered("anthropic").await;

        let candidates = resolver.resolve("balanced").await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].provider_name, "openai");
    }

    #[tokio::test]
    async fn provider_colon_model_selector_short_circuits_to_single_entry() {
        let resolver = AliasResolver::new(AliasConfig::default());
        resolver.on_provider_registered("ollama", vec![]).await;

        let candidates = resolver.resolve("ollama:llama3").await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].model_id, "llama3");
    }

    #[tokio::test]
    async fn bare_model_id_matches_any_provider_that_offers_it() {
        let resolver = AliasResolver::new(AliasConfig::default());
        resolver
            .on_provider_registered(
                "openai",
                vec![ModelEntry {
                    provider_name: "openai".to_string(),
                    model_id: "gpt-4o".to_string(),
                }],
            )
            .await;

        let candidates = resolver.resolve("gpt-4o").await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].provider_name, "openai");
    }

    #[tokio::test]
    async fn unknown_selector_falls_back_to_balanced() {
        let resolver = AliasResolver::new(config());
        resolver.on_provider_registered("anthropic", vec![]).await;

        let candidates = resolver.resolve("does-not-exist-anywhere").await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].provider_name, "anthropic");
    }
}
