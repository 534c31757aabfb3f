//! Pattern-advisory score nudge: buckets recent requests by a coarse
//! synthetic key and tracks a rolling per-bucket, per-provider success rate.
//!
//! Advisory only — contributes a bounded, config-gated additive nudge to the
//! Score Calculator's composite score. At the default `pattern_weight` of
//! `0.0` this module has zero observable effect, so a deployment that never
//! configures it sees the undisturbed `[crate::score]` output.

use std::collections::HashMap;
use tokio::sync::RwLock;

const MAX_SAMPLES_PER_BUCKET: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    Chat,
    Code,
    Reasoning,
    Creative,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

/// The coarse synthetic key a request is bucketed under: `task_type +
/// complexity`, never the prompt text itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatternKey {
    pub task_type: TaskType,
    pub complexity: Complexity,
}

#[derive(Default)]
struct BucketStats {
    /// Ring of recent outcomes, oldest first; capped at
    /// `MAX_SAMPLES_PER_BUCKET`.
    outcomes: Vec<bool>,
}

impl BucketStats {
    fn record(&mut self, success: bool) {
        self.outcomes.push(success);
        if self.outcomes.len() > MAX_SAMPLES_PER_BUCKET {
            self.outcomes.remove(0);
        }
    }

    fn success_rate(&self) -> Option<f64> {
        if self.outcomes.is_empty() {
            return None;
        }
        let successes = self.outcomes.iter().filter(|s| **s).count();
        Some(successes as f64 / self.outcomes.len() as f64)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PatternConfig {
    /// Weight of the additive nudge, clamped into `[0, 0.2]`. Zero disables
    /// the feature entirely without callers needing a separate flag.
    pub pattern_weight: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self { pattern_weight: 0.0 }
    }
}

impl PatternConfig {
    fn clamped_weight(&self) -> f64 {
        self.pattern_weight.clamp(0.0, 0.2)
    }
}

pub struct PatternAdvisor {
    config: PatternConfig,
    buckets: RwLock<HashMap<(PatternKey, String), BucketStats>>,
}

impl PatternAdvisor {
    pub fn new(config: PatternConfig) -> Self {
        Self {
            config,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    pub async fn record_outcome(&self, key: PatternKey, provider_name: &str, success: bool) {
        let mut buckets = self.buckets.write().await;
        buckets
            .entry((key, provider_name.to_string()))
            .or_default()
            .record(success);
    }

    /// The additive nudge for `provider_name` under `key`, already scaled by
    /// `pattern_weight`. `0.0` whenever the feature is disabled or the bucket
    /// has no history yet — never a guess dressed up as a signal.
    pub async fn nudge(&self, key: PatternKey, provider_name: &str) -> f64 {
        let weight = self.config.clamped_weight();
        if weight <= 0.0 {
            return 0.0;
        }
        let buckets = self.buckets.read().await;
        let Some(stats) = buckets.get(&(key, provider_name.to_string())) else {
            return 0.0;
        };
        // Centered on 0.5 so an average provider (success_rate == 0.5)
        // contributes no nudge; only a track record above or below average
        // in this bucket moves the score.
        match stats.success_rate() {
            Some(rate) => (rate - 0.5) * 2.0 * weight,
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> PatternKey {
        PatternKey {
            task_type: TaskType::Code,
            complexity: Complexity::Moderate,
        }
    }

    #[tokio::test]
    async fn zero_weight_is_a_true_no_op() {
        let advisor = PatternAdvisor::new(PatternConfig { pattern_weight: 0.0 });
        for _ in 0..10 {
            advisor.record_outcome(key(), "anthropic", false).await;
        }
        assert_eq!(advisor.nudge(key(), "anthropic").await, 0.0);
    }

    #[tokio::test]
    async fn unseen_bucket_contributes_no_nudge() {
        let advisor = PatternAdvisor::new(PatternConfig { pattern_weight: 0.2 });
        assert_eq!(advisor.nudge(key(), "anthropic").await, 0.0);
    }

    #[tokio::test]
    async fn consistent_success_yields_a_positive_nudge_within_bound() {
        let advisor = PatternAdvisor::new(PatternConfig { pattern_weight: 0.2 });
        for _ in 0..20 {
            advisor.record_outcome(key(), "anthropic", true).await;
        }
        let nudge = advisor.nudge(key(), "anthropic").await;
        assert!(nudge > 0.0 && nudge <= 0.2);
    }

    #[tokio::test]
    async fn consistent_failure_yields_a_negative_nudge() {
        let advisor = PatternAdvisor::new(PatternConfig { pattern_weight: 0.2 });
        for _ in 0..20 {
            advisor.record_outcome(key(), "openai", false).await;
        }
        let nudge = advisor.nudge(key(), "openai").await;
        assert!(nudge < 0.0 && nudge >= -0.2);
    }

    #[tokio::test]
    async fn weight_above_max_is_clamped() {
        let advisor = PatternAdvisor::new(PatternConfig { pattern_weight: 5.0 });
        for _ in 0..20 {
            advisor.record_outcome(key(), "anthropic", true).await;
        }
        let nudge = advisor.nudge(key(), "anthropic").await;
        assert!(nudge <= 0.2);
    }
}
