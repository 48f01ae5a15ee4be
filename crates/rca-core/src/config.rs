//! Analysis configuration.
//!
//! Every value has a default; a TOML file may override any subset of them.
//! [`AnalysisConfig::validate`] reports all violations at once.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::item::ItemKind;
use crate::error::{ConfigError, ConfigResult};

/// Per-kind integer values (weights or caps). All three must be given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerKind {
    pub step: u64,
    pub test: u64,
    pub artifact_batch: u64,
}

impl PerKind {
    pub fn get(&self, kind: ItemKind) -> u64 {
        match kind {
            ItemKind::Step => self.step,
            ItemKind::Test => self.test,
            ItemKind::ArtifactBatch => self.artifact_batch,
        }
    }
}

/// Context-window budget settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Total model context window in tokens.
    pub context_window: u64,
    /// Tokens reserved for system prompts and per-call instructions.
    pub prompt_overhead: u64,
    /// Tokens reserved for the synthesis call.
    pub synthesis_reserve: u64,
    /// Minimum allocation an item must receive to be analysed at all.
    pub min_item_tokens: u64,
    /// Steps and tests count more than supplementary artifacts.
    pub weights: PerKind,
    /// Upper bound on the size that counts toward an item's weight.
    pub caps: PerKind,
    /// Maximum combined size of one artifact batch.
    pub artifact_batch_ceiling: u64,
}

impl BudgetConfig {
    /// Total reserved overhead `R`.
    pub fn reserved_overhead(&self) -> u64 {
        self.prompt_overhead.saturating_add(self.synthesis_reserve)
    }

    /// Build a config for a given window, scaling the reservations with it.
    pub fn for_window(context_window: u64) -> Self {
        Self {
            context_window,
            prompt_overhead: context_window / 32,
            synthesis_reserve: context_window / 8,
            ..Self::default()
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            context_window: crate::models::DEFAULT_CONTEXT_WINDOW,
            prompt_overhead: 4_000,
            synthesis_reserve: 16_000,
            min_item_tokens: 1_000,
            weights: PerKind {
                step: 2,
                test: 1,
                artifact_batch: 1,
            },
            caps: PerKind {
                step: 200_000,
                test: 80_000,
                artifact_batch: 150_000,
            },
            artifact_batch_ceiling: 20_000,
        }
    }
}

/// Worker pool and deadline settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Maximum analysis calls in flight.
    pub max_in_flight: usize,
    /// Deadline for all item analyses, in seconds.
    pub run_deadline_secs: u64,
    /// Timeout for the synthesis call, in seconds.
    pub synthesis_timeout_secs: u64,
}

impl ConcurrencyConfig {
    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.run_deadline_secs)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_timeout_secs)
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            run_deadline_secs: 600,
            synthesis_timeout_secs: 180,
        }
    }
}

/// Retry policy for transient transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Extra attempts after the first (0 = run once).
    pub max_retries: u32,
    /// Base delay for transient errors (milliseconds).
    pub backoff_base_ms: u64,
    /// Base delay for rate-limit errors (milliseconds).
    pub rate_limit_backoff_ms: u64,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32, rate_limited: bool) -> Duration {
        let base = if rate_limited {
            self.rate_limit_backoff_ms
        } else {
            self.backoff_base_ms
        };
        Duration::from_millis(base.saturating_mul(2u64.saturating_pow(attempt)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base_ms: 2_000,
            rate_limit_backoff_ms: 6_000,
        }
    }
}

/// Entropy scanner thresholds and scan limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionConfig {
    pub base64_min_len: usize,
    pub base64_min_entropy: f64,
    pub hex_min_len: usize,
    pub hex_min_entropy: f64,
    /// Texts larger than this are refused rather than scanned.
    pub max_scan_bytes: usize,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            base64_min_len: 20,
            base64_min_entropy: 4.5,
            hex_min_len: 32,
            hex_min_entropy: 3.0,
            max_scan_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Complete configuration consumed by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub budget: BudgetConfig,
    pub concurrency: ConcurrencyConfig,
    pub retry: RetryPolicy,
    pub redaction: RedactionConfig,
    /// Output token ceiling per model call.
    pub max_output_tokens: u32,
}

impl AnalysisConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Check invariants the pipeline relies on.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut problems = Vec::new();
        let b = &self.budget;

        if b.context_window == 0 {
            problems.push("budget.context_window must be positive".to_string());
        }
        if b.min_item_tokens == 0 {
            problems.push("budget.min_item_tokens must be positive".to_string());
        }
        if b.artifact_batch_ceiling == 0 {
            problems.push("budget.artifact_batch_ceiling must be positive".to_string());
        }
        for kind in [ItemKind::Step, ItemKind::Test, ItemKind::ArtifactBatch] {
            if b.weights.get(kind) == 0 {
                problems.push(format!("budget.weights.{kind} must be positive"));
            }
            if b.caps.get(kind) == 0 {
                problems.push(format!("budget.caps.{kind} must be positive"));
            }
        }
        if self.concurrency.max_in_flight == 0 {
            problems.push("concurrency.max_in_flight must be positive".to_string());
        }
        if self.concurrency.run_deadline_secs == 0 {
            problems.push("concurrency.run_deadline_secs must be positive".to_string());
        }
        if self.max_output_tokens == 0 {
            problems.push("max_output_tokens must be positive".to_string());
        }
        if self.redaction.base64_min_len < 8 || self.redaction.hex_min_len < 8 {
            problems.push("redaction minimum lengths must be at least 8".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            budget: BudgetConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            retry: RetryPolicy::default(),
            redaction: RedactionConfig::default(),
            max_output_tokens: 2_048,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        AnalysisConfig::default().validate().expect("valid");
    }

    #[test]
    fn test_default_reserved_overhead() {
        let budget = BudgetConfig::default();
        assert_eq!(budget.reserved_overhead(), 20_000);
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let mut config = AnalysisConfig::default();
        config.budget.context_window = 0;
        config.concurrency.max_in_flight = 0;
        config.budget.weights.test = 0;

        match config.validate() {
            Err(ConfigError::Invalid(problems)) => assert_eq!(problems.len(), 3),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn test_toml_overrides_subset() {
        let raw = r#"
            max_output_tokens = 1024

            [budget]
            context_window = 32000
            min_item_tokens = 500

            [budget.weights]
            step = 3
            test = 1
            artifact_batch = 1

            [retry]
            max_retries = 1
        "#;
        let config = AnalysisConfig::from_toml_str(raw).expect("parse");
        assert_eq!(config.budget.context_window, 32_000);
        assert_eq!(config.budget.min_item_tokens, 500);
        assert_eq!(config.budget.weights.step, 3);
        assert_eq!(config.budget.weights.test, 1);
        assert_eq!(config.budget.synthesis_reserve, 16_000);
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.concurrency.max_in_flight, 4);
    }

    #[test]
    fn test_toml_rejects_invalid_values() {
        let err = AnalysisConfig::from_toml_str("[concurrency]\nmax_in_flight = 0\n")
            .expect_err("zero workers");
        assert!(err.to_string().contains("max_in_flight"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "max_output_tokens = 512\n[concurrency]\nmax_in_flight = 2").expect("write");
        let config = AnalysisConfig::load(file.path()).expect("load");
        assert_eq!(config.concurrency.max_in_flight, 2);
        assert_eq!(config.max_output_tokens, 512);
    }

    #[test]
    fn test_retry_delay_doubles() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_base_ms: 100,
            rate_limit_backoff_ms: 1_000,
        };
        assert_eq!(policy.delay(0, false), Duration::from_millis(100));
        assert_eq!(policy.delay(2, false), Duration::from_millis(400));
        assert_eq!(policy.delay(1, true), Duration::from_millis(2_000));
    }
}
