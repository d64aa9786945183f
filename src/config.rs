//! Engine configuration
//!
//! Plain serde structs with per-field defaults. Locating and reading the
//! configuration file is the host application's job; this module only
//! parses and validates.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level configuration for all engines
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Embedding provider and gateway settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chunker settings
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Search and ranking settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Staleness thresholds
    #[serde(default)]
    pub staleness: StalenessConfig,
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider kind: `ollama`, `openai` or `mock`
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API endpoint URL
    pub endpoint: Option<String>,

    /// Model name to use
    pub model: Option<String>,

    /// API key (if required)
    pub api_key: Option<String>,

    /// Dimensionality every returned vector must have
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Inputs longer than this many characters are truncated
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    /// Retries after the first attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay in milliseconds, doubled per retry
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Upper bound on a single backoff delay
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Timeout for a single provider call
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum provider calls in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

/// Chunker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Units longer than this are hard split at whitespace
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Whether code-like paths go through tree-sitter first
    #[serde(default = "default_true")]
    pub syntax_aware: bool,
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum ranked documents returned
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,

    /// Nearest chunks fetched before aggregation
    #[serde(default = "default_candidate_chunks")]
    pub candidate_chunks: usize,

    /// Chunks below this cosine similarity are ignored
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,

    /// Bonus per additional matching chunk of the same document
    #[serde(default = "default_multi_hit_bonus")]
    pub multi_hit_bonus: f64,

    /// Characters of chunk text shown in a hit snippet
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,

    /// Near-miss suggestions returned by a failed read
    #[serde(default = "default_suggestion_limit")]
    pub suggestion_limit: usize,

    /// Minimum identifier similarity for a suggestion
    #[serde(default = "default_suggestion_threshold")]
    pub suggestion_threshold: f64,
}

/// Staleness thresholds in days
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StalenessConfig {
    #[serde(default = "default_fresh_days")]
    pub fresh_days: i64,

    #[serde(default = "default_aging_days")]
    pub aging_days: i64,

    #[serde(default = "default_stale_days")]
    pub stale_days: i64,

    /// Access count at which usage weighting saturates (0 disables it)
    #[serde(default = "default_usage_cap")]
    pub usage_cap: u64,

    /// Extra age multiplier applied at saturation
    #[serde(default = "default_usage_weight")]
    pub usage_weight: f64,
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_dimension() -> usize {
    512
}

fn default_max_input_chars() -> usize {
    8000
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    4000
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_concurrency() -> usize {
    4
}

fn default_max_chunk_chars() -> usize {
    2000
}

fn default_true() -> bool {
    true
}

fn default_result_limit() -> usize {
    10
}

fn default_candidate_chunks() -> usize {
    50
}

fn default_min_similarity() -> f64 {
    0.25
}

fn default_multi_hit_bonus() -> f64 {
    0.02
}

fn default_snippet_chars() -> usize {
    200
}

fn default_suggestion_limit() -> usize {
    5
}

fn default_suggestion_threshold() -> f64 {
    0.35
}

fn default_fresh_days() -> i64 {
    30
}

fn default_aging_days() -> i64 {
    90
}

fn default_stale_days() -> i64 {
    180
}

fn default_usage_cap() -> u64 {
    50
}

fn default_usage_weight() -> f64 {
    0.5
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            endpoint: None,
            model: None,
            api_key: None,
            dimension: default_dimension(),
            max_input_chars: default_max_input_chars(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_ms: default_timeout_ms(),
            concurrency: default_concurrency(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
            syntax_aware: true,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            result_limit: default_result_limit(),
            candidate_chunks: default_candidate_chunks(),
            min_similarity: default_min_similarity(),
            multi_hit_bonus: default_multi_hit_bonus(),
            snippet_chars: default_snippet_chars(),
            suggestion_limit: default_suggestion_limit(),
            suggestion_threshold: default_suggestion_threshold(),
        }
    }
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            fresh_days: default_fresh_days(),
            aging_days: default_aging_days(),
            stale_days: default_stale_days(),
            usage_cap: default_usage_cap(),
            usage_weight: default_usage_weight(),
        }
    }
}

impl EngineConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(content).context("Failed to parse engine configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML text
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize engine configuration")
    }

    /// Reject settings the engines cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            anyhow::bail!("embedding.dimension must be greater than zero");
        }
        if self.embedding.concurrency == 0 {
            anyhow::bail!("embedding.concurrency must be at least 1");
        }
        if self.chunking.max_chunk_chars < 16 {
            anyhow::bail!("chunking.max_chunk_chars must be at least 16");
        }
        let s = &self.staleness;
        if !(s.fresh_days <= s.aging_days && s.aging_days <= s.stale_days) {
            anyhow::bail!("staleness thresholds must satisfy fresh <= aging <= stale");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.embedding.dimension, 512);
        assert_eq!(config.search.result_limit, 10);
        assert!(config.chunking.syntax_aware);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
[embedding]
provider = "openai"
model = "text-embedding-3-small"
dimension = 1536

[staleness]
fresh_days = 14
"#,
        )
        .unwrap();

        assert_eq!(config.embedding.provider, "openai");
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.embedding.max_retries, 3);
        assert_eq!(config.staleness.fresh_days, 14);
        assert_eq!(config.staleness.stale_days, 180);
    }

    #[test]
    fn test_invalid_thresholds() {
        let result = EngineConfig::from_toml_str(
            r#"
[staleness]
fresh_days = 100
aging_days = 50
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_roundtrip_toml() {
        let config = EngineConfig::default();
        let text = config.to_toml_string().unwrap();
        let parsed = EngineConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.search.candidate_chunks, config.search.candidate_chunks);
    }
}
