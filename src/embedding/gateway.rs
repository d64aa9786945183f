//! Embedding gateway
//!
//! Wraps a provider with the rules every embedding call must follow:
//! - Inputs over the size limit are truncated on a char boundary
//! - Each call has a timeout
//! - Transient failures are retried with exponential backoff
//! - A vector of the wrong length is rejected without retrying
//! - Batches run concurrently, bounded by a shared semaphore, and one
//!   failed item never aborts its siblings

use super::{EmbedError, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Per-item results of a batch, in input order
#[derive(Debug)]
pub struct BatchOutcome {
    pub results: Vec<Result<Vec<f32>, EmbedError>>,
}

impl BatchOutcome {
    /// Number of items that produced a vector
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    /// Number of items that failed
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

/// Retry, timeout and limit settings resolved from configuration
#[derive(Debug, Clone)]
struct Policy {
    dimension: usize,
    max_input_chars: usize,
    max_retries: u32,
    base_backoff: Duration,
    max_backoff: Duration,
    timeout: Duration,
}

impl Policy {
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Rate-limited, retrying front door to an embedding provider
#[derive(Clone)]
pub struct EmbeddingGateway {
    provider: Arc<dyn EmbeddingProvider>,
    policy: Arc<Policy>,
    permits: Arc<Semaphore>,
}

impl EmbeddingGateway {
    /// Create a gateway over `provider`
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        if provider.dimension() != config.dimension {
            tracing::warn!(
                provider = provider.model_name(),
                provider_dimension = provider.dimension(),
                configured = config.dimension,
                "provider dimension differs from configuration; responses will be checked against the configured value"
            );
        }

        Self {
            provider,
            policy: Arc::new(Policy {
                dimension: config.dimension,
                max_input_chars: config.max_input_chars,
                max_retries: config.max_retries,
                base_backoff: Duration::from_millis(config.base_backoff_ms),
                max_backoff: Duration::from_millis(config.max_backoff_ms),
                timeout: Duration::from_millis(config.timeout_ms),
            }),
            permits: Arc::new(Semaphore::new(config.concurrency.max(1))),
        }
    }

    /// Dimension every returned vector has
    pub fn dimension(&self) -> usize {
        self.policy.dimension
    }

    /// Embed one text
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| EmbedError::Fatal("gateway closed".to_string()))?;
        embed_with_retry(self.provider.as_ref(), &self.policy, text).await
    }

    /// Embed many texts concurrently; results are in input order
    pub async fn embed_many(&self, texts: Vec<String>) -> BatchOutcome {
        let total = texts.len();
        let mut tasks = JoinSet::new();

        for (index, text) in texts.into_iter().enumerate() {
            let provider = Arc::clone(&self.provider);
            let policy = Arc::clone(&self.policy);
            let permits = Arc::clone(&self.permits);

            tasks.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => embed_with_retry(provider.as_ref(), &policy, &text).await,
                    Err(_) => Err(EmbedError::Fatal("gateway closed".to_string())),
                };
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<Vec<f32>, EmbedError>>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => tracing::error!("embedding task failed to complete: {}", e),
            }
        }

        BatchOutcome {
            results: results
                .into_iter()
                .map(|r| r.unwrap_or_else(|| Err(EmbedError::Fatal("task aborted".to_string()))))
                .collect(),
        }
    }
}

/// Truncate `text` to at most `max_chars` characters
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

async fn embed_with_retry(
    provider: &dyn EmbeddingProvider,
    policy: &Policy,
    text: &str,
) -> Result<Vec<f32>, EmbedError> {
    let input = truncate_chars(text, policy.max_input_chars);
    if input.len() < text.len() {
        tracing::debug!(
            original_bytes = text.len(),
            max_chars = policy.max_input_chars,
            "embedding input truncated"
        );
    }

    let attempts = policy.max_retries + 1;
    let mut last_error = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            tokio::time::sleep(policy.backoff(attempt)).await;
        }

        let result = match tokio::time::timeout(policy.timeout, provider.embed(input)).await {
            Ok(result) => result,
            Err(_) => Err(EmbedError::Timeout(policy.timeout)),
        };

        match result {
            Ok(vector) if vector.len() == policy.dimension => return Ok(vector),
            Ok(vector) => {
                return Err(EmbedError::DimensionMismatch {
                    expected: policy.dimension,
                    actual: vector.len(),
                })
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!("Embedding request failed (attempt {}): {}", attempt + 1, e);
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(EmbedError::Exhausted {
        attempts,
        last: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string()),
    })
}
