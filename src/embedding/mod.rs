//! Embedding generation for chunk and query text
//!
//! Supports local embedding via Ollama or compatible OpenAI-style endpoints.
//! Providers only make a single attempt; retries, timeouts, truncation and
//! dimension checks live in the [`EmbeddingGateway`].

mod gateway;

pub use gateway::{BatchOutcome, EmbeddingGateway};

use crate::config::EmbeddingConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single embedding request
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmbedError {
    /// Network error, rate limit or server error; worth retrying
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// Authentication or request rejected; never retried
    #[error("provider rejected request: {0}")]
    Fatal(String),

    /// Vector of the wrong length; never retried
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A single call exceeded its deadline
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    /// Every attempt failed with a retryable error
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl EmbedError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, EmbedError::Transient(_) | EmbedError::Timeout(_))
    }
}

/// Map an HTTP status to transient or fatal
fn classify_status(status: reqwest::StatusCode, body: String) -> EmbedError {
    let message = format!("{} - {}", status, body);
    if status.as_u16() == 429 || status.is_server_error() {
        EmbedError::Transient(message)
    } else {
        EmbedError::Fatal(message)
    }
}

/// Send a provider request and decode its JSON body
async fn send_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, EmbedError> {
    let response = request
        .send()
        .await
        .map_err(|e| EmbedError::Transient(format!("request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(status, body));
    }

    response
        .json()
        .await
        .map_err(|e| EmbedError::Fatal(format!("malformed response: {}", e)))
}

/// A backend that turns text into a vector
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate the embedding for a single text, one attempt
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Model identifier
    fn model_name(&self) -> &str;
}

/// Build the provider named in the configuration
pub fn create_provider(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let timeout = Duration::from_millis(config.timeout_ms);
    match config.provider.as_str() {
        "ollama" => {
            let model = config.model.as_deref().unwrap_or("nomic-embed-text");
            let endpoint = config
                .endpoint
                .as_deref()
                .unwrap_or("http://localhost:11434");
            Ok(Arc::new(
                LocalEmbedding::new(endpoint, model, timeout)?.with_dimension(config.dimension),
            ))
        }
        "openai" => {
            let model = config
                .model
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
            let endpoint = config
                .endpoint
                .as_deref()
                .unwrap_or("https://api.openai.com");
            Ok(Arc::new(
                OpenAIEmbedding::new(endpoint, model, config.api_key.as_deref(), timeout)?
                    .with_dimension(config.dimension),
            ))
        }
        "mock" => Ok(Arc::new(MockEmbedding::new(config.dimension))),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}

/// Ollama `/api/embeddings` provider
pub struct LocalEmbedding {
    endpoint: String,
    model: String,
    client: reqwest::Client,
    dimension: usize,
}

impl LocalEmbedding {
    pub fn new(endpoint: &str, model: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
            dimension: 512,
        })
    }

    /// Set the embedding dimension
    pub fn with_dimension(mut self, dim: usize) -> Self {
        self.dimension = dim;
        self
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let body = OllamaRequest {
            model: &self.model,
            prompt: text,
        };
        let request = self
            .client
            .post(format!("{}/api/embeddings", self.endpoint))
            .json(&body);

        let reply: OllamaReply = send_json(request).await?;
        Ok(reply.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaReply {
    embedding: Vec<f32>,
}

/// Provider for any `/v1/embeddings` endpoint speaking the OpenAI format
pub struct OpenAIEmbedding {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
    dimension: usize,
}

impl OpenAIEmbedding {
    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.map(str::to_string),
            client: reqwest::Client::builder().timeout(timeout).build()?,
            dimension: 512,
        })
    }

    /// Set the embedding dimension
    pub fn with_dimension(mut self, dim: usize) -> Self {
        self.dimension = dim;
        self
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAIEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let body = OpenAIRequest {
            model: &self.model,
            input: vec![text],
            dimensions: self.dimension,
        };
        let mut request = self
            .client
            .post(format!("{}/v1/embeddings", self.endpoint))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let reply: OpenAIReply = send_json(request).await?;
        reply
            .data
            .into_iter()
            .min_by_key(|d| d.index)
            .map(|d| d.embedding)
            .ok_or_else(|| EmbedError::Fatal("no embedding returned".to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAIReply {
    data: Vec<OpenAIItem>,
}

#[derive(Debug, Deserialize)]
struct OpenAIItem {
    index: usize,
    embedding: Vec<f32>,
}

/// Mock embedding provider for testing
///
/// Vectors are derived from chained SHA-256 digests of the text, so equal
/// texts embed identically and unrelated texts are close to orthogonal.
pub struct MockEmbedding {
    dimension: usize,
}

impl MockEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Deterministic vector for `text`
    pub fn vector_for(text: &str, dimension: usize) -> Vec<f32> {
        let mut values = Vec::with_capacity(dimension);
        let mut digest = Sha256::digest(text.as_bytes());

        while values.len() < dimension {
            for byte in digest.iter() {
                if values.len() == dimension {
                    break;
                }
                values.push((*byte as f32 / 127.5) - 1.0);
            }
            digest = Sha256::digest(digest);
        }

        values
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(Self::vector_for(text, self.dimension))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// Cosine similarity; 0.0 for mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f64 = a.iter().zip(b.iter()).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Encode a vector as little-endian bytes for BLOB storage
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a BLOB written by [`vec_to_blob`]
pub fn blob_to_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
