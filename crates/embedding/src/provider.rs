use async_trait::async_trait;
use thiserror::Error;

/// Failure modes from an embedding provider call. The
/// `retryable` flag on `Provider` drives `ResilientProvider`'s backoff loop; `Authentication`
/// is never retried and marks the provider unhealthy for the rest of the process, which is
/// exactly the signal `QueryPipeline`'s strategy selection reads via `is_healthy`.
#[derive(Debug, Error, Clone)]
pub enum EmbeddingError {
  #[error("{provider} rejected credentials: {cause}")]
  Authentication { provider: String, cause: String },
  #[error("{provider} embedding call failed: {cause}")]
  Provider { provider: String, cause: String, retryable: bool },
  #[error("{provider} rate limit exceeded")]
  RateLimited { provider: String, retry_after: Option<std::time::Duration> },
  #[error("{provider} embedding call timed out")]
  Timeout { provider: String },
}

impl EmbeddingError {
  pub fn is_retryable(&self) -> bool {
    match self {
      EmbeddingError::Authentication {.. } => false,
      EmbeddingError::Provider { retryable,.. } => *retryable,
      EmbeddingError::RateLimited {.. } => true,
      EmbeddingError::Timeout {.. } => true,
    }
  }

  pub fn is_authentication(&self) -> bool {
    matches!(self, EmbeddingError::Authentication {.. })
  }

  pub fn provider_name(&self) -> &str {
    match self {
      EmbeddingError::Authentication { provider,.. } => provider,
      EmbeddingError::Provider { provider,.. } => provider,
      EmbeddingError::RateLimited { provider,.. } => provider,
      EmbeddingError::Timeout { provider } => provider,
    }
  }
}

impl From<reqwest::Error> for EmbeddingError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_timeout() {
      EmbeddingError::Timeout { provider: "http".into() }
    } else {
      EmbeddingError::Provider {
        provider: "http".into(),
        cause: err.to_string(),
        retryable: err.is_connect() || err.status().map(|s| s.is_server_error()).unwrap_or(true),
      }
    }
  }
}

/// A sparse vector: parallel `indices`/`values` arrays, matching the wire shape described in
/// `NamedSparseVector`.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector {
  pub indices: Vec<u32>,
  pub values: Vec<f32>,
}

/// Produces dense embeddings for document batches and single queries. One instance is built
/// per process per configured dense provider and reused for the process lifetime.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
  fn name(&self) -> &str;
  fn model_name(&self) -> &str;
  fn dimension(&self) -> usize;

  async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
  async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

  /// False once this provider has returned an `Authentication` error during this process, or
  /// while its circuit is open. Read by `QueryPipeline`'s strategy selection.
  fn is_healthy(&self) -> bool;
}

/// Produces sparse (BM25/SPLADE-style) embeddings. Same lifetime and health contract as
/// [`EmbeddingProvider`].
#[async_trait]
pub trait SparseEmbeddingProvider: Send + Sync {
  fn name(&self) -> &str;

  async fn embed_documents(&self, texts: &[String]) -> Result<Vec<SparseVector>, EmbeddingError>;
  async fn embed_query(&self, text: &str) -> Result<SparseVector, EmbeddingError>;

  fn is_healthy(&self) -> bool;
}
