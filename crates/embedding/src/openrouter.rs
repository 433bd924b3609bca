use crate::rate_limit::{RateLimitConfig, SlidingWindowLimiter};
use crate::{EmbeddingError, EmbeddingProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/embeddings";
const DEFAULT_MODEL: &str = "openai/text-embedding-3-small";
const DEFAULT_DIMENSIONS: usize = 1536;
/// Default max batch size for OpenRouter.
/// OpenRouter accepts multiple texts per request, but very large batches
/// may hit token limits or timeout. 64 is a reasonable default.
const DEFAULT_MAX_BATCH_SIZE: usize = 64;

/// OpenAI-wire-format-compatible dense provider. Used directly for OpenRouter and as the
/// grounding for the `openai_compatible(name)` provider kind: any endpoint that speaks
/// the same `POST {model, input} -> {data: [{embedding}]}` shape fits this client by swapping
/// `base_url`.
#[derive(Debug, Clone)]
pub struct OpenRouterProvider {
  client: reqwest::Client,
  base_url: String,
  api_key: String,
  model: String,
  dimensions: usize,
  /// Maximum texts per batch request
  max_batch_size: usize,
  /// Rate limiter for HTTP requests (shared across clones)
  rate_limiter: Arc<Mutex<SlidingWindowLimiter>>,
  healthy: Arc<AtomicBool>,
}

impl OpenRouterProvider {
  pub fn new(api_key: impl Into<String>) -> Self {
    Self {
      client: reqwest::Client::new(),
      base_url: OPENROUTER_URL.to_string(),
      api_key: api_key.into(),
      model: DEFAULT_MODEL.to_string(),
      dimensions: DEFAULT_DIMENSIONS,
      max_batch_size: DEFAULT_MAX_BATCH_SIZE,
      rate_limiter: Arc::new(Mutex::new(SlidingWindowLimiter::new(RateLimitConfig::for_openrouter()))),
      healthy: Arc::new(AtomicBool::new(true)),
    }
  }

  /// Point at any other OpenAI-wire-compatible embeddings endpoint.
  pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
    self.base_url = base_url.into();
    self
  }

  pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
    self.model = model.into();
    self.dimensions = dimensions;
    self
  }

  /// Set the maximum batch size for embedding requests
  pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
    self.max_batch_size = max_batch_size.max(1); // At least 1
    self
  }

  /// Set a custom rate limit configuration
  pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
    self.rate_limiter = Arc::new(Mutex::new(SlidingWindowLimiter::new(config)));
    self
  }

  /// Get the current max batch size
  pub fn max_batch_size(&self) -> usize {
    self.max_batch_size
  }

  pub fn from_env() -> Option<Self> {
    std::env::var("OPENROUTER_API_KEY").ok().map(Self::new)
  }

  /// Acquire a rate limit slot, waiting if necessary
  async fn acquire_rate_limit_slot(&self) -> Result<(), EmbeddingError> {
    use std::time::Instant;
    use tokio::time::sleep;

    let config = RateLimitConfig::for_openrouter();
    let start = Instant::now();

    loop {
      let wait_time = {
        let mut limiter = self.rate_limiter.lock().await;
        limiter.check_and_record()
      };

      match wait_time {
        None => {
          // Slot acquired
          return Ok(());
        }
        Some(wait) => {
          // Check if we've exceeded max wait time
          if start.elapsed() + wait > config.max_wait {
            warn!("Rate limiter: max wait time exceeded ({:?})", config.max_wait);
            return Err(EmbeddingError::RateLimited {
                provider: self.name().to_string(),
                retry_after: Some(wait),
              });
          }

          debug!("Rate limiter: waiting {:?} for slot", wait);
          sleep(wait).await;
        }
      }
    }
  }

  /// Embed a single batch of texts (internal helper)
  /// Rate limiting is applied here at the HTTP request level.
  async fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }

    // Acquire rate limit slot before making HTTP request
    self.acquire_rate_limit_slot().await?;

    let request = EmbeddingRequest {
      model: &self.model,
      input: EmbeddingInput::Batch(texts),
    };

    debug!(
      "Embedding batch of {} texts with {} (model: {})",
      texts.len(),
      self.name(),
      self.model
    );

    let response = self
    .client
    .post(&self.base_url)
    .header("Authorization", format!("Bearer {}", self.api_key))
    .header("Content-Type", "application/json")
    .json(&request)
    .send()
    .await?;

    if response.status() == reqwest::StatusCode::UNAUTHORIZED || response.status() == reqwest::StatusCode::FORBIDDEN {
      let body = response.text().await.unwrap_or_default();
      self.healthy.store(false, Ordering::Relaxed);
      return Err(EmbeddingError::Authentication {
          provider: self.name().to_string(),
          cause: body,
        });
    }

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      warn!("{} batch embedding failed: {} - {}", self.name(), status, body);
      return Err(EmbeddingError::Provider {
          provider: self.name().to_string(),
          cause: format!("{} returned {}: {}", self.name(), status, body),
          retryable: status.is_server_error(),
        });
    }

    let result: EmbeddingResponse = response.json().await?;

    if result.data.len() != texts.len() {
      warn!(
        "Batch size mismatch: got {} embeddings for {} inputs",
        result.data.len(),
        texts.len()
      );
      return Err(EmbeddingError::Provider {
          provider: self.name().to_string(),
          cause: format!("batch size mismatch: got {} embeddings for {} inputs", result.data.len(), texts.len()),
          retryable: false,
        });
    }

    Ok(result.data.into_iter().map(|d| d.embedding).collect())
  }

  /// Embed texts with sub-batching and full concurrent processing.
  ///
  /// Splits large batches into sub-batches of max_batch_size and processes
  /// them concurrently. Rate limiting is handled at the HTTP request level
  /// inside embed_single_batch, so we can safely send all sub-batches
  /// concurrently - the rate limiter will naturally throttle them.
  async fn embed_batch_concurrent(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let num_batches = texts.len().div_ceil(self.max_batch_size);

    // For single batch, no concurrency overhead needed
    if num_batches <= 1 {
      return self.embed_single_batch(texts).await;
    }

    debug!(
      "Processing {} texts in {} concurrent sub-batches (max batch size: {})",
      texts.len(),
      num_batches,
      self.max_batch_size
    );

    // Create indexed sub-batch tasks - NO semaphore limit, rate limiter handles throttling
    let futures: Vec<_> = texts
    .chunks(self.max_batch_size)
    .enumerate()
    .map(|(batch_idx, chunk)| {
        let provider = self.clone();
        let chunk_owned = chunk.to_vec();
        async move {
          let embeddings = provider.embed_single_batch(&chunk_owned).await?;
          Ok::<_, EmbeddingError>((batch_idx, embeddings))
        }
      })
    .collect();

    // Wait for all batches concurrently - rate limiter inside embed_single_batch
    // will naturally throttle to stay within OpenRouter's 70 req/10s limit
    #[allow(clippy::type_complexity)]
    let results: Vec<Result<(usize, Vec<Vec<f32>>), EmbeddingError>> = futures::future::join_all(futures).await;

    // Collect and sort results by batch index to maintain order
    let mut indexed_results: Vec<(usize, Vec<Vec<f32>>)> = Vec::with_capacity(num_batches);
    for result in results {
      indexed_results.push(result?);
    }
    indexed_results.sort_by_key(|(idx, _)| *idx);

    // Flatten into final result
    let mut all_embeddings = Vec::with_capacity(texts.len());
    for (_, embeddings) in indexed_results {
      all_embeddings.extend(embeddings);
    }

    info!(
      "Batch embedded {} texts in {} concurrent sub-batches",
      texts.len(),
      num_batches
    );

    Ok(all_embeddings)
  }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  input: EmbeddingInput<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum EmbeddingInput<'a> {
  Single(&'a str),
  Batch(&'a [String]),
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
  data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
  embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenRouterProvider {
  fn name(&self) -> &str {
    "openrouter"
  }

  fn model_name(&self) -> &str {
    &self.model
  }

  fn dimension(&self) -> usize {
    self.dimensions
  }

  async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }

    self.embed_batch_concurrent(texts).await
  }

  async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    // Acquire rate limit slot before making HTTP request
    self.acquire_rate_limit_slot().await?;

    let request = EmbeddingRequest {
      model: &self.model,
      input: EmbeddingInput::Single(text),
    };

    debug!("Embedding text with {}: {} chars", self.name(), text.len());

    let response = self
    .client
    .post(&self.base_url)
    .header("Authorization", format!("Bearer {}", self.api_key))
    .header("Content-Type", "application/json")
    .json(&request)
    .send()
    .await?;

    if response.status() == reqwest::StatusCode::UNAUTHORIZED || response.status() == reqwest::StatusCode::FORBIDDEN {
      let body = response.text().await.unwrap_or_default();
      self.healthy.store(false, Ordering::Relaxed);
      return Err(EmbeddingError::Authentication {
          provider: self.name().to_string(),
          cause: body,
        });
    }

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      warn!("{} embedding failed: {} - {}", self.name(), status, body);
      return Err(EmbeddingError::Provider {
          provider: self.name().to_string(),
          cause: format!("{} returned {}: {}", self.name(), status, body),
          retryable: status.is_server_error(),
        });
    }

    let result: EmbeddingResponse = response.json().await?;

    result.data.into_iter().next().map(|d| d.embedding).ok_or_else(|| EmbeddingError::Provider {
        provider: self.name().to_string(),
        cause: "no embedding in response".into(),
        retryable: false,
      })
  }

  fn is_healthy(&self) -> bool {
    self.healthy.load(Ordering::Relaxed) && !self.api_key.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_provider_new() {
    let provider = OpenRouterProvider::new("test-key");
    assert_eq!(provider.name(), "openrouter");
    assert_eq!(provider.model_name(), DEFAULT_MODEL);
    assert_eq!(provider.dimension(), DEFAULT_DIMENSIONS);
    assert_eq!(provider.max_batch_size, DEFAULT_MAX_BATCH_SIZE);
  }

  #[test]
  fn test_provider_customization() {
    let provider = OpenRouterProvider::new("test-key")
    .with_model("custom/model", 512)
    .with_max_batch_size(32);

    assert_eq!(provider.model_name(), "custom/model");
    assert_eq!(provider.dimension(), 512);
    assert_eq!(provider.max_batch_size, 32);
  }

  #[test]
  fn test_max_batch_size_minimum() {
    // Batch size should never be 0
    let provider = OpenRouterProvider::new("test-key").with_max_batch_size(0);
    assert_eq!(provider.max_batch_size, 1);
  }

  #[test]
  fn test_from_env_missing() {
    // Clear any existing env var for this test
    unsafe {
      std::env::remove_var("OPENROUTER_API_KEY");
    }
    assert!(OpenRouterProvider::from_env().is_none());
  }

  #[test]
  fn test_is_healthy_with_key() {
    let provider = OpenRouterProvider::new("test-key");
    assert!(provider.is_healthy());
  }

  #[test]
  fn test_is_healthy_without_key() {
    let provider = OpenRouterProvider::new("");
    assert!(!provider.is_healthy());
  }

  #[test]
  fn test_with_base_url_overrides_endpoint() {
    let provider = OpenRouterProvider::new("test-key").with_base_url("http://localhost:8000/v1/embeddings");
    assert_eq!(provider.base_url, "http://localhost:8000/v1/embeddings");
  }

  #[test]
  fn test_batch_splitting_calculation() {
    let provider = OpenRouterProvider::new("test-key").with_max_batch_size(10);

    // 25 texts should be split into 3 batches (10 + 10 + 5)
    let num_batches = 25_usize.div_ceil(provider.max_batch_size);
    assert_eq!(num_batches, 3);

    // 10 texts should be 1 batch
    let num_batches = 10_usize.div_ceil(provider.max_batch_size);
    assert_eq!(num_batches, 1);

    // 11 texts should be 2 batches
    let num_batches = 11_usize.div_ceil(provider.max_batch_size);
    assert_eq!(num_batches, 2);
  }

  #[tokio::test]
  async fn test_embed_batch_empty() {
    let provider = OpenRouterProvider::new("test-key");
    let result = provider.embed_documents(&[]).await;
    assert!(result.is_ok());
    assert!(result.unwrap().is_empty());
  }
}
