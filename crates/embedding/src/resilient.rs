//! Retry/backoff wrapper. Wraps any [`EmbeddingProvider`] and reissues a failed
//! call until it succeeds, exhausts `max_retries`, or hits a non-retryable error.

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{EmbeddingError, EmbeddingProvider};

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
  pub max_retries: u32,
  pub base_delay: Duration,
  pub max_delay: Duration,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: 5,
      base_delay: Duration::from_millis(200),
      max_delay: Duration::from_secs(10),
    }
  }
}

/// Whether an error class belongs to the transient set in (HTTP 5xx, connection reset,
/// read timeout, 429). Authentication errors are excluded: they fail immediately.
pub fn is_retryable_error(err: &EmbeddingError) -> bool {
  err.is_retryable()
}

fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
  let exp = config.base_delay.as_millis().saturating_mul(1u128 << attempt.min(20));
  let capped = exp.min(config.max_delay.as_millis());
  let jitter_fraction = rand::rng().random_range(0.5..1.0);
  Duration::from_millis((capped as f64 * jitter_fraction) as u64)
}

/// Wraps an inner provider so every call retries transient failures with exponential
/// backoff and jitter, up to `max_retries` attempts total.
pub struct ResilientProvider<P: EmbeddingProvider> {
  inner: P,
  config: RetryConfig,
}

impl<P: EmbeddingProvider> ResilientProvider<P> {
  pub fn new(inner: P) -> Self {
    Self {
      inner,
      config: RetryConfig::default(),
    }
  }

  pub fn with_config(inner: P, config: RetryConfig) -> Self {
    Self { inner, config }
  }

  async fn retrying<T, F, Fut>(&self, op_name: &str, mut attempt_fn: F) -> Result<T, EmbeddingError>
  where
  F: FnMut() -> Fut,
  Fut: std::future::Future<Output = Result<T, EmbeddingError>>,
  {
    let mut last_err = None;
    for attempt in 0..=self.config.max_retries {
      match attempt_fn().await {
        Ok(value) => return Ok(value),
        Err(err) if !err.is_retryable() => return Err(err),
        Err(err) => {
          if attempt == self.config.max_retries {
            last_err = Some(err);
            break;
          }
          let delay = backoff_delay(&self.config, attempt);
          warn!(provider = %self.inner.name(), op = op_name, attempt, ?delay, error = %err, "retrying after transient embedding failure");
          tokio::time::sleep(delay).await;
          last_err = Some(err);
        }
      }
    }
    Err(last_err.expect("loop always runs at least once"))
  }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingProvider for ResilientProvider<P> {
  fn name(&self) -> &str {
    self.inner.name()
  }

  fn model_name(&self) -> &str {
    self.inner.model_name()
  }

  fn dimension(&self) -> usize {
    self.inner.dimension()
  }

  async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    debug!(provider = %self.name(), count = texts.len(), "embedding document batch");
    self.retrying("embed_documents", || self.inner.embed_documents(texts)).await
  }

  async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    self.retrying("embed_query", || self.inner.embed_query(text)).await
  }

  fn is_healthy(&self) -> bool {
    self.inner.is_healthy()
  }
}

pub fn wrap_resilient<P: EmbeddingProvider>(provider: P, config: RetryConfig) -> ResilientProvider<P> {
  ResilientProvider::with_config(provider, config)
}

/// Same wrapper over a type-erased `Arc<dyn EmbeddingProvider>`, for callers (the `Indexer`,
/// `QueryPipeline`) that hold providers behind a trait object rather than a concrete type.
pub struct ResilientArcProvider {
  inner: Arc<dyn EmbeddingProvider>,
  config: RetryConfig,
}

impl ResilientArcProvider {
  pub fn new(inner: Arc<dyn EmbeddingProvider>, config: RetryConfig) -> Self {
    Self { inner, config }
  }
}

#[async_trait]
impl EmbeddingProvider for ResilientArcProvider {
  fn name(&self) -> &str {
    self.inner.name()
  }

  fn model_name(&self) -> &str {
    self.inner.model_name()
  }

  fn dimension(&self) -> usize {
    self.inner.dimension()
  }

  async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let mut last_err = None;
    for attempt in 0..=self.config.max_retries {
      match self.inner.embed_documents(texts).await {
        Ok(value) => return Ok(value),
        Err(err) if !err.is_retryable() => return Err(err),
        Err(err) => {
          if attempt == self.config.max_retries {
            last_err = Some(err);
            break;
          }
          tokio::time::sleep(backoff_delay(&self.config, attempt)).await;
          last_err = Some(err);
        }
      }
    }
    Err(last_err.expect("loop always runs at least once"))
  }

  async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let mut last_err = None;
    for attempt in 0..=self.config.max_retries {
      match self.inner.embed_query(text).await {
        Ok(value) => return Ok(value),
        Err(err) if !err.is_retryable() => return Err(err),
        Err(err) => {
          if attempt == self.config.max_retries {
            last_err = Some(err);
            break;
          }
          tokio::time::sleep(backoff_delay(&self.config, attempt)).await;
          last_err = Some(err);
        }
      }
    }
    Err(last_err.expect("loop always runs at least once"))
  }

  fn is_healthy(&self) -> bool {
    self.inner.is_healthy()
  }
}

pub fn wrap_resilient_arc(provider: Arc<dyn EmbeddingProvider>, config: RetryConfig) -> ResilientArcProvider {
  ResilientArcProvider::new(provider, config)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct FlakyProvider {
    failures_before_success: usize,
    calls: AtomicUsize,
  }

  #[async_trait]
  impl EmbeddingProvider for FlakyProvider {
    fn name(&self) -> &str {
      "flaky"
    }
    fn model_name(&self) -> &str {
      "flaky-model"
    }
    fn dimension(&self) -> usize {
      4
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
      let call = self.calls.fetch_add(1, Ordering::SeqCst);
      if call < self.failures_before_success {
        return Err(EmbeddingError::Provider {
            provider: "flaky".into(),
            cause: "connection reset".into(),
            retryable: true,
          });
      }
      Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
      Ok(vec![0.0; 4])
    }

    fn is_healthy(&self) -> bool {
      true
    }
  }

  #[tokio::test]
  async fn retries_transient_failures_until_success() {
    let provider = ResilientProvider::with_config(
      FlakyProvider {
        failures_before_success: 2,
        calls: AtomicUsize::new(0),
      },
      RetryConfig {
        max_retries: 5,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
      },
    );
    let result = provider.embed_documents(&["a".to_string()]).await.unwrap();
    assert_eq!(result.len(), 1);
  }

  #[tokio::test]
  async fn gives_up_after_max_retries() {
    let provider = ResilientProvider::with_config(
      FlakyProvider {
        failures_before_success: 100,
        calls: AtomicUsize::new(0),
      },
      RetryConfig {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
      },
    );
    let err = provider.embed_documents(&["a".to_string()]).await.unwrap_err();
    assert!(err.is_retryable());
  }

  #[tokio::test]
  async fn does_not_retry_authentication_errors() {
    struct AlwaysAuthFails;
    #[async_trait]
    impl EmbeddingProvider for AlwaysAuthFails {
      fn name(&self) -> &str {
        "auth-fail"
      }
      fn model_name(&self) -> &str {
        "m"
      }
      fn dimension(&self) -> usize {
        4
      }
      async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Authentication {
            provider: "auth-fail".into(),
            cause: "bad key".into(),
          })
      }
      async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        unreachable!()
      }
      fn is_healthy(&self) -> bool {
        false
      }
    }

    let provider = ResilientProvider::new(AlwaysAuthFails);
    let err = provider.embed_documents(&["a".to_string()]).await.unwrap_err();
    assert!(err.is_authentication());
  }
}
