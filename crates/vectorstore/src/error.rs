use thiserror::Error;

/// Failure modes from a vector-store operation. `counts_toward_breaker` decides whether a failure nudges the
/// breaker's consecutive-failure counter: authentication and other 4xx-class errors do not,
/// matching "Authentication errors and 4xx client errors do not count toward opening."
#[derive(Debug, Error, Clone)]
pub enum VectorStoreError {
  #[error("vector store connection failed: {0}")]
  Connection(String),
  #[error("vector store operation timed out after {0:?}")]
  Timeout(std::time::Duration),
  #[error("vector store server error ({status}): {message}")]
  Server { status: u16, message: String },
  #[error("vector store rejected request ({status}): {message}")]
  Client { status: u16, message: String },
  #[error("vector store authentication failed: {0}")]
  Authentication(String),
  #[error("circuit breaker is open; short-circuiting the call")]
  CircuitBreakerOpen,
  #[error("backup file invalid: {0}")]
  InvalidBackup(String),
  #[error("vector store I/O error: {0}")]
  Io(String),
  #[error("vector store serialization error: {0}")]
  Serialization(String),
}

impl VectorStoreError {
  pub fn counts_toward_breaker(&self) -> bool {
    matches!(self, VectorStoreError::Connection(_) | VectorStoreError::Timeout(_) | VectorStoreError::Server {.. })
  }

  pub fn is_retryable(&self) -> bool {
    matches!(self, VectorStoreError::Connection(_) | VectorStoreError::Timeout(_) | VectorStoreError::Server {.. })
  }
}

impl From<std::io::Error> for VectorStoreError {
  fn from(err: std::io::Error) -> Self {
    VectorStoreError::Io(err.to_string())
  }
}

impl From<serde_json::Error> for VectorStoreError {
  fn from(err: serde_json::Error) -> Self {
    VectorStoreError::Serialization(err.to_string())
  }
}
