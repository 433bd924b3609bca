use thiserror::Error;

use codeweaver_vectorstore::VectorStoreError;

/// Failure modes specific to the failover subsystem.
#[derive(Debug, Error)]
pub enum FailoverError {
  #[error("backup activation refused: {0}")]
  MemoryRefused(String),
  #[error(transparent)]
  VectorStore(#[from] VectorStoreError),
  #[error("backup file I/O error: {0}")]
  Io(#[from] std::io::Error),
}
