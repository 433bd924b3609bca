use thiserror::Error;

use codeweaver_discovery::DiscoveryError;
use codeweaver_embedding::EmbeddingError;
use codeweaver_vectorstore::VectorStoreError;

/// Composite error surface for the indexer. Most failures here are per-file or
/// per-cycle and are recorded into an [`crate::indexer::IndexRunSummary`] rather than
/// propagated — this enum exists for the failures that abort an operation outright:
/// a bad project root, a manifest I/O failure, or an explicit caller mistake.
#[derive(Debug, Error)]
pub enum IndexerError {
  #[error("indexer misconfigured: {0}")]
  Configuration(String),
  #[error(transparent)]
  Discovery(#[from] DiscoveryError),
  #[error(transparent)]
  VectorStore(#[from] VectorStoreError),
  #[error(transparent)]
  Manifest(#[from] codeweaver_core::manifest::ManifestError),
  #[error(transparent)]
  Embedding(#[from] EmbeddingError),
  #[error("checkpoint I/O error: {0}")]
  Io(#[from] std::io::Error),
}

/// Per-file failure recorded during a run, never aborting the overall pass.
#[derive(Debug, Clone)]
pub struct FileFailure {
  pub relative_path: String,
  pub cause: String,
}
