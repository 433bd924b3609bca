//! Shared data model, configuration, and process-wide state for the CodeWeaver indexing
//! core: the types every other `codeweaver-*` crate builds on.

pub mod chunk;
pub mod config;
pub mod discovered_file;
pub mod fingerprint;
pub mod language;
pub mod manifest;
pub mod registry;
pub mod search;
pub mod stats;

pub use chunk::{BatchKey, BatchKeys, Chunk, ChunkerType, Classification, ImportanceScores};
pub use config::IndexerSettings;
pub use discovered_file::{DiscoveredFile, normalize_relative_path};
pub use fingerprint::{CheckpointSettingsFingerprint, compute_fingerprint};
pub use language::Language;
pub use manifest::{IndexFileManifest, ManifestEntry, ManifestError};
pub use registry::{DenseEmbedding, EmbeddingRegistry, EmbeddingRegistryEntry, SparseEmbedding};
pub use search::{FindCodeResponseSummary, LatencyBreakdown, SearchResult, Strategy, sort_results};
pub use stats::{Statistics, StatisticsSnapshot};

/// Process-wide collaborators (`DedupStore`'s hash set lives in `codeweaver-chunker`, which
/// depends on this crate) bundled into one explicit object rather than ambient globals, so
/// tests build a fresh `Context` instead of clearing shared process state. Passed by
/// reference into the `Indexer` and `QueryPipeline` constructors.
#[derive(Debug, Clone, Default)]
pub struct Context {
  pub registry: EmbeddingRegistry,
  pub stats: Statistics,
}

impl Context {
  pub fn new() -> Self {
    Self::default()
  }
}
