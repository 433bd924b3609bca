use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseEmbedding {
  pub batch_id: Uuid,
  pub batch_index: u32,
  pub model_name: String,
  pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseEmbedding {
  pub batch_id: Uuid,
  pub batch_index: u32,
  pub model_name: String,
  pub indices: Vec<u32>,
  pub values: Vec<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingRegistryEntry {
  pub dense: Option<DenseEmbedding>,
  pub sparse: Option<SparseEmbedding>,
}

/// Process-wide map from `chunk_id` to its embedding(s). Populated during ingest; read by
/// vector-store upsert and by reconciliation. Not owned as an ambient global: it is held by
/// a root context object (see `codeweaver_core::Context`) and passed explicitly to whatever
/// needs it, so tests can construct a fresh one instead of clearing shared process state.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingRegistry {
  entries: Arc<DashMap<Uuid, EmbeddingRegistryEntry>>,
}

impl EmbeddingRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_dense(&self, chunk_id: Uuid, embedding: DenseEmbedding) {
    self.entries.entry(chunk_id).or_default().dense = Some(embedding);
  }

  pub fn set_sparse(&self, chunk_id: Uuid, embedding: SparseEmbedding) {
    self.entries.entry(chunk_id).or_default().sparse = Some(embedding);
  }

  pub fn get(&self, chunk_id: &Uuid) -> Option<EmbeddingRegistryEntry> {
    self.entries.get(chunk_id).map(|e| e.clone())
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Test-boundary reset, required by shared-resource policy.
  pub fn clear(&self) {
    self.entries.clear();
  }
}
