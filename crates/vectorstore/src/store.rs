use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::circuit_breaker::BreakerState;
use crate::error::VectorStoreError;

/// A sparse vector in Qdrant's `(indices, values)` wire shape, mirroring
/// `codeweaver_core::registry::SparseEmbedding` minus its batch bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseVectorData {
  pub indices: Vec<u32>,
  pub values: Vec<f32>,
}

/// One point's vectors, keyed under the named-vector slots `"dense"` / `"sparse"` a
/// collection is created with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointVectors {
  pub dense: Option<Vec<f32>>,
  pub sparse: Option<SparseVectorData>,
}

/// A chunk ready to be written to the store: its vectors plus the payload fields queries
/// and reconciliation read back without touching the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertPoint {
  pub id: Uuid,
  pub vectors: PointVectors,
  pub payload: serde_json::Value,
}

/// A scrolled-back point, used by reconciliation (missing-embedding repair) and by backup
/// sync (copying the whole collection to the backup store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPoint {
  pub id: Uuid,
  pub vectors: PointVectors,
  pub payload: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct VectorQuery {
  pub dense: Option<Vec<f32>>,
  pub sparse: Option<SparseVectorData>,
  pub limit: usize,
  /// Restrict to points whose payload `file_path` matches, used by `delete_by_file` style
  /// lookups and by scoped search when a caller already knows the file.
  pub file_path_filter: Option<String>,
}

impl VectorQuery {
  pub fn dense(vector: Vec<f32>, limit: usize) -> Self {
    Self { dense: Some(vector), sparse: None, limit, file_path_filter: None }
  }

  pub fn sparse(vector: SparseVectorData, limit: usize) -> Self {
    Self { dense: None, sparse: Some(vector), limit, file_path_filter: None }
  }

  pub fn hybrid(dense: Vec<f32>, sparse: SparseVectorData, limit: usize) -> Self {
    Self { dense: Some(dense), sparse: Some(sparse), limit, file_path_filter: None }
  }
}

#[derive(Debug, Clone)]
pub struct ScoredPoint {
  pub id: Uuid,
  pub score: f32,
  pub payload: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct CollectionConfig {
  pub name: String,
  pub dense_dimension: usize,
  pub sparse_enabled: bool,
}

/// A reconciliation scroll page: a missing-field point id plus whichever fields it already
/// has, so the caller can tell what to re-embed without a second round trip.
#[derive(Debug, Clone)]
pub struct ReconciliationCandidate {
  pub id: Uuid,
  pub payload: serde_json::Value,
  pub missing_dense: bool,
  pub missing_sparse: bool,
}

/// The contract both `QdrantStore` (primary) and `InMemoryBackupStore` (backup) satisfy, so
/// `FailoverManager` and `QueryPipeline` can hold either behind one `Arc<dyn VectorStore>`
/// and never branch on which is active.
#[async_trait]
pub trait VectorStore: Send + Sync {
  fn name(&self) -> &str;

  /// Idempotent store-wide setup. `QdrantStore` has nothing to do beyond what
  /// `ensure_collection` already covers per collection; `InMemoryBackupStore` has no
  /// connection to establish either, so both default to a no-op success.
  async fn initialize(&self) -> Result<(), VectorStoreError> {
    Ok(())
  }

  async fn ensure_collection(&self, config: &CollectionConfig) -> Result<(), VectorStoreError>;

  async fn upsert(&self, collection: &str, points: Vec<UpsertPoint>) -> Result<(), VectorStoreError>;

  async fn delete_by_file(&self, collection: &str, file_path: &str) -> Result<u64, VectorStoreError>;

  async fn delete_by_id(&self, collection: &str, id: Uuid) -> Result<(), VectorStoreError>;

  /// Remove every point whose `payload.chunk.chunk_name` is in `names`.
  async fn delete_by_name(&self, collection: &str, names: &[String]) -> Result<u64, VectorStoreError>;

  async fn delete_collection(&self, collection: &str) -> Result<(), VectorStoreError>;

  async fn search(&self, collection: &str, query: VectorQuery) -> Result<Vec<ScoredPoint>, VectorStoreError>;

  /// Paginated scan over every point, used by backup sync and reconciliation. `offset` is
  /// an opaque cursor returned alongside the page; `None` in the return value means the
  /// scroll is exhausted.
  async fn scroll(
    &self,
    collection: &str,
    offset: Option<Uuid>,
    page_size: usize,
  ) -> Result<(Vec<StoredPoint>, Option<Uuid>), VectorStoreError>;

  async fn list_collections(&self) -> Result<Vec<String>, VectorStoreError>;

  /// Whether the store's backing circuit breaker currently allows requests. Returns
  /// `BreakerState::Closed` for stores (e.g. a plain in-memory map) with no breaker.
  fn breaker_state(&self) -> BreakerState {
    BreakerState::Closed
  }

  /// True once a call has succeeded; used by `QueryPipeline`'s "no healthy providers" check
  /// the same way embedding health is tracked.
  fn is_healthy(&self) -> bool {
    self.breaker_state() != BreakerState::Open
  }
}
