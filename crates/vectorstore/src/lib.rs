pub mod backup;
pub mod circuit_breaker;
pub mod error;
pub mod memory_store;
pub mod qdrant_store;
pub mod store;

pub use backup::{BackupCollection, BackupFile, BackupMetadata, BackupPoint, load as load_backup, restore as restore_backup, save as save_backup, scroll_all};
pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use error::VectorStoreError;
pub use memory_store::InMemoryBackupStore;
pub use qdrant_store::QdrantStore;
pub use store::{
  CollectionConfig, PointVectors, ReconciliationCandidate, ScoredPoint, SparseVectorData, StoredPoint, UpsertPoint,
  VectorQuery, VectorStore,
};
