use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::VectorStoreError;
use crate::memory_store::{InMemoryBackupStore, snapshot_for_backup};
use crate::store::{CollectionConfig, StoredPoint, UpsertPoint, VectorStore};

const CURRENT_VERSION: &str = "2.0";

/// On-disk shape written to `<config_dir>/cache/vector_store.json()`. `version`
/// "1.0" files carry no per-collection `config`; `load` fills it in with a dimension of 0,
/// which `restore` then treats as "unknown, trust the first point's vector length".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupFile {
  pub version: String,
  pub metadata: BackupMetadata,
  pub collections: BTreeMap<String, BackupCollection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
  pub saved_at_unix_ms: u64,
  pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupCollection {
  #[serde(default)]
  pub config: Option<BackupCollectionConfig>,
  pub points: Vec<BackupPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupCollectionConfig {
  pub dense_dimension: usize,
  pub sparse_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupPoint {
  pub id: uuid::Uuid,
  pub vector: crate::store::PointVectors,
  pub payload: serde_json::Value,
}

impl BackupFile {
  pub fn validate(&self) -> Result<(), VectorStoreError> {
    if self.version != "1.0" && self.version != "2.0" {
      return Err(VectorStoreError::InvalidBackup(format!("unsupported backup version '{}'", self.version)));
    }
    Ok(())
  }
}

/// Serialize the in-memory store's full contents and write them atomically: write to a
/// sibling `.tmp` file, then rename over the target, so a crash mid-write never leaves a
/// truncated or partially-written backup in place.
pub async fn save(store: &InMemoryBackupStore, path: &Path, saved_at_unix_ms: u64) -> Result<(), VectorStoreError> {
  let snapshot = snapshot_for_backup(store);
  let collections = snapshot
  .into_iter()
  .map(|(name, points)| {
      let config = points.first().map(|p| BackupCollectionConfig {
          dense_dimension: p.vectors.dense.as_ref().map(|v| v.len()).unwrap_or(0),
          sparse_enabled: points.iter().any(|p| p.vectors.sparse.is_some()),
        });
      let points = points
      .into_iter()
      .map(|p| BackupPoint { id: p.id, vector: p.vectors, payload: p.payload })
      .collect();
      (name, BackupCollection { config, points })
    })
  .collect();

  let file = BackupFile {
    version: CURRENT_VERSION.to_string(),
    metadata: BackupMetadata { saved_at_unix_ms, source: "failover-sync".to_string() },
    collections,
  };

  let contents = serde_json::to_vec_pretty(&file)?;
  let tmp_path = path.with_extension("json.tmp");
  if let Some(parent) = path.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }
  tokio::fs::write(&tmp_path, &contents).await?;
  tokio::fs::rename(&tmp_path, path).await?;
  Ok(())
}

/// Read and validate a backup file. Per, an invalid or unreadable file is not fatal:
/// callers are expected to treat `Err` as "start the backup store empty", not abort startup.
pub async fn load(path: &Path) -> Result<BackupFile, VectorStoreError> {
  let contents = tokio::fs::read(path).await?;
  let file: BackupFile = serde_json::from_slice(&contents)?;
  file.validate()?;
  Ok(file)
}

/// Rehydrate an `InMemoryBackupStore` from a validated backup file, recreating every
/// collection and its points. A v1.0 file's `config: None` falls back to inferring the
/// dimension from the first point's dense vector.
pub async fn restore(file: &BackupFile, store: &InMemoryBackupStore) -> Result<(), VectorStoreError> {
  for (name, collection) in &file.collections {
    let dense_dimension = collection
    .config
    .as_ref()
    .map(|c| c.dense_dimension)
    .or_else(|| collection.points.first().and_then(|p| p.vector.dense.as_ref()).map(|v| v.len()))
    .unwrap_or(0);
    let sparse_enabled = collection
    .config
    .as_ref()
    .map(|c| c.sparse_enabled)
    .unwrap_or_else(|| collection.points.iter().any(|p| p.vector.sparse.is_some()));
    store.ensure_collection(&CollectionConfig { name: name.clone(), dense_dimension, sparse_enabled }).await?;
    let points: Vec<UpsertPoint> =
    collection.points.iter().map(|p| UpsertPoint { id: p.id, vectors: p.vector.clone(), payload: p.payload.clone() }).collect();
    store.upsert(name, points).await?;
  }
  Ok(())
}

/// Collects every point out of a primary `VectorStore` via repeated `scroll` calls, in pages
/// of `page_size`, for the periodic backup sync job.
pub async fn scroll_all(
  primary: &dyn VectorStore,
  collection: &str,
  page_size: usize,
) -> Result<Vec<StoredPoint>, VectorStoreError> {
  let mut all = Vec::new();
  let mut cursor = None;
  loop {
    let (page, next) = primary.scroll(collection, cursor, page_size).await?;
    if page.is_empty() {
      break;
    }
    all.extend(page);
    match next {
      Some(offset) => cursor = Some(offset),
      None => break,
    }
  }
  Ok(all)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::{PointVectors, SparseVectorData};
  use tempfile::tempdir;

  fn sample_point() -> UpsertPoint {
    UpsertPoint {
      id: uuid::Uuid::now_v7(),
      vectors: PointVectors {
        dense: Some(vec![0.1, 0.2]),
        sparse: Some(SparseVectorData { indices: vec![1, 2], values: vec![0.3, 0.4] }),
      },
      payload: serde_json::json!({ "file_path": "a.rs" }),
    }
  }

  #[tokio::test]
  async fn round_trips_through_save_and_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vector_store.json");

    let store = InMemoryBackupStore::new();
    store.ensure_collection(&CollectionConfig { name: "c".into(), dense_dimension: 2, sparse_enabled: true }).await.unwrap();
    store.upsert("c", vec![sample_point()]).await.unwrap();

    save(&store, &path, 1_700_000_000_000).await.unwrap();
    let loaded = load(&path).await.unwrap();
    assert_eq!(loaded.version, "2.0");
    assert_eq!(loaded.collections["c"].points.len(), 1);

    let restored = InMemoryBackupStore::new();
    restore(&loaded, &restored).await.unwrap();
    let results = restored.search("c", crate::store::VectorQuery::dense(vec![0.1, 0.2], 10)).await.unwrap();
    assert_eq!(results.len(), 1);
  }

  #[tokio::test]
  async fn rejects_unsupported_version() {
    let file = BackupFile {
      version: "3.0".to_string(),
      metadata: BackupMetadata { saved_at_unix_ms: 0, source: "test".into() },
      collections: BTreeMap::new(),
    };
    assert!(file.validate().is_err());
  }

  #[tokio::test]
  async fn v1_file_without_config_infers_dimension() {
    let mut collections = BTreeMap::new();
    collections.insert(
      "c".to_string(),
      BackupCollection { config: None, points: vec![BackupPoint { id: uuid::Uuid::now_v7(), vector: PointVectors { dense: Some(vec![1.0, 2.0, 3.0]), sparse: None }, payload: serde_json::json!({}) }] },
    );
    let file = BackupFile {
      version: "1.0".to_string(),
      metadata: BackupMetadata { saved_at_unix_ms: 0, source: "legacy".into() },
      collections,
    };
    file.validate().unwrap();
    let store = InMemoryBackupStore::new();
    restore(&file, &store).await.unwrap();
    let results = store.search("c", crate::store::VectorQuery::dense(vec![1.0, 2.0, 3.0], 1)).await.unwrap();
    assert_eq!(results.len(), 1);
  }
}
