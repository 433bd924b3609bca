use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::circuit_breaker::BreakerState;
use crate::error::VectorStoreError;
use crate::store::{CollectionConfig, ScoredPoint, StoredPoint, UpsertPoint, VectorQuery, VectorStore};

fn dot(a: &[f32], b: &[f32]) -> f32 {
  a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
  let denom = (dot(a, a).sqrt()) * (dot(b, b).sqrt());
  if denom == 0.0 { 0.0 } else { dot(a, b) / denom }
}

fn sparse_dot(a_indices: &[u32], a_values: &[f32], b_indices: &[u32], b_values: &[f32]) -> f32 {
  let b_map: std::collections::HashMap<u32, f32> = b_indices.iter().copied().zip(b_values.iter().copied()).collect();
  a_indices
  .iter()
  .zip(a_values.iter())
  .filter_map(|(idx, val)| b_map.get(idx).map(|bv| val * bv))
  .sum()
}

struct Collection {
  points: DashMap<Uuid, StoredPoint>,
  /// Insertion order, kept so `scroll` has a stable cursor independent of the map's hash
  /// iteration order (which DashMap does not guarantee is stable across calls).
  order: RwLock<Vec<Uuid>>,
}

impl Collection {
  fn new() -> Self {
    Self { points: DashMap::new(), order: RwLock::new(Vec::new()) }
  }
}

/// `VectorStore` implementation used as the failover backup target. Not modeled on
/// any teacher file — the teacher has no equivalent in-process fallback store — but reuses
/// the same `DashMap`-per-shard pattern `codeweaver_core::registry::EmbeddingRegistry` uses
/// for its own process-wide map.
pub struct InMemoryBackupStore {
  collections: DashMap<String, Collection>,
}

impl InMemoryBackupStore {
  pub fn new() -> Self {
    Self { collections: DashMap::new() }
  }

  fn collection(&self, name: &str) -> Result<dashmap::mapref::one::Ref<'_, String, Collection>, VectorStoreError> {
    self
    .collections
    .get(name)
    .ok_or_else(|| VectorStoreError::Client { status: 404, message: format!("collection '{name}' not found") })
  }
}

impl Default for InMemoryBackupStore {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl VectorStore for InMemoryBackupStore {
  fn name(&self) -> &str {
    "memory"
  }

  async fn ensure_collection(&self, config: &CollectionConfig) -> Result<(), VectorStoreError> {
    self.collections.entry(config.name.clone()).or_insert_with(Collection::new());
    Ok(())
  }

  async fn upsert(&self, collection: &str, points: Vec<UpsertPoint>) -> Result<(), VectorStoreError> {
    let entry = self.collections.entry(collection.to_string()).or_insert_with(Collection::new());
    let mut order = entry.order.write().unwrap();
    for point in points {
      if entry.points.insert(point.id, StoredPoint { id: point.id, vectors: point.vectors, payload: point.payload }).is_none() {
        order.push(point.id);
      }
    }
    Ok(())
  }

  async fn delete_by_file(&self, collection: &str, file_path: &str) -> Result<u64, VectorStoreError> {
    let entry = self.collection(collection)?;
    let mut removed = 0u64;
    let to_remove: Vec<Uuid> = entry
    .points
    .iter()
    .filter(|kv| kv.value().payload.get("file_path").and_then(|v| v.as_str()) == Some(file_path))
    .map(|kv| *kv.key())
    .collect();
    for id in &to_remove {
      entry.points.remove(id);
      removed += 1;
    }
    entry.order.write().unwrap().retain(|id| !to_remove.contains(id));
    Ok(removed)
  }

  async fn delete_by_id(&self, collection: &str, id: Uuid) -> Result<(), VectorStoreError> {
    let entry = self.collection(collection)?;
    entry.points.remove(&id);
    entry.order.write().unwrap().retain(|existing| *existing != id);
    Ok(())
  }

  async fn delete_by_name(&self, collection: &str, names: &[String]) -> Result<u64, VectorStoreError> {
    let entry = self.collection(collection)?;
    let to_remove: Vec<Uuid> = entry
    .points
    .iter()
    .filter(|kv| {
        kv.value()
        .payload
        .get("chunk")
        .and_then(|c| c.get("chunk_name"))
        .and_then(|v| v.as_str())
        .is_some_and(|name| names.iter().any(|n| n == name))
      })
    .map(|kv| *kv.key())
    .collect();
    for id in &to_remove {
      entry.points.remove(id);
    }
    entry.order.write().unwrap().retain(|id| !to_remove.contains(id));
    Ok(to_remove.len() as u64)
  }

  async fn delete_collection(&self, collection: &str) -> Result<(), VectorStoreError> {
    self.collections.remove(collection);
    Ok(())
  }

  async fn search(&self, collection: &str, query: VectorQuery) -> Result<Vec<ScoredPoint>, VectorStoreError> {
    let entry = self.collection(collection)?;
    let mut scored: Vec<ScoredPoint> = entry
    .points
    .iter()
    .filter_map(|kv| {
        let point = kv.value();
        if let Some(filter) = &query.file_path_filter
        && point.payload.get("file_path").and_then(|v| v.as_str()) != Some(filter.as_str())
        {
          return None;
        }
        let dense_score = match (&query.dense, &point.vectors.dense) {
          (Some(q), Some(v)) => Some(cosine(q, v)),
          _ => None,
        };
        let sparse_score = match (&query.sparse, &point.vectors.sparse) {
          (Some(q), Some(v)) => Some(sparse_dot(&q.indices, &q.values, &v.indices, &v.values)),
          _ => None,
        };
        let score = match (dense_score, sparse_score) {
          (Some(d), Some(s)) => d * 0.5 + s * 0.5,
          (Some(d), None) => d,
          (None, Some(s)) => s,
          (None, None) => return None,
        };
        Some(ScoredPoint { id: point.id, score, payload: point.payload.clone() })
      })
    .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(query.limit);
    Ok(scored)
  }

  async fn scroll(
    &self,
    collection: &str,
    offset: Option<Uuid>,
    page_size: usize,
  ) -> Result<(Vec<StoredPoint>, Option<Uuid>), VectorStoreError> {
    let entry = self.collection(collection)?;
    let order = entry.order.read().unwrap();
    let start = match offset {
      Some(cursor) => order.iter().position(|id| *id == cursor).map(|idx| idx + 1).unwrap_or(order.len()),
      None => 0,
    };
    let page: Vec<Uuid> = order.iter().skip(start).take(page_size).copied().collect();
    let next_offset = page.last().copied();
    let points: Vec<StoredPoint> = page.iter().filter_map(|id| entry.points.get(id).map(|p| p.clone())).collect();
    let next = if start + page.len() >= order.len() { None } else { next_offset };
    Ok((points, next))
  }

  async fn list_collections(&self) -> Result<Vec<String>, VectorStoreError> {
    let mut names: Vec<String> = self.collections.iter().map(|kv| kv.key().clone()).collect();
    names.sort();
    Ok(names)
  }

  fn breaker_state(&self) -> BreakerState {
    BreakerState::Closed
  }
}

/// Snapshot of every collection's points, grouped for backup serialization. Callers
/// iterate this rather than reaching into `InMemoryBackupStore` internals directly.
pub fn snapshot_for_backup(store: &InMemoryBackupStore) -> BTreeMap<String, Vec<StoredPoint>> {
  store
  .collections
  .iter()
  .map(|kv| {
      let order = kv.value().order.read().unwrap();
      let points = order.iter().filter_map(|id| kv.value().points.get(id).map(|p| p.clone())).collect();
      (kv.key().clone(), points)
    })
  .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::{PointVectors, SparseVectorData};

  fn point(id: Uuid, dense: Vec<f32>, file_path: &str) -> UpsertPoint {
    UpsertPoint {
      id,
      vectors: PointVectors { dense: Some(dense), sparse: None },
      payload: serde_json::json!({ "file_path": file_path }),
    }
  }

  #[tokio::test]
  async fn upsert_then_search_returns_closest_first() {
    let store = InMemoryBackupStore::new();
    store.ensure_collection(&CollectionConfig { name: "c".into(), dense_dimension: 2, sparse_enabled: false }).await.unwrap();
    store
    .upsert(
      "c",
      vec![
        point(Uuid::now_v7(), vec![1.0, 0.0], "a.rs"),
        point(Uuid::now_v7(), vec![0.0, 1.0], "b.rs"),
      ],
    )
    .await
    .unwrap();
    let results = store.search("c", VectorQuery::dense(vec![1.0, 0.0], 2)).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].score > results[1].score);
  }

  #[tokio::test]
  async fn delete_by_file_removes_matching_points_only() {
    let store = InMemoryBackupStore::new();
    store.ensure_collection(&CollectionConfig { name: "c".into(), dense_dimension: 2, sparse_enabled: false }).await.unwrap();
    store
    .upsert(
      "c",
      vec![point(Uuid::now_v7(), vec![1.0, 0.0], "a.rs"), point(Uuid::now_v7(), vec![0.0, 1.0], "b.rs")],
    )
    .await
    .unwrap();
    let removed = store.delete_by_file("c", "a.rs").await.unwrap();
    assert_eq!(removed, 1);
    let remaining = store.search("c", VectorQuery::dense(vec![0.0, 1.0], 10)).await.unwrap();
    assert_eq!(remaining.len(), 1);
  }

  #[tokio::test]
  async fn scroll_pages_through_all_points() {
    let store = InMemoryBackupStore::new();
    store.ensure_collection(&CollectionConfig { name: "c".into(), dense_dimension: 2, sparse_enabled: false }).await.unwrap();
    let ids: Vec<Uuid> = (0..5).map(|_| Uuid::now_v7()).collect();
    let points = ids.iter().map(|id| point(*id, vec![0.1, 0.2], "a.rs")).collect();
    store.upsert("c", points).await.unwrap();

    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
      let (page, next) = store.scroll("c", cursor, 2).await.unwrap();
      if page.is_empty() {
        break;
      }
      seen.extend(page.into_iter().map(|p| p.id));
      if next.is_none() {
        break;
      }
      cursor = next;
    }
    assert_eq!(seen.len(), 5);
  }

  #[tokio::test]
  async fn delete_by_name_matches_nested_chunk_name() {
    let store = InMemoryBackupStore::new();
    store.ensure_collection(&CollectionConfig { name: "c".into(), dense_dimension: 2, sparse_enabled: false }).await.unwrap();
    let id = Uuid::now_v7();
    store
    .upsert(
      "c",
      vec![UpsertPoint {
          id,
          vectors: PointVectors { dense: Some(vec![1.0, 0.0]), sparse: None },
          payload: serde_json::json!({ "chunk": { "chunk_name": "Rust-function_item-Function: 'foo'" } }),
        }],
    )
    .await
    .unwrap();
    let removed = store.delete_by_name("c", &["Rust-function_item-Function: 'foo'".to_string()]).await.unwrap();
    assert_eq!(removed, 1);
    let (remaining, _) = store.scroll("c", None, 10).await.unwrap();
    assert!(remaining.is_empty());
  }

  #[test]
  fn sparse_dot_matches_only_shared_indices() {
    assert_eq!(sparse_dot(&[1, 2], &[1.0, 2.0], &[2, 3], &[5.0, 9.0]), 10.0);
  }
}
