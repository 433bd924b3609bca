use std::collections::HashMap;
use std::time::Duration;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::r#match::MatchValue;
use qdrant_client::qdrant::{
  Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, FieldCondition, Filter, Match, NamedVectors,
  PointId, PointStruct, PointsIdsList, PrefetchQueryBuilder, Query, QueryPointsBuilder, ScrollPointsBuilder,
  SparseVectorParamsBuilder, SparseVectorsConfigBuilder, UpsertPointsBuilder, Value as QdrantValue, Vector,
  VectorParamsBuilder, VectorsConfigBuilder, WithPayloadSelector,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::circuit_breaker::{BreakerState, CircuitBreaker};
use crate::error::VectorStoreError;
use crate::store::{
  CollectionConfig, PointVectors, ReconciliationCandidate, ScoredPoint, SparseVectorData, StoredPoint, UpsertPoint,
  VectorQuery, VectorStore,
};

const DENSE_VECTOR_NAME: &str = "dense";
const SPARSE_VECTOR_NAME: &str = "sparse";

/// `VectorStore` backed by Qdrant, wrapping the client with the circuit breaker so
/// that repeated connection/timeout/5xx failures stop reaching the server and instead flip
/// `FailoverManager` over to the backup store.
pub struct QdrantStore {
  client: Qdrant,
  breaker: CircuitBreaker,
  stats: codeweaver_core::Statistics,
}

impl QdrantStore {
  pub fn connect(
    url: &str,
    api_key: Option<String>,
    breaker_failure_threshold: u32,
    breaker_cooldown_secs: u64,
    stats: codeweaver_core::Statistics,
  ) -> Result<Self, VectorStoreError> {
    let mut builder = Qdrant::from_url(url);
    if let Some(key) = api_key {
      builder = builder.api_key(key);
    }
    let client = builder.build().map_err(|e| VectorStoreError::Connection(e.to_string()))?;
    Ok(Self {
        client,
        breaker: CircuitBreaker::new(breaker_failure_threshold, Duration::from_secs(breaker_cooldown_secs)),
        stats,
      })
  }

  /// Runs `op` only if the breaker allows it, and records the outcome against the breaker.
  /// Every public method funnels through here so no call path can bypass the breaker.
  async fn guarded<T, F, Fut>(&self, op: F) -> Result<T, VectorStoreError>
  where
  F: FnOnce() -> Fut,
  Fut: std::future::Future<Output = Result<T, VectorStoreError>>,
  {
    if !self.breaker.allow_request() {
      return Err(VectorStoreError::CircuitBreakerOpen);
    }
    match op().await {
      Ok(value) => {
        self.breaker.record_success(&self.stats);
        Ok(value)
      }
      Err(err) => {
        self.breaker.record_failure(&err, &self.stats);
        Err(err)
      }
    }
  }

  fn classify_status(status: qdrant_client::tonic::Status) -> VectorStoreError {
    use qdrant_client::tonic::Code;
    match status.code() {
      Code::Unauthenticated | Code::PermissionDenied => VectorStoreError::Authentication(status.message().to_string()),
      Code::DeadlineExceeded => VectorStoreError::Timeout(Duration::from_secs(0)),
      Code::Unavailable => VectorStoreError::Connection(status.message().to_string()),
      Code::Internal | Code::ResourceExhausted | Code::Aborted => {
        VectorStoreError::Server { status: 500, message: status.message().to_string() }
      }
      _ => VectorStoreError::Client { status: 400, message: status.message().to_string() },
    }
  }
}

fn point_id_to_uuid(id: &PointId) -> Option<Uuid> {
  match id.point_id_options.as_ref()? {
    PointIdOptions::Uuid(s) => Uuid::parse_str(s).ok(),
    PointIdOptions::Num(n) => Some(Uuid::from_u128(*n as u128)),
  }
}

fn payload_to_json(payload: HashMap<String, QdrantValue>) -> serde_json::Value {
  let map: serde_json::Map<String, serde_json::Value> =
  payload.into_iter().map(|(k, v)| (k, qdrant_value_to_json(v))).collect();
  serde_json::Value::Object(map)
}

fn qdrant_value_to_json(value: QdrantValue) -> serde_json::Value {
  use qdrant_client::qdrant::value::Kind;
  match value.kind {
    Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
    Some(Kind::DoubleValue(d)) => serde_json::json!(d),
    Some(Kind::IntegerValue(i)) => serde_json::json!(i),
    Some(Kind::StringValue(s)) => serde_json::json!(s),
    Some(Kind::BoolValue(b)) => serde_json::json!(b),
    Some(Kind::StructValue(s)) => payload_to_json(s.fields),
    Some(Kind::ListValue(l)) => serde_json::Value::Array(l.values.into_iter().map(qdrant_value_to_json).collect()),
  }
}

fn json_to_payload(value: &serde_json::Value) -> HashMap<String, QdrantValue> {
  match value.as_object() {
    Some(map) => map.iter().map(|(k, v)| (k.clone(), json_to_qdrant_value(v))).collect(),
    None => HashMap::new(),
  }
}

fn json_to_qdrant_value(value: &serde_json::Value) -> QdrantValue {
  QdrantValue::from(value.clone())
}

fn point_vectors_to_named(vectors: &PointVectors) -> NamedVectors {
  let mut named = NamedVectors::default();
  if let Some(dense) = &vectors.dense {
    named = named.add_vector(DENSE_VECTOR_NAME, Vector::from(dense.clone()));
  }
  if let Some(sparse) = &vectors.sparse {
    named = named.add_vector(SPARSE_VECTOR_NAME, Vector::from((sparse.indices.clone(), sparse.values.clone())));
  }
  named
}

#[async_trait::async_trait]
impl VectorStore for QdrantStore {
  fn name(&self) -> &str {
    "qdrant"
  }

  async fn ensure_collection(&self, config: &CollectionConfig) -> Result<(), VectorStoreError> {
    let name = config.name.clone();
    let dense_dimension = config.dense_dimension as u64;
    let sparse_enabled = config.sparse_enabled;
    self
    .guarded(|| async move {
        let exists = self
        .client
        .collection_exists(&name)
        .await
        .map_err(|e| VectorStoreError::Connection(e.to_string()))?;
        if exists {
          debug!(collection = %name, "collection already exists");
          return Ok(());
        }
        let mut builder = CreateCollectionBuilder::new(&name).vectors_config(
          VectorsConfigBuilder::default()
          .add_named_vector_params(DENSE_VECTOR_NAME, VectorParamsBuilder::new(dense_dimension, Distance::Cosine)),
        );
        if sparse_enabled {
          builder = builder.sparse_vectors_config(
            SparseVectorsConfigBuilder::default()
            .add_named_vector_params(SPARSE_VECTOR_NAME, SparseVectorParamsBuilder::default()),
          );
        }
        self.client.create_collection(builder).await.map_err(Self::classify_status_wrap)?;
        Ok(())
      })
    .await
  }

  async fn upsert(&self, collection: &str, points: Vec<UpsertPoint>) -> Result<(), VectorStoreError> {
    if points.is_empty() {
      return Ok(());
    }
    let collection = collection.to_string();
    let qdrant_points: Vec<PointStruct> = points
    .iter()
    .map(|point| {
        PointStruct::new(point.id.to_string(), point_vectors_to_named(&point.vectors), json_to_payload(&point.payload))
      })
    .collect();
    let count = qdrant_points.len() as u64;
    self
    .guarded(|| async move {
        self
        .client
        .upsert_points(UpsertPointsBuilder::new(collection, qdrant_points))
        .await
        .map_err(Self::classify_status_wrap)?;
        Ok(())
      })
    .await?;
    self.stats.vector_store().upserts.fetch_add(count, std::sync::atomic::Ordering::Relaxed);
    Ok(())
  }

  async fn delete_by_file(&self, collection: &str, file_path: &str) -> Result<u64, VectorStoreError> {
    let collection = collection.to_string();
    let file_path = file_path.to_string();
    let result = self
    .guarded(|| async move {
        let filter = Filter::must([Condition::from(FieldCondition {
                key: "file_path".to_string(),
                r#match: Some(Match { match_value: Some(MatchValue::Keyword(file_path.clone())) }),
                ..Default::default()
              })]);
        self
        .client
        .delete_points(DeletePointsBuilder::new(collection).points(filter))
        .await
        .map_err(Self::classify_status_wrap)?;
        Ok(())
      })
    .await;
    result?;
    self.stats.vector_store().deletes.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    Ok(1)
  }

  async fn delete_by_id(&self, collection: &str, id: Uuid) -> Result<(), VectorStoreError> {
    let collection = collection.to_string();
    self
    .guarded(|| async move {
        let ids = PointsIdsList { ids: vec![PointId::from(id.to_string())] };
        self
        .client
        .delete_points(DeletePointsBuilder::new(collection).points(ids))
        .await
        .map_err(Self::classify_status_wrap)?;
        Ok(())
      })
    .await?;
    self.stats.vector_store().deletes.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    Ok(())
  }

  async fn delete_by_name(&self, collection: &str, names: &[String]) -> Result<u64, VectorStoreError> {
    if names.is_empty() {
      return Ok(0);
    }
    let collection = collection.to_string();
    let names = names.to_vec();
    self
    .guarded(|| async move {
        let filter = Filter::must([Condition::from(FieldCondition {
                key: "chunk.chunk_name".to_string(),
                r#match: Some(Match { match_value: Some(MatchValue::Keywords(qdrant_client::qdrant::RepeatedStrings { strings: names.clone() })) }),
                ..Default::default()
              })]);
        self
        .client
        .delete_points(DeletePointsBuilder::new(collection).points(filter))
        .await
        .map_err(Self::classify_status_wrap)?;
        Ok(())
      })
    .await?;
    self.stats.vector_store().deletes.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    Ok(names.len() as u64)
  }

  async fn delete_collection(&self, collection: &str) -> Result<(), VectorStoreError> {
    let collection = collection.to_string();
    self
    .guarded(|| async move {
        self.client.delete_collection(collection).await.map_err(Self::classify_status_wrap)?;
        Ok(())
      })
    .await
  }

  async fn search(&self, collection: &str, query: VectorQuery) -> Result<Vec<ScoredPoint>, VectorStoreError> {
    let collection = collection.to_string();
    let limit = query.limit as u64;
    let result = self
    .guarded(|| async move {
        let response = match (&query.dense, &query.sparse) {
          (Some(dense), Some(sparse)) => {
            self
            .client
            .query(
              QueryPointsBuilder::new(collection)
              .add_prefetch(
                PrefetchQueryBuilder::default()
                .query(Query::new_nearest(dense.clone()))
                .using(DENSE_VECTOR_NAME)
                .limit(limit * 3),
              )
              .add_prefetch(
                PrefetchQueryBuilder::default()
                .query(Query::new_nearest(qdrant_client::qdrant::Vector::from((
                        sparse.indices.clone(),
                        sparse.values.clone(),
                      ))))
                .using(SPARSE_VECTOR_NAME)
                .limit(limit * 3),
              )
              .query(Query::new_fusion(qdrant_client::qdrant::Fusion::Rrf))
              .limit(limit)
              .with_payload(WithPayloadSelector::from(true)),
            )
            .await
            .map_err(Self::classify_status_wrap)?
          }
          (Some(dense), None) => {
            self
            .client
            .query(
              QueryPointsBuilder::new(collection)
              .query(Query::new_nearest(dense.clone()))
              .using(DENSE_VECTOR_NAME)
              .limit(limit)
              .with_payload(WithPayloadSelector::from(true)),
            )
            .await
            .map_err(Self::classify_status_wrap)?
          }
          (None, Some(sparse)) => {
            self
            .client
            .query(
              QueryPointsBuilder::new(collection)
              .query(Query::new_nearest(qdrant_client::qdrant::Vector::from((
                      sparse.indices.clone(),
                      sparse.values.clone(),
                    ))))
              .using(SPARSE_VECTOR_NAME)
              .limit(limit)
              .with_payload(WithPayloadSelector::from(true)),
            )
            .await
            .map_err(Self::classify_status_wrap)?
          }
          (None, None) => return Err(VectorStoreError::Client { status: 400, message: "query carries no vectors".into() }),
        };
        Ok(response)
      })
    .await?;
    self.stats.vector_store().searches.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    let scored = result
    .result
    .into_iter()
    .filter_map(|point| {
        let id = point.id.as_ref().and_then(point_id_to_uuid)?;
        Some(ScoredPoint { id, score: point.score, payload: payload_to_json(point.payload) })
      })
    .collect();
    Ok(scored)
  }

  async fn scroll(
    &self,
    collection: &str,
    offset: Option<Uuid>,
    page_size: usize,
  ) -> Result<(Vec<StoredPoint>, Option<Uuid>), VectorStoreError> {
    let collection = collection.to_string();
    let response = self
    .guarded(|| async move {
        let mut builder = ScrollPointsBuilder::new(collection)
        .limit(page_size as u32)
        .with_payload(WithPayloadSelector::from(true))
        .with_vectors(true);
        if let Some(cursor) = offset {
          builder = builder.offset(PointId::from(cursor.to_string()));
        }
        self.client.scroll(builder).await.map_err(Self::classify_status_wrap)
      })
    .await?;
    let next_offset = response.next_page_offset.as_ref().and_then(point_id_to_uuid);
    let points = response
    .result
    .into_iter()
    .filter_map(|point| {
        let id = point.id.as_ref().and_then(point_id_to_uuid)?;
        let vectors = extract_point_vectors(point.vectors);
        Some(StoredPoint { id, vectors, payload: payload_to_json(point.payload) })
      })
    .collect();
    Ok((points, next_offset))
  }

  async fn list_collections(&self) -> Result<Vec<String>, VectorStoreError> {
    self
    .guarded(|| async {
        let response = self.client.list_collections().await.map_err(Self::classify_status_wrap)?;
        Ok(response.collections.into_iter().map(|c| c.name).collect())
      })
    .await
  }

  fn breaker_state(&self) -> BreakerState {
    self.breaker.state()
  }
}

impl QdrantStore {
  fn classify_status_wrap(err: qdrant_client::QdrantError) -> VectorStoreError {
    match err {
      qdrant_client::QdrantError::ResponseError(status) => Self::classify_status(status),
      other => VectorStoreError::Connection(other.to_string()),
    }
  }
}

fn extract_point_vectors(vectors: Option<qdrant_client::qdrant::VectorsOutput>) -> PointVectors {
  let Some(vectors) = vectors else { return PointVectors::default() };
  let Some(qdrant_client::qdrant::vectors_output::VectorsOptions::Vectors(named)) = vectors.vectors_options else {
    return PointVectors::default();
  };
  let dense = named
  .vectors
  .get(DENSE_VECTOR_NAME)
  .map(|v| v.data.clone());
  let sparse = named.vectors.get(SPARSE_VECTOR_NAME).and_then(|v| {
      v.indices.as_ref().map(|indices| SparseVectorData { indices: indices.data.clone(), values: v.data.clone() })
    });
  PointVectors { dense, sparse }
}

/// Build the list of reconciliation candidates from a scroll page: points missing either
/// vector slot. Exposed so `codeweaver-indexer` can drive reconciliation without
/// depending on Qdrant response types directly.
pub fn reconciliation_candidates(points: &[StoredPoint]) -> Vec<ReconciliationCandidate> {
  points
  .iter()
  .filter(|p| p.vectors.dense.is_none() || p.vectors.sparse.is_none())
  .map(|p| ReconciliationCandidate {
      id: p.id,
      payload: p.payload.clone(),
      missing_dense: p.vectors.dense.is_none(),
      missing_sparse: p.vectors.sparse.is_none(),
    })
  .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reconciliation_candidates_flags_missing_dense_only() {
    let points = vec![StoredPoint {
        id: Uuid::now_v7(),
        vectors: PointVectors { dense: None, sparse: Some(SparseVectorData { indices: vec![1], values: vec![0.5] }) },
        payload: serde_json::json!({}),
      }];
    let candidates = reconciliation_candidates(&points);
    assert_eq!(candidates.len(), 1);
    assert!(candidates[0].missing_dense);
    assert!(!candidates[0].missing_sparse);
  }

  #[test]
  fn reconciliation_candidates_skips_complete_points() {
    let points = vec![StoredPoint {
        id: Uuid::now_v7(),
        vectors: PointVectors { dense: Some(vec![0.1]), sparse: Some(SparseVectorData { indices: vec![1], values: vec![0.5] }) },
        payload: serde_json::json!({}),
      }];
    assert!(reconciliation_candidates(&points).is_empty());
  }
}
