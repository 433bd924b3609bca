//! `find_code` query pipeline: strategy selection over embedding/vector-store health,
//! embed -> search -> rerank -> pack, with per-stage latency accounting and a token budget.

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use tracing::{debug, warn};

use codeweaver_core::chunk::estimate_tokens;
use codeweaver_core::config::QueryConfig;
use codeweaver_core::{Context, FindCodeResponseSummary, LatencyBreakdown, Language, SearchResult, Strategy, sort_results};
use codeweaver_embedding::{EmbeddingProvider, SparseEmbeddingProvider};
use codeweaver_failover::{ActiveStore, FailoverManager};
use codeweaver_vectorstore::{ScoredPoint, SparseVectorData, StoredPoint, VectorQuery};

use crate::health::HealthSnapshot;
use crate::reranker::Reranker;

const KEYWORD_SCROLL_PAGE_SIZE: usize = 100;
/// Upper bound on how many points a `KEYWORD_FALLBACK` query scrolls through. Keyword
/// fallback has no index to narrow the scan, so this caps the worst case of an otherwise-unbounded full scroll.
const KEYWORD_SCROLL_MAX_POINTS: usize = 5_000;

/// `find_code`'s request shape. `intent` is accepted and logged but does not currently
/// change strategy selection — only conditions strategy on provider/store health.
#[derive(Debug, Clone, Deserialize)]
pub struct FindCodeRequest {
  pub query: String,
  #[serde(default)]
  pub intent: Option<String>,
  #[serde(default)]
  pub focus_languages: Option<Vec<String>>,
  #[serde(default)]
  pub token_limit: Option<usize>,
}

impl FindCodeRequest {
  pub fn new(query: impl Into<String>) -> Self {
    Self { query: query.into(), intent: None, focus_languages: None, token_limit: None }
  }
}

/// Orchestrates one `find_code` call end to end. Holds no mutable state of its own besides
/// what it reads through `Arc`s/`&Context` shared with the `Indexer`; many `QueryPipeline`s
/// (or none) can coexist per process, though in practice one per project is typical.
pub struct QueryPipeline {
  dense: Option<Arc<dyn EmbeddingProvider>>,
  sparse: Option<Arc<dyn SparseEmbeddingProvider>>,
  failover: Arc<FailoverManager>,
  collection: String,
  config: QueryConfig,
  context: Context,
  reranker: Option<Arc<dyn Reranker>>,
}

impl QueryPipeline {
  pub fn new(
    dense: Option<Arc<dyn EmbeddingProvider>>,
    sparse: Option<Arc<dyn SparseEmbeddingProvider>>,
    failover: Arc<FailoverManager>,
    collection: String,
    config: QueryConfig,
    context: Context,
    reranker: Option<Arc<dyn Reranker>>,
  ) -> Self {
    Self { dense, sparse, failover, collection, config, context, reranker }
  }

  /// health-query interface: the data `GET /health` would serve, without binding a
  /// socket (out of scope per ).
  pub fn health_snapshot(&self) -> HealthSnapshot {
    let store = self.failover.active_store();
    let backup_active = self.failover.state().active == ActiveStore::Backup;
    HealthSnapshot::compute(
      store.is_healthy(),
      backup_active,
      self.dense.as_ref().map(|p| p.is_healthy()),
      self.sparse.as_ref().map(|p| p.is_healthy()),
      self.reranker.is_some().then_some(true),
    )
  }

  fn select_strategy(&self, failover_refused_memory: bool) -> (Strategy, bool, bool) {
    if failover_refused_memory {
      return (Strategy::KeywordFallback, false, false);
    }
    let dense_healthy = self.dense.as_ref().is_some_and(|p| p.is_healthy());
    let sparse_healthy = self.sparse.as_ref().is_some_and(|p| p.is_healthy());
    let strategy = match (dense_healthy, sparse_healthy) {
      (true, true) => Strategy::HybridSearch,
      (true, false) => Strategy::DenseSearch,
      (false, true) => Strategy::SparseOnly,
      (false, false) => Strategy::KeywordFallback,
    };
    (strategy, dense_healthy, sparse_healthy)
  }

  /// Runs the full pipeline. Infallible: every internal failure is caught, logged, and
  /// turned into a warning on an otherwise-empty (or partial) response.
  pub async fn find_code(&self, request: FindCodeRequest) -> FindCodeResponseSummary {
    let started = Instant::now();
    let mut warnings = Vec::new();
    let mut latency = LatencyBreakdown::default();

    if let Some(intent) = &request.intent {
      debug!(intent, query = %request.query, "find_code request");
    }

    let failover_state = self.failover.state();
    let refused_memory = failover_state.reason.as_deref().is_some_and(|r| r.starts_with("backup_refused_memory"));
    if refused_memory {
      warnings.push("backup_refused_memory".to_string());
    }

    let (strategy, dense_healthy, sparse_healthy) = self.select_strategy(refused_memory);
    self.context.stats.query().record(&strategy);

    let token_budget = request.token_limit.unwrap_or(self.config.token_budget);
    let final_k = self.config.final_k.max(1);
    let candidate_count = final_k * self.config.candidate_multiplier.max(1);

    let embed_started = Instant::now();
    let (dense_vector, sparse_vector) = self.embed_query(&request.query, strategy, dense_healthy, sparse_healthy, &mut warnings).await;
    latency.embed_ms = embed_started.elapsed().as_millis() as u64;

    let search_started = Instant::now();
    let mut candidates = match strategy {
      Strategy::KeywordFallback => self.keyword_search(&request.query, candidate_count, &mut warnings).await,
      _ => self.vector_search(dense_vector, sparse_vector, candidate_count, &mut warnings).await,
    };
    latency.search_ms = search_started.elapsed().as_millis() as u64;

    if let Some(focus) = &request.focus_languages {
      let wanted: Vec<Language> = focus.iter().map(|name| Language::from_name(name)).collect();
      candidates.retain(|c| wanted.contains(&c.chunk.language));
    }

    let total_candidates = candidates.len();
    if total_candidates == 0 {
      warnings.push("empty_index".to_string());
    }

    let rerank_started = Instant::now();
    if let Some(reranker) = self.reranker.as_ref().filter(|_| !candidates.is_empty()) {
      match reranker.rerank(&request.query, &candidates).await {
        Ok(scores) if scores.len() == candidates.len() => {
          for (candidate, score) in candidates.iter_mut().zip(scores) {
            candidate.score = score;
          }
        }
        Ok(_) => {
          warn!(reranker = reranker.name(), "reranker returned a mismatched score count; keeping pre-rerank order");
          warnings.push(format!("reranker_mismatch: {}", reranker.name()));
        }
        Err(err) => {
          warn!(reranker = reranker.name(), error = %err, "reranker failed; keeping pre-rerank order");
          warnings.push(format!("reranker_failed: {err}"));
        }
      }
    }
    latency.rerank_ms = rerank_started.elapsed().as_millis() as u64;

    sort_results(&mut candidates);
    candidates.truncate(final_k);

    let pack_started = Instant::now();
    let (results, tokens_used, truncated) = pack_within_budget(candidates, token_budget);
    if truncated {
      warnings.push("truncated_due_to_budget".to_string());
    }
    latency.pack_ms = pack_started.elapsed().as_millis() as u64;

    FindCodeResponseSummary {
      results,
      strategy_used: strategy,
      total_candidates,
      latency_ms: started.elapsed().as_millis() as u64,
      token_budget_remaining: token_budget as i64 - tokens_used as i64,
      warnings,
      latency_breakdown: latency,
    }
  }

  async fn embed_query(
    &self,
    query: &str,
    strategy: Strategy,
    dense_healthy: bool,
    sparse_healthy: bool,
    warnings: &mut Vec<String>,
  ) -> (Option<Vec<f32>>, Option<SparseVectorData>) {
    let want_dense = matches!(strategy, Strategy::HybridSearch | Strategy::DenseSearch) && dense_healthy;
    let want_sparse = matches!(strategy, Strategy::HybridSearch | Strategy::SparseOnly) && sparse_healthy;

    let dense_vector = if want_dense {
      match self.dense.as_ref().unwrap().embed_query(query).await {
        Ok(vector) => Some(vector),
        Err(err) => {
          warn!(error = %err, "dense query embedding failed");
          warnings.push(format!("dense_embed_failed: {err}"));
          None
        }
      }
    } else {
      None
    };

    let sparse_vector = if want_sparse {
      match self.sparse.as_ref().unwrap().embed_query(query).await {
        Ok(vector) => Some(SparseVectorData { indices: vector.indices, values: vector.values }),
        Err(err) => {
          warn!(error = %err, "sparse query embedding failed");
          warnings.push(format!("sparse_embed_failed: {err}"));
          None
        }
      }
    } else {
      None
    };

    (dense_vector, sparse_vector)
  }

  async fn vector_search(
    &self,
    dense_vector: Option<Vec<f32>>,
    sparse_vector: Option<SparseVectorData>,
    limit: usize,
    warnings: &mut Vec<String>,
  ) -> Vec<SearchResult> {
    let query = match (dense_vector, sparse_vector) {
      (Some(d), Some(s)) => VectorQuery::hybrid(d, s, limit),
      (Some(d), None) => VectorQuery::dense(d, limit),
      (None, Some(s)) => VectorQuery::sparse(s, limit),
      (None, None) => {
        warnings.push("no_query_vector_available".to_string());
        return Vec::new();
      }
    };

    let store = self.failover.active_store();
    match store.search(&self.collection, query).await {
      Ok(points) => {
        self.context.stats.vector_store().searches.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        points.into_iter().filter_map(scored_point_to_result).collect()
      }
      Err(err) => {
        warn!(error = %err, "vector search failed");
        warnings.push(format!("search_failed: {err}"));
        Vec::new()
      }
    }
  }

  /// `KEYWORD_FALLBACK`: no embedding provider is healthy (or the backup was refused
  /// on memory grounds), so candidates are produced by a payload substring match over
  /// `chunk.content` instead of a vector search, scored by term-occurrence count.
  async fn keyword_search(&self, query: &str, limit: usize, warnings: &mut Vec<String>) -> Vec<SearchResult> {
    let terms: Vec<String> = query.split_whitespace().map(|t| t.to_lowercase()).filter(|t| !t.is_empty()).collect();
    if terms.is_empty() {
      return Vec::new();
    }

    let store = self.failover.active_store();
    let mut scored: Vec<SearchResult> = Vec::new();
    let mut cursor = None;
    let mut scanned = 0usize;
    loop {
      let page = match store.scroll(&self.collection, cursor, KEYWORD_SCROLL_PAGE_SIZE).await {
        Ok(result) => result,
        Err(err) => {
          warn!(error = %err, "keyword fallback scroll failed");
          warnings.push(format!("search_failed: {err}"));
          break;
        }
      };
      let (points, next) = page;
      if points.is_empty() {
        break;
      }
      scanned += points.len();
      for point in points {
        if let Some(result) = keyword_score(&point, &terms) {
          scored.push(result);
        }
      }
      match next {
        Some(offset) if scanned < KEYWORD_SCROLL_MAX_POINTS => cursor = Some(offset),
        _ => break,
      }
    }

    self.context.stats.vector_store().searches.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    sort_results(&mut scored);
    scored.truncate(limit);
    scored
  }
}

fn scored_point_to_result(point: ScoredPoint) -> Option<SearchResult> {
  let chunk_value = point.payload.get("chunk")?;
  let chunk = serde_json::from_value(chunk_value.clone()).ok()?;
  Some(SearchResult { chunk, score: point.score, metadata: serde_json::json!({}) })
}

fn keyword_score(point: &StoredPoint, terms: &[String]) -> Option<SearchResult> {
  let chunk_value = point.payload.get("chunk")?;
  let chunk: codeweaver_core::Chunk = serde_json::from_value(chunk_value.clone()).ok()?;
  let haystack = chunk.content.to_lowercase();
  let occurrences: usize = terms.iter().map(|term| haystack.matches(term.as_str()).count()).sum();
  if occurrences == 0 {
    return None;
  }
  Some(SearchResult { chunk, score: occurrences as f32, metadata: serde_json::json!({ "strategy": "keyword" }) })
}

/// Packs `candidates` (already truncated to `final_k`, already sorted) into the response,
/// stopping once the cumulative token estimate would exceed `budget`. The
/// first candidate is always included even if it alone exceeds the budget, so a single huge
/// chunk doesn't produce a spuriously empty response.
fn pack_within_budget(candidates: Vec<SearchResult>, budget: usize) -> (Vec<SearchResult>, usize, bool) {
  let mut used = 0usize;
  let mut packed = Vec::with_capacity(candidates.len());
  let mut truncated = false;
  for candidate in candidates {
    let tokens = estimate_tokens(&candidate.chunk.content) as usize;
    if !packed.is_empty() && used + tokens > budget {
      truncated = true;
      break;
    }
    used += tokens;
    packed.push(candidate);
  }
  (packed, used, truncated)
}
