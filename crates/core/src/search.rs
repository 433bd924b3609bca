use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chunk::Chunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
  HybridSearch,
  DenseSearch,
  SparseOnly,
  KeywordFallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
  pub chunk: Chunk,
  pub score: f32,
  pub metadata: serde_json::Value,
}

impl SearchResult {
  fn sort_key(&self) -> (std::cmp::Reverse<ordered_float::OrderedFloat<f32>>, std::cmp::Reverse<Uuid>) {
    // Descending score, ties broken by newer chunk_id first (UUIDv7 sorts by time, so the
    // larger uuid is the newer one).
    (std::cmp::Reverse(ordered_float::OrderedFloat(self.score)), std::cmp::Reverse(self.chunk.chunk_id))
  }
}

/// Sort results by descending score, ties broken by newer `chunk_id` first, matching
/// invariant 5 in the testable-properties section.
pub fn sort_results(results: &mut [SearchResult]) {
  results.sort_by_key(SearchResult::sort_key);
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyBreakdown {
  pub embed_ms: u64,
  pub search_ms: u64,
  pub rerank_ms: u64,
  pub pack_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindCodeResponseSummary {
  pub results: Vec<SearchResult>,
  pub strategy_used: Strategy,
  pub total_candidates: usize,
  pub latency_ms: u64,
  pub token_budget_remaining: i64,
  pub warnings: Vec<String>,
  #[serde(default)]
  pub latency_breakdown: LatencyBreakdown,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::chunk::{ChunkerType, Classification, ImportanceScores};
  use crate::language::Language;

  fn chunk() -> Chunk {
    Chunk::new(
      "name".into(),
      "f.rs".into(),
      "content".into(),
      (1, 1),
      Classification::Function,
      ImportanceScores::uniform(0.5),
      false,
      0,
      ChunkerType::Semantic,
      Language::Rust,
    )
  }

  #[test]
  fn sorts_descending_by_score() {
    let mut results = vec![
      SearchResult { chunk: chunk(), score: 0.2, metadata: serde_json::json!({}) },
      SearchResult { chunk: chunk(), score: 0.9, metadata: serde_json::json!({}) },
      SearchResult { chunk: chunk(), score: 0.5, metadata: serde_json::json!({}) },
    ];
    sort_results(&mut results);
    let scores: Vec<f32> = results.iter().map(|r| r.score).collect();
    assert_eq!(scores, vec![0.9, 0.5, 0.2]);
  }

  #[test]
  fn ties_break_on_newer_chunk_id() {
    let older = chunk();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let newer = chunk();
    let mut results = vec![
      SearchResult { chunk: older.clone(), score: 0.5, metadata: serde_json::json!({}) },
      SearchResult { chunk: newer.clone(), score: 0.5, metadata: serde_json::json!({}) },
    ];
    sort_results(&mut results);
    assert_eq!(results[0].chunk.chunk_id, newer.chunk_id);
  }
}
