//! Reranker capability: an optional stage that rescoring candidates after the
//! initial dense/sparse/hybrid/keyword search. No teacher file implements anything like this
//! (the teacher never reranks search results), so the trait is modeled directly on the
//! `EmbeddingProvider`/`VectorStore` shape already established elsewhere in this workspace:
//! a small async trait, one health-free built-in implementation, and a second real (if
//! unsophisticated) implementation rather than a stub.

use async_trait::async_trait;
use thiserror::Error;

use codeweaver_core::SearchResult;

#[derive(Debug, Error, Clone)]
pub enum RerankError {
  #[error("reranker {name} failed: {cause}")]
  Failed { name: String, cause: String },
}

/// Rescoring stage for post-search candidates. Implementations must not reorder or drop
/// `candidates`; they only return a parallel `scores` vector. : "it does not change
/// result ordering if it raises, it only logs" — callers are responsible for discarding the
/// returned scores (not the candidates) on `Err`.
#[async_trait]
pub trait Reranker: Send + Sync {
  fn name(&self) -> &str;

  async fn rerank(&self, query: &str, candidates: &[SearchResult]) -> Result<Vec<f32>, RerankError>;
}

/// Tokenizes the same way `codeweaver_embedding::HashingSparseProvider` does (lowercased,
/// split on non-alphanumeric/underscore), kept local since that helper is private to its
/// crate and the two tokenizations are allowed to diverge independently.
fn tokenize(text: &str) -> Vec<String> {
  text
  .split(|c: char| !c.is_alphanumeric() && c != '_')
  .filter(|t| !t.is_empty())
  .map(|t| t.to_lowercase())
  .collect()
}

/// A real, network-free reranker: scores each candidate by the Jaccard overlap between the
/// query's token set and the candidate chunk's token set, then blends it with the
/// candidate's incoming search score so a reranked result never completely discards the
/// first-pass ranking signal.
pub struct LexicalOverlapReranker {
  blend: f32,
}

impl Default for LexicalOverlapReranker {
  fn default() -> Self {
    Self::new(0.5)
  }
}

impl LexicalOverlapReranker {
  /// `blend` in `[0, 1]`: 0 ignores overlap entirely (pass the original score through), 1
  /// ignores the original score entirely (pure lexical overlap).
  pub fn new(blend: f32) -> Self {
    Self { blend: blend.clamp(0.0, 1.0) }
  }

  fn overlap_score(&self, query_tokens: &std::collections::HashSet<String>, content: &str) -> f32 {
    if query_tokens.is_empty() {
      return 0.0;
    }
    let content_tokens: std::collections::HashSet<String> = tokenize(content).into_iter().collect();
    if content_tokens.is_empty() {
      return 0.0;
    }
    let intersection = query_tokens.intersection(&content_tokens).count() as f32;
    let union = query_tokens.union(&content_tokens).count() as f32;
    if union == 0.0 { 0.0 } else { intersection / union }
  }
}

#[async_trait]
impl Reranker for LexicalOverlapReranker {
  fn name(&self) -> &str {
    "lexical-overlap"
  }

  async fn rerank(&self, query: &str, candidates: &[SearchResult]) -> Result<Vec<f32>, RerankError> {
    let query_tokens: std::collections::HashSet<String> = tokenize(query).into_iter().collect();
    Ok(
      candidates
      .iter()
      .map(|c| {
          let overlap = self.overlap_score(&query_tokens, &c.chunk.content);
          self.blend * overlap + (1.0 - self.blend) * c.score
        })
      .collect(),
    )
  }
}

/// Pass-through reranker for tests/configurations that want the reranking stage present but
/// inert (returns the incoming scores unchanged).
pub struct NoopReranker;

#[async_trait]
impl Reranker for NoopReranker {
  fn name(&self) -> &str {
    "noop"
  }

  async fn rerank(&self, _query: &str, candidates: &[SearchResult]) -> Result<Vec<f32>, RerankError> {
    Ok(candidates.iter().map(|c| c.score).collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use codeweaver_core::chunk::{Chunk, ChunkerType, Classification, ImportanceScores};
  use codeweaver_core::language::Language;

  fn result(content: &str, score: f32) -> SearchResult {
    SearchResult {
      chunk: Chunk::new(
        "name".into(),
        "f.rs".into(),
        content.into(),
        (1, 1),
        Classification::Function,
        ImportanceScores::uniform(0.5),
        false,
        0,
        ChunkerType::Semantic,
        Language::Rust,
      ),
      score,
      metadata: serde_json::json!({}),
    }
  }

  #[tokio::test]
  async fn noop_passes_scores_through() {
    let reranker = NoopReranker;
    let candidates = vec![result("fn foo() {}", 0.4), result("fn bar() {}", 0.9)];
    let scores = reranker.rerank("foo", &candidates).await.unwrap();
    assert_eq!(scores, vec![0.4, 0.9]);
  }

  #[tokio::test]
  async fn lexical_overlap_favors_matching_tokens() {
    let reranker = LexicalOverlapReranker::new(1.0);
    let candidates = vec![result("fn totally_unrelated() {}", 0.9), result("fn parse_widget() {}", 0.1)];
    let scores = reranker.rerank("parse widget", &candidates).await.unwrap();
    assert!(scores[1] > scores[0]);
  }
}
