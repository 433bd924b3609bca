use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::language::Language;

/// Characters per token estimate. The exact tokenizer for a given embedding model is a
/// plug-in concern; this ratio is the same rough approximation the source project used
/// (`len(text) // 4`) and is intentionally not replaced with a real tokenizer dependency.
pub const CHARS_PER_TOKEN: usize = 4;

pub fn estimate_tokens(content: &str) -> u32 {
  (content.len() / CHARS_PER_TOKEN) as u32
}

/// SHA-256 of `content`, truncated to the first 8 bytes (16 hex chars), same shape as the
/// teacher's own `project_hash`. Used for dedup identity: two chunks with the same
/// `(content_hash, chunker_type)` are equivalent.
pub fn compute_content_hash(content: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(content.as_bytes());
  let digest = hasher.finalize();
  format!("{:016x}", u64::from_be_bytes(digest[0..8].try_into().unwrap()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
  Function,
  TypeDef,
  ControlFlow,
  Call,
  Literal,
  Comment,
  Structural,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkerType {
  Semantic,
  Delimiter,
}

/// Four floats in `[0, 1]` scoring why a chunk matters for retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImportanceScores {
  pub relevance: f32,
  pub context: f32,
  pub discovery: f32,
  pub modification: f32,
}

impl ImportanceScores {
  pub fn uniform(score: f32) -> Self {
    Self {
      relevance: score,
      context: score,
      discovery: score,
      modification: score,
    }
  }

  /// Overall importance used against the SemanticChunker's emission threshold: the max of
  /// the four facets, matching "Importance is the maximum of...".
  pub fn overall(&self) -> f32 {
    self.relevance.max(self.context).max(self.discovery).max(self.modification)
  }
}

/// Identifies where a chunk's embedding(s) live in the process-wide embedding registry.
/// A chunk never carries its own vector; it carries the keys to look one up (see
/// `codeweaver_core::registry`), breaking the otherwise-circular `Chunk <-> Embedding` graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchKey {
  pub batch_id: Uuid,
  pub batch_index: u32,
  pub is_sparse: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchKeys {
  pub dense: Option<BatchKey>,
  pub sparse: Option<BatchKey>,
}

/// A retrievable span of a source file plus its derived metadata.
///
/// Immutable after construction: any change (e.g. attaching a sparse embedding, adjusting
/// scores) must go through [`Chunk::with_batch_keys`] or a fresh [`ChunkBuilder`], never a
/// mutable field update, so that `chunk_id` always identifies one frozen `(content,
/// chunker_type)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
  pub chunk_id: Uuid,
  pub chunk_name: String,
  pub file_path: String,
  pub content: String,
  pub line_range: (u32, u32),
  pub content_hash: String,
  pub classification: Classification,
  pub importance_scores: ImportanceScores,
  pub is_composite: bool,
  pub nesting_level: u32,
  pub chunker_type: ChunkerType,
  pub language: Language,
  pub batch_keys: BatchKeys,
}

impl Chunk {
  /// A fresh `chunk_id` is minted on every construction; callers that only want to record
  /// new batch keys should use [`Chunk::with_batch_keys`] instead of rebuilding by hand.
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    chunk_name: String,
    file_path: String,
    content: String,
    line_range: (u32, u32),
    classification: Classification,
    importance_scores: ImportanceScores,
    is_composite: bool,
    nesting_level: u32,
    chunker_type: ChunkerType,
    language: Language,
  ) -> Self {
    let content_hash = compute_content_hash(&content);
    Self {
      chunk_id: Uuid::now_v7(),
      chunk_name,
      file_path,
      content,
      line_range,
      content_hash,
      classification,
      importance_scores,
      is_composite,
      nesting_level,
      chunker_type,
      language,
      batch_keys: BatchKeys::default(),
    }
  }

  /// Derive a new Chunk carrying `batch_keys`. Per the immutability invariant this mints a
  /// new `chunk_id`; callers that need dedup-stable identity across a rename should instead
  /// reuse the *previous* chunk's id explicitly via [`Chunk::rehomed`].
  pub fn with_batch_keys(&self, batch_keys: BatchKeys) -> Self {
    Self {
      chunk_id: Uuid::now_v7(),
      batch_keys,
      ..self.clone()
    }
  }

  /// Rehome an unchanged chunk (identical `content_hash`) under a new file path, preserving
  /// `chunk_id`. Used by the indexer's rename handling (S3): the embedding is not
  /// re-requested, so the old chunk identity — and its registry entry — stays valid.
  pub fn rehomed(&self, new_file_path: String) -> Self {
    Self {
      file_path: new_file_path,
      ..self.clone()
    }
  }

  pub fn tokens_estimate(&self) -> u32 {
    estimate_tokens(&self.content)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> Chunk {
    Chunk::new(
      "Rust-function_item-Function: 'foo'".into(),
      "src/a.rs".into(),
      "fn foo() {}".into(),
      (1, 1),
      Classification::Function,
      ImportanceScores::uniform(0.8),
      false,
      0,
      ChunkerType::Semantic,
      Language::Rust,
    )
  }

  #[test]
  fn content_hash_is_deterministic() {
    assert_eq!(compute_content_hash("fn foo() {}"), compute_content_hash("fn foo() {}"));
    assert_ne!(compute_content_hash("fn foo() {}"), compute_content_hash("fn bar() {}"));
  }

  #[test]
  fn construction_stamps_content_hash_and_fresh_id() {
    let c = sample();
    assert_eq!(c.content_hash, compute_content_hash(&c.content));
    let c2 = sample();
    assert_ne!(c.chunk_id, c2.chunk_id, "each construction mints a new time-ordered id");
  }

  #[test]
  fn rehoming_preserves_identity() {
    let c = sample();
    let moved = c.rehomed("src/b.rs".into());
    assert_eq!(c.chunk_id, moved.chunk_id);
    assert_eq!(c.content_hash, moved.content_hash);
    assert_eq!(moved.file_path, "src/b.rs");
  }

  #[test]
  fn overall_importance_is_max_of_facets() {
    let scores = ImportanceScores {
      relevance: 0.2,
      context: 0.9,
      discovery: 0.1,
      modification: 0.3,
    };
    assert_eq!(scores.overall(), 0.9);
  }
}
