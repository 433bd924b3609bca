//! Built-in SPLADE-style sparse provider.
//!
//! The teacher carries no sparse embedding client at all — `ollama.rs` and `openrouter.rs`
//! only ever produce dense vectors. still requires a `SparseEmbeddingProvider` for the
//! hybrid/sparse-only query strategies to exist without a network round trip to a remote
//! SPLADE endpoint, so this hashes terms into a fixed-width index space (the same hashing
//! trick `other_examples`' BM25/SPLADE-adjacent retrieval crates use to avoid carrying a
//! vocabulary file) and scores them by log-scaled term frequency, which is enough to produce
//! a real, queryable sparse vector without depending on an external provider being
//! configured.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::provider::{EmbeddingError, SparseEmbeddingProvider, SparseVector};

const DEFAULT_VOCAB_SIZE: u32 = 30_000;

/// Lower-cases and splits on anything that isn't alphanumeric or underscore, which is close
/// enough to source-code tokenization (identifiers, keywords, numeric literals) without
/// pulling in a real tokenizer crate.
fn tokenize(text: &str) -> Vec<String> {
  text
  .split(|c: char| !c.is_alphanumeric() && c != '_')
  .filter(|t| !t.is_empty())
  .map(|t| t.to_lowercase())
  .collect()
}

fn hash_token(token: &str, vocab_size: u32) -> u32 {
  let hash = blake3::hash(token.as_bytes());
  let bytes = hash.as_bytes();
  let value = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
  value % vocab_size
}

/// Local, network-free sparse embedder: hashed-term-frequency vectors over a fixed index
/// space. Never returns an authentication error and is always healthy, since it has no
/// external dependency to fail.
pub struct HashingSparseProvider {
  vocab_size: u32,
  healthy: Arc<AtomicBool>,
}

impl Default for HashingSparseProvider {
  fn default() -> Self {
    Self::new(DEFAULT_VOCAB_SIZE)
  }
}

impl HashingSparseProvider {
  pub fn new(vocab_size: u32) -> Self {
    Self { vocab_size, healthy: Arc::new(AtomicBool::new(true)) }
  }

  fn embed_one(&self, text: &str) -> SparseVector {
    let mut counts: HashMap<u32, u32> = HashMap::new();
    for token in tokenize(text) {
      *counts.entry(hash_token(&token, self.vocab_size)).or_insert(0) += 1;
    }
    let mut pairs: Vec<(u32, u32)> = counts.into_iter().collect();
    pairs.sort_by_key(|(idx, _)| *idx);
    let indices = pairs.iter().map(|(idx, _)| *idx).collect();
    // log1p-scaled term frequency keeps a single very-repeated token from dominating the
    // dot product the way a raw count would.
    let values = pairs.iter().map(|(_, count)| (1.0 + *count as f32).ln()).collect();
    SparseVector { indices, values }
  }
}

#[async_trait]
impl SparseEmbeddingProvider for HashingSparseProvider {
  fn name(&self) -> &str {
    "hashing-sparse"
  }

  async fn embed_documents(&self, texts: &[String]) -> Result<Vec<SparseVector>, EmbeddingError> {
    Ok(texts.iter().map(|t| self.embed_one(t)).collect())
  }

  async fn embed_query(&self, text: &str) -> Result<SparseVector, EmbeddingError> {
    Ok(self.embed_one(text))
  }

  fn is_healthy(&self) -> bool {
    self.healthy.load(Ordering::Relaxed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn identical_text_produces_identical_vectors() {
    let provider = HashingSparseProvider::default();
    let a = provider.embed_query("fn foo() { bar; bar; }").await.unwrap();
    let b = provider.embed_query("fn foo() { bar; bar; }").await.unwrap();
    assert_eq!(a.indices, b.indices);
    assert_eq!(a.values, b.values);
  }

  #[tokio::test]
  async fn repeated_terms_score_higher_than_single_occurrence() {
    let provider = HashingSparseProvider::default();
    let vec = provider.embed_query("bar bar bar foo").await.unwrap();
    let bar_idx = hash_token("bar", DEFAULT_VOCAB_SIZE);
    let foo_idx = hash_token("foo", DEFAULT_VOCAB_SIZE);
    let bar_value = vec.indices.iter().position(|i| *i == bar_idx).map(|p| vec.values[p]).unwrap();
    let foo_value = vec.indices.iter().position(|i| *i == foo_idx).map(|p| vec.values[p]).unwrap();
    assert!(bar_value > foo_value);
  }

  #[tokio::test]
  async fn empty_text_yields_empty_vector() {
    let provider = HashingSparseProvider::default();
    let vec = provider.embed_query(" ").await.unwrap();
    assert!(vec.indices.is_empty());
  }
}
