use std::time::Duration;

use codeweaver_core::chunk::Chunk;
use codeweaver_core::{Language, Statistics};

use crate::dedup::DedupStore;
use crate::delimiter::DelimiterChunker;
use crate::error::ChunkerError;
use crate::governor::ChunkGovernor;
use crate::semantic::{SemanticChunker, SemanticLimits};

/// Tunables a caller resolves from [`codeweaver_core::config::ChunkerConfig`] once per
/// indexing run.
#[derive(Debug, Clone, Copy)]
pub struct ChunkerTunables {
  pub importance_threshold: f32,
  pub max_chunk_tokens: usize,
  pub max_ast_depth: u32,
  pub timeout: Duration,
  pub max_chunks_per_file: usize,
}

impl Default for ChunkerTunables {
  fn default() -> Self {
    Self {
      importance_threshold: 0.3,
      max_chunk_tokens: 512,
      max_ast_depth: 200,
      timeout: Duration::from_secs(30),
      max_chunks_per_file: 4096,
    }
  }
}

/// Picks `SemanticChunker` when the language has a tree-sitter grammar, falling back to
/// `DelimiterChunker` on anything else or on a semantic parse failure. This is the one
/// entry point other crates (`codeweaver-indexer`) call; it owns governor construction so
/// every file gets a fresh timeout/depth/chunk-count budget.
#[derive(Clone, Copy)]
pub struct ChunkerSelector {
  tunables: ChunkerTunables,
}

impl ChunkerSelector {
  pub fn new(tunables: ChunkerTunables) -> Self {
    Self { tunables }
  }

  pub fn chunk_file(&self, content: &str, relative_path: &str, language: Language, dedup: &DedupStore, stats: &Statistics) -> Result<Vec<Chunk>, ChunkerError> {
    if is_binary(content.as_bytes()) {
      return Err(ChunkerError::BinaryFile);
    }

    let mut governor = ChunkGovernor::new(self.tunables.timeout, self.tunables.max_chunks_per_file, self.tunables.max_ast_depth);

    if !language.has_semantic_support() {
      return DelimiterChunker::chunk(content, relative_path, language, &mut governor, dedup, stats);
    }

    let limits = SemanticLimits {
      importance_threshold: self.tunables.importance_threshold,
      max_chunk_tokens: self.tunables.max_chunk_tokens,
    };

    match SemanticChunker::chunk(content, relative_path, language, limits, &mut governor, dedup, stats) {
      Ok(chunks) => Ok(chunks),
      Err(e) if e.falls_back_to_delimiter() => {
        stats.chunking().semantic_failed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let mut governor = ChunkGovernor::new(self.tunables.timeout, self.tunables.max_chunks_per_file, self.tunables.max_ast_depth);
        DelimiterChunker::chunk(content, relative_path, language, &mut governor, dedup, stats)
      }
      Err(ChunkerError::ChunkingTimeout(timeout)) => {
        stats.chunking().timeouts.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Err(ChunkerError::ChunkingTimeout(timeout))
      }
      Err(e) => Err(e),
    }
  }
}

/// Defense-in-depth binary probe mirroring `codeweaver-discovery`'s heuristic: callers that
/// feed content straight from the watcher (bypassing `FileDiscovery::discover()`) still get a
/// binary file rejected rather than garbage-chunked.
fn is_binary(bytes: &[u8]) -> bool {
  let probe = &bytes[..bytes.len().min(8192)];
  probe.contains(&0)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn routes_rust_to_semantic_chunker() {
    let selector = ChunkerSelector::new(ChunkerTunables::default());
    let chunks = selector
    .chunk_file("fn foo() {\n 1\n}\n", "a.rs", Language::Rust, &DedupStore::new(), &Statistics::new())
    .unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].chunker_type, codeweaver_core::chunk::ChunkerType::Semantic);
  }

  #[test]
  fn routes_unsupported_language_to_delimiter_chunker() {
    let selector = ChunkerSelector::new(ChunkerTunables::default());
    let chunks = selector
    .chunk_file("def foo:\n return 1\n", "a.unknown", Language::Other, &DedupStore::new(), &Statistics::new())
    .unwrap();
    assert_eq!(chunks[0].chunker_type, codeweaver_core::chunk::ChunkerType::Delimiter);
  }

  #[test]
  fn rejects_binary_content() {
    let selector = ChunkerSelector::new(ChunkerTunables::default());
    let binary = "fn foo() {\0\0\0}";
    let err = selector.chunk_file(binary, "a.rs", Language::Rust, &DedupStore::new(), &Statistics::new()).unwrap_err();
    assert!(matches!(err, ChunkerError::BinaryFile));
  }
}
