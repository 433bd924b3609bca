use codeweaver_core::{ChunkerType, Statistics};
use moka::sync::Cache;
use std::sync::atomic::Ordering;
use uuid::Uuid;

fn default_hash_cache_weight() -> u64 {
  256 * 1024
}

fn default_chunk_cache_weight() -> u64 {
  3 * 1024 * 1024
}

/// `(content_hash, chunker_type)` identity, matching invariant 4 in : two chunks with the
/// same content hash and chunker type are equivalent for dedup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
  content_hash: String,
  chunker_type: ChunkerType,
}

/// Process-wide content-addressed cache of `(content_hash, chunker_type) -> chunk_id`,
/// bounded by a size-weighted LRU (default 256 KiB of hashes plus 3 MiB of chunk batch
/// references per ). `moka` gives us weighted eviction and lock-free concurrent
/// `get_with`, which is what makes the "concurrent insert of the same hash is serialized,
/// one insertion wins" guarantee cheap to provide: `get_with` runs the init closure for
/// exactly one of the racing callers.
#[derive(Clone)]
pub struct DedupStore {
  cache: Cache<DedupKey, Uuid>,
}

impl DedupStore {
  pub fn new() -> Self {
    Self::with_capacity(default_hash_cache_weight() + default_chunk_cache_weight())
  }

  pub fn with_capacity(max_weight_bytes: u64) -> Self {
    let cache = Cache::builder()
    .max_capacity(max_weight_bytes)
    .weigher(|key: &DedupKey, _value: &Uuid| -> u32 { (key.content_hash.len() + 16).min(u32::MAX as usize) as u32 })
    .build();
    Self { cache }
  }

  /// Look up an existing chunk id for `(content_hash, chunker_type)`, or insert `chunk_id` if
  /// none exists yet. Returns `(winning_id, was_duplicate)`: `was_duplicate` is true whenever
  /// the caller's `chunk_id` was *not* the one that ended up cached, whether because another
  /// thread raced it or because a previous batch already holds the hash.
  pub fn get_or_insert(&self, content_hash: &str, chunker_type: ChunkerType, chunk_id: Uuid, stats: &Statistics) -> (Uuid, bool) {
    let key = DedupKey {
      content_hash: content_hash.to_string(),
      chunker_type,
    };
    let winner = self.cache.get_with(key, || chunk_id);
    let was_duplicate = winner != chunk_id;
    if was_duplicate {
      stats.chunking().dedup_skipped.fetch_add(1, Ordering::Relaxed);
    }
    (winner, was_duplicate)
  }

  pub fn contains(&self, content_hash: &str, chunker_type: ChunkerType) -> bool {
    let key = DedupKey {
      content_hash: content_hash.to_string(),
      chunker_type,
    };
    self.cache.contains_key(&key)
  }

  pub fn len(&self) -> u64 {
    self.cache.entry_count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Explicit reset required at process-test boundaries and by `force_reindex`
  ///.
  pub fn clear(&self) {
    self.cache.invalidate_all();
  }
}

impl Default for DedupStore {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn first_insert_wins_identity() {
    let store = DedupStore::new();
    let stats = Statistics::new();
    let id = Uuid::now_v7();
    let (winner, dup) = store.get_or_insert("hash-a", ChunkerType::Semantic, id, &stats);
    assert_eq!(winner, id);
    assert!(!dup);
  }

  #[test]
  fn second_insert_of_same_hash_is_reported_as_duplicate() {
    let store = DedupStore::new();
    let stats = Statistics::new();
    let first = Uuid::now_v7();
    let second = Uuid::now_v7();
    store.get_or_insert("hash-a", ChunkerType::Semantic, first, &stats);
    let (winner, dup) = store.get_or_insert("hash-a", ChunkerType::Semantic, second, &stats);
    assert_eq!(winner, first);
    assert!(dup);
    assert_eq!(stats.snapshot().chunking.dedup_skipped, 1);
  }

  #[test]
  fn different_chunker_type_is_a_distinct_key() {
    let store = DedupStore::new();
    let stats = Statistics::new();
    let semantic_id = Uuid::now_v7();
    let delimiter_id = Uuid::now_v7();
    store.get_or_insert("hash-a", ChunkerType::Semantic, semantic_id, &stats);
    let (winner, dup) = store.get_or_insert("hash-a", ChunkerType::Delimiter, delimiter_id, &stats);
    assert_eq!(winner, delimiter_id);
    assert!(!dup);
  }

  #[test]
  fn clear_resets_the_store() {
    let store = DedupStore::new();
    let stats = Statistics::new();
    store.get_or_insert("hash-a", ChunkerType::Semantic, Uuid::now_v7(), &stats);
    store.clear();
    assert!(store.is_empty());
  }
}
