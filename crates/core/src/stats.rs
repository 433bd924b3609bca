use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct DiscoveryCounters {
  pub files_seen: AtomicU64,
  pub files_skipped: AtomicU64,
  pub unreadable: AtomicU64,
}

#[derive(Debug, Default)]
pub struct ChunkingCounters {
  pub chunks_emitted: AtomicU64,
  pub dedup_skipped: AtomicU64,
  pub semantic_failed: AtomicU64,
  pub delimiter_used: AtomicU64,
  pub oversized_fallback: AtomicU64,
  pub timeouts: AtomicU64,
}

#[derive(Debug, Default)]
pub struct EmbeddingCounters {
  pub batches_issued: AtomicU64,
  pub items_issued: AtomicU64,
  pub retries: AtomicU64,
  pub failures: AtomicU64,
  pub tokens_estimate: AtomicU64,
}

#[derive(Debug, Default)]
pub struct VectorStoreCounters {
  pub upserts: AtomicU64,
  pub deletes: AtomicU64,
  pub searches: AtomicU64,
  pub breaker_opened: AtomicU64,
  pub breaker_closed: AtomicU64,
}

#[derive(Debug, Default)]
pub struct FailoverCounters {
  pub activations: AtomicU64,
  pub restorations: AtomicU64,
  pub sync_successes: AtomicU64,
  pub sync_failures: AtomicU64,
}

#[derive(Debug, Default)]
pub struct ReconciliationCounters {
  pub scanned: AtomicU64,
  pub repaired: AtomicU64,
  pub unrecoverable: AtomicU64,
}

#[derive(Debug, Default)]
pub struct QueryCounters {
  pub requests: AtomicU64,
  pub hybrid: AtomicU64,
  pub dense: AtomicU64,
  pub sparse: AtomicU64,
  pub keyword: AtomicU64,
}

impl QueryCounters {
  pub fn record(&self, strategy: &crate::search::Strategy) {
    use crate::search::Strategy::*;
    self.requests.fetch_add(1, Ordering::Relaxed);
    let bucket = match strategy {
      HybridSearch => &self.hybrid,
      DenseSearch => &self.dense,
      SparseOnly => &self.sparse,
      KeywordFallback => &self.keyword,
    };
    bucket.fetch_add(1, Ordering::Relaxed);
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryStats {
  pub files_seen: u64,
  pub files_skipped: u64,
  pub unreadable: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkingStats {
  pub chunks_emitted: u64,
  pub dedup_skipped: u64,
  pub semantic_failed: u64,
  pub delimiter_used: u64,
  pub oversized_fallback: u64,
  pub timeouts: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingStats {
  pub batches_issued: u64,
  pub items_issued: u64,
  pub retries: u64,
  pub failures: u64,
  pub tokens_estimate: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorStoreStats {
  pub upserts: u64,
  pub deletes: u64,
  pub searches: u64,
  pub breaker_opened: u64,
  pub breaker_closed: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailoverStats {
  pub activations: u64,
  pub restorations: u64,
  pub sync_successes: u64,
  pub sync_failures: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationStats {
  pub scanned: u64,
  pub repaired: u64,
  pub unrecoverable: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ByStrategy {
  pub hybrid: u64,
  pub dense: u64,
  pub sparse: u64,
  pub keyword: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryStats {
  pub requests: u64,
  pub by_strategy: ByStrategy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
  pub discovery: DiscoveryStats,
  pub chunking: ChunkingStats,
  pub embedding: EmbeddingStats,
  pub vector_store: VectorStoreStats,
  pub failover: FailoverStats,
  pub reconciliation: ReconciliationStats,
  pub query: QueryStats,
}

/// Single process-wide counter object, safe for concurrent increment from any component.
/// Held by the root `Context`, not as an ambient global, so tests can construct a fresh one
/// instead of relying on global teardown between runs.
#[derive(Debug, Default, Clone)]
pub struct Statistics(Arc<StatisticsInner>);

#[derive(Debug, Default)]
struct StatisticsInner {
  discovery: DiscoveryCounters,
  chunking: ChunkingCounters,
  embedding: EmbeddingCounters,
  vector_store: VectorStoreCounters,
  failover: FailoverCounters,
  reconciliation: ReconciliationCounters,
  query: QueryCounters,
}

impl Statistics {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn discovery(&self) -> &DiscoveryCounters {
    &self.0.discovery
  }
  pub fn chunking(&self) -> &ChunkingCounters {
    &self.0.chunking
  }
  pub fn embedding(&self) -> &EmbeddingCounters {
    &self.0.embedding
  }
  pub fn vector_store(&self) -> &VectorStoreCounters {
    &self.0.vector_store
  }
  pub fn failover(&self) -> &FailoverCounters {
    &self.0.failover
  }
  pub fn reconciliation(&self) -> &ReconciliationCounters {
    &self.0.reconciliation
  }
  pub fn query(&self) -> &QueryCounters {
    &self.0.query
  }

  /// Clone the whole record atomically field-by-field. Each field load is independently
  /// atomic; the snapshot as a whole is "recent", not a single linearizable point, which is
  /// adequate for an observability read per
  pub fn snapshot(&self) -> StatisticsSnapshot {
    let d = &self.0.discovery;
    let c = &self.0.chunking;
    let e = &self.0.embedding;
    let v = &self.0.vector_store;
    let f = &self.0.failover;
    let r = &self.0.reconciliation;
    let q = &self.0.query;
    StatisticsSnapshot {
      discovery: DiscoveryStats {
        files_seen: d.files_seen.load(Ordering::Relaxed),
        files_skipped: d.files_skipped.load(Ordering::Relaxed),
        unreadable: d.unreadable.load(Ordering::Relaxed),
      },
      chunking: ChunkingStats {
        chunks_emitted: c.chunks_emitted.load(Ordering::Relaxed),
        dedup_skipped: c.dedup_skipped.load(Ordering::Relaxed),
        semantic_failed: c.semantic_failed.load(Ordering::Relaxed),
        delimiter_used: c.delimiter_used.load(Ordering::Relaxed),
        oversized_fallback: c.oversized_fallback.load(Ordering::Relaxed),
        timeouts: c.timeouts.load(Ordering::Relaxed),
      },
      embedding: EmbeddingStats {
        batches_issued: e.batches_issued.load(Ordering::Relaxed),
        items_issued: e.items_issued.load(Ordering::Relaxed),
        retries: e.retries.load(Ordering::Relaxed),
        failures: e.failures.load(Ordering::Relaxed),
        tokens_estimate: e.tokens_estimate.load(Ordering::Relaxed),
      },
      vector_store: VectorStoreStats {
        upserts: v.upserts.load(Ordering::Relaxed),
        deletes: v.deletes.load(Ordering::Relaxed),
        searches: v.searches.load(Ordering::Relaxed),
        breaker_opened: v.breaker_opened.load(Ordering::Relaxed),
        breaker_closed: v.breaker_closed.load(Ordering::Relaxed),
      },
      failover: FailoverStats {
        activations: f.activations.load(Ordering::Relaxed),
        restorations: f.restorations.load(Ordering::Relaxed),
        sync_successes: f.sync_successes.load(Ordering::Relaxed),
        sync_failures: f.sync_failures.load(Ordering::Relaxed),
      },
      reconciliation: ReconciliationStats {
        scanned: r.scanned.load(Ordering::Relaxed),
        repaired: r.repaired.load(Ordering::Relaxed),
        unrecoverable: r.unrecoverable.load(Ordering::Relaxed),
      },
      query: QueryStats {
        requests: q.requests.load(Ordering::Relaxed),
        by_strategy: ByStrategy {
          hybrid: q.hybrid.load(Ordering::Relaxed),
          dense: q.dense.load(Ordering::Relaxed),
          sparse: q.sparse.load(Ordering::Relaxed),
          keyword: q.keyword.load(Ordering::Relaxed),
        },
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::Ordering;

  #[test]
  fn increments_are_visible_in_snapshot() {
    let stats = Statistics::new();
    stats.discovery().files_seen.fetch_add(5, Ordering::Relaxed);
    stats.chunking().chunks_emitted.fetch_add(2, Ordering::Relaxed);
    let snap = stats.snapshot();
    assert_eq!(snap.discovery.files_seen, 5);
    assert_eq!(snap.chunking.chunks_emitted, 2);
  }

  #[test]
  fn query_record_updates_strategy_bucket() {
    let stats = Statistics::new();
    stats.query().record(&crate::search::Strategy::HybridSearch);
    stats.query().record(&crate::search::Strategy::DenseSearch);
    let snap = stats.snapshot();
    assert_eq!(snap.query.requests, 2);
    assert_eq!(snap.query.by_strategy.hybrid, 1);
    assert_eq!(snap.query.by_strategy.dense, 1);
  }

  #[test]
  fn cloned_statistics_share_state() {
    let stats = Statistics::new();
    let clone = stats.clone();
    clone.discovery().unreadable.fetch_add(1, Ordering::Relaxed);
    assert_eq!(stats.snapshot().discovery.unreadable, 1);
  }
}
