//! Orchestrates discovery → chunking → dedup → embedding → upsert, checkpoint
//! comparison, reconciliation of missing embeddings, and rename handling
//! (seed scenario S3).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::Utc;
use rayon::prelude::*;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use codeweaver_chunker::{ChunkerSelector, ChunkerTunables, DedupStore};
use codeweaver_core::chunk::{Chunk, compute_content_hash, estimate_tokens};
use codeweaver_core::config::IndexerSettings;
use codeweaver_core::registry::{DenseEmbedding, SparseEmbedding};
use codeweaver_core::{Context, DiscoveredFile, IndexFileManifest, Language, ManifestEntry, Statistics, normalize_relative_path};
use codeweaver_discovery::FileDiscovery;
use codeweaver_embedding::{EmbeddingProvider, SparseEmbeddingProvider};
use codeweaver_failover::{ChunkCountSource, FailoverManager};
use codeweaver_vectorstore::{CollectionConfig, PointVectors, SparseVectorData, UpsertPoint, scroll_all};

use crate::checkpoint::{CheckpointManager, ProviderFingerprint, fingerprint_inputs};
use crate::error::{FileFailure, IndexerError};

const RECONCILE_PAGE_SIZE: usize = 100;

/// Outcome of one `prime_index`/`reindex_files` run. : "a failed prime run yields a
/// summary with `status: partial` and counts of failures by kind" — `status` derives that
/// from whether any file failed.
#[derive(Debug, Clone, Default)]
pub struct IndexRunSummary {
  pub discovered_count: usize,
  pub files_indexed: usize,
  pub files_failed: usize,
  pub chunks_emitted: usize,
  pub chunks_upserted: usize,
  pub failures: Vec<FileFailure>,
}

impl IndexRunSummary {
  pub fn status(&self) -> &'static str {
    if self.files_failed == 0 { "ok" } else { "partial" }
  }
}

#[derive(Debug, Default)]
struct ManifestCountsInner {
  total_chunks: u64,
  total_files: u64,
}

/// Shared, live view of the manifest's totals. Handed to `FailoverManager` as a
/// `ChunkCountSource` at construction time — before the `Indexer` that owns the manifest
/// exists — so both hold a clone of the same cell rather than the `Indexer` depending on
/// `codeweaver-failover` (which would complete the cycle `failover -> indexer -> failover`).
#[derive(Clone, Debug, Default)]
pub struct ManifestChunkCounts(Arc<std::sync::RwLock<ManifestCountsInner>>);

impl ManifestChunkCounts {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_manifest(manifest: &IndexFileManifest) -> Self {
    let counts = Self::new();
    counts.refresh(manifest);
    counts
  }

  pub fn refresh(&self, manifest: &IndexFileManifest) {
    let mut guard = self.0.write().unwrap();
    guard.total_chunks = manifest.total_chunk_count() as u64;
    guard.total_files = manifest.len() as u64;
  }
}

impl ChunkCountSource for ManifestChunkCounts {
  fn total_chunk_count(&self) -> Option<u64> {
    let guard = self.0.read().unwrap();
    if guard.total_files == 0 { None } else { Some(guard.total_chunks) }
  }

  fn total_file_count(&self) -> u64 {
    self.0.read().unwrap().total_files
  }
}

/// One file queued for chunking on the worker pool.
struct ChunkJob {
  path: String,
  absolute_path: String,
  language: Language,
}

enum ChunkJobError {
  Read(String),
  Chunker(String),
}

/// Runs `jobs` across `pool`'s bounded worker threads, reading and chunking each file. Called
/// from inside a `spawn_blocking` closure so the CPU-bound work (tree-sitter parsing, regex
/// boundary extraction) never runs on a tokio runtime thread. `into_par_iter` over a `Vec`
/// preserves input order in the collected output.
fn chunk_group_blocking(
  pool: &rayon::ThreadPool,
  chunker: ChunkerSelector,
  dedup: &DedupStore,
  stats: &Statistics,
  jobs: Vec<ChunkJob>,
) -> Vec<(String, Result<Vec<Chunk>, ChunkJobError>)> {
  pool.install(|| {
    jobs
    .into_par_iter()
    .map(|job| {
      let outcome = std::fs::read_to_string(&job.absolute_path)
      .map_err(|err| ChunkJobError::Read(err.to_string()))
      .and_then(|content| chunker.chunk_file(&content, &job.path, job.language, dedup, stats).map_err(|err| ChunkJobError::Chunker(err.to_string())));
      (job.path, outcome)
    })
    .collect()
  })
}

/// Drives an end-to-end indexing pass. Single-owner of the manifest (via `checkpoint`); all
/// other collaborators (`DedupStore`, `EmbeddingRegistry`, `Statistics`) are either owned
/// outright (`dedup`) or shared through `context` per `codeweaver_core::Context`'s contract.
pub struct Indexer {
  project_root: PathBuf,
  settings: IndexerSettings,
  context: Context,
  discovery: FileDiscovery,
  chunker: ChunkerSelector,
  dedup: DedupStore,
  dense_provider: Option<Arc<dyn EmbeddingProvider>>,
  sparse_provider: Option<Arc<dyn SparseEmbeddingProvider>>,
  failover: Arc<FailoverManager>,
  checkpoint: CheckpointManager,
  manifest_counts: ManifestChunkCounts,
  collection: String,
  chunk_pool: Arc<rayon::ThreadPool>,
}

impl Indexer {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    project_root: impl Into<PathBuf>,
    settings: IndexerSettings,
    context: Context,
    failover: Arc<FailoverManager>,
    checkpoint: CheckpointManager,
    manifest_counts: ManifestChunkCounts,
    dense_provider: Option<Arc<dyn EmbeddingProvider>>,
    sparse_provider: Option<Arc<dyn SparseEmbeddingProvider>>,
  ) -> Self {
    let project_root = project_root.into();
    let discovery = FileDiscovery::new(project_root.clone(), settings.discovery.clone(), context.stats.clone());
    let tunables = ChunkerTunables {
      importance_threshold: settings.chunker.importance_threshold,
      max_chunk_tokens: settings.chunker.max_chunk_tokens,
      max_ast_depth: settings.chunker.max_ast_depth,
      timeout: std::time::Duration::from_secs(settings.chunker.timeout_secs),
      max_chunks_per_file: settings.chunker.max_chunks_per_file,
    };
    let collection = settings.vector_store.collection_name.clone();
    let chunk_pool = rayon::ThreadPoolBuilder::new()
    .num_threads(num_cpus::get().min(8))
    .thread_name(|i| format!("codeweaver-chunk-{i}"))
    .build()
    .expect("chunking thread pool builds with a bounded, non-zero thread count");
    Self {
      project_root,
      settings,
      context,
      discovery,
      chunker: ChunkerSelector::new(tunables),
      dedup: DedupStore::new(),
      dense_provider,
      sparse_provider,
      failover,
      checkpoint,
      manifest_counts,
      collection,
      chunk_pool: Arc::new(chunk_pool),
    }
  }

  pub fn project_root(&self) -> &Path {
    &self.project_root
  }

  pub fn checkpoint(&self) -> &CheckpointManager {
    &self.checkpoint
  }

  pub fn manifest_counts(&self) -> ManifestChunkCounts {
    self.manifest_counts.clone()
  }

  /// : compare the freshly computed fingerprint to the last-persisted one and force a
  /// full reindex on mismatch (including "no prior fingerprint at all" — a fresh project).
  pub async fn prime_with_checkpoint(&mut self, providers: &[ProviderFingerprint]) -> Result<IndexRunSummary, IndexerError> {
    let inputs = fingerprint_inputs(&self.settings, self.project_root(), providers);
    let current = CheckpointManager::compute_settings_hash(&inputs);
    let force = self.checkpoint().last_fingerprint().as_ref() != Some(&current);
    if force {
      info!("settings fingerprint changed or absent; forcing full reindex");
    }
    let summary = self.prime_index(force).await?;
    self.checkpoint().persist_fingerprint(&current)?;
    Ok(summary)
  }

  /// Full indexing pass. Reconciliation runs first unless `force_reindex`; renames are
  /// detected before any chunking happens, so an unchanged-but-moved file never re-embeds.
  pub async fn prime_index(&mut self, force_reindex: bool) -> Result<IndexRunSummary, IndexerError> {
    let mut summary = IndexRunSummary::default();

    if force_reindex {
      self.dedup.clear();
    } else {
      self.reconcile_missing_embeddings(&mut summary).await;
    }

    let discovered = self.discovery.discover_checked()?;
    summary.discovered_count = discovered.len();
    let discovered_by_path: HashMap<String, DiscoveredFile> = discovered.into_iter().map(|f| (f.relative_path.clone(), f)).collect();

    let manifest_paths: Vec<String> = self.checkpoint().manifest().paths().cloned().collect();
    let mut stale: Vec<String> = Vec::new();
    let mut new_or_changed: Vec<String> = Vec::new();

    if force_reindex {
      new_or_changed.extend(discovered_by_path.keys().cloned());
      stale.extend(manifest_paths.into_iter().filter(|p| !discovered_by_path.contains_key(p)));
    } else {
      for path in &manifest_paths {
        match discovered_by_path.get(path) {
          Some(file) => {
            let unchanged = self.checkpoint().manifest().get(path).is_some_and(|e| e.content_hash == file.content_hash);
            if !unchanged {
              new_or_changed.push(path.clone());
            }
          }
          None => stale.push(path.clone()),
        }
      }
      for path in discovered_by_path.keys() {
        if self.checkpoint().manifest().get(path).is_none() {
          new_or_changed.push(path.clone());
        }
      }
    }

    let renames = self.detect_renames(&stale, &new_or_changed, &discovered_by_path);
    for (old_path, new_path) in &renames {
      stale.retain(|p| p != old_path);
      new_or_changed.retain(|p| p != new_path);
    }
    self.apply_renames(&renames, &discovered_by_path, &mut summary).await;

    for path in stale {
      self.remove_one(&path, &mut summary).await;
    }

    self.index_targets(&new_or_changed, &discovered_by_path, &mut summary).await;

    self.checkpoint().save_manifest()?;
    self.manifest_counts.refresh(self.checkpoint().manifest());

    info!(
      discovered = summary.discovered_count,
      indexed = summary.files_indexed,
      failed = summary.files_failed,
      chunks = summary.chunks_emitted,
      status = summary.status(),
      "prime_index complete"
    );
    Ok(summary)
  }

  /// Targeted pass over a caller-supplied path set (watcher-driven `Created`/`Modified`
  /// events, or an explicit CLI request). Unreadable/vanished paths are treated as removals.
  pub async fn reindex_files(&mut self, paths: &[String]) -> Result<usize, IndexerError> {
    let mut summary = IndexRunSummary::default();
    let normalized = self.normalize_paths(paths);

    let mut discovered_by_path = HashMap::new();
    for relative in &normalized {
      let absolute = self.project_root().join(relative);
      match self.probe_single_file(&absolute, relative) {
        Some(file) => {
          discovered_by_path.insert(relative.clone(), file);
        }
        None => self.remove_one(relative, &mut summary).await,
      }
    }

    let targets: Vec<String> = discovered_by_path.keys().cloned().collect();
    self.index_targets(&targets, &discovered_by_path, &mut summary).await;

    self.checkpoint().save_manifest()?;
    self.manifest_counts.refresh(self.checkpoint().manifest());
    Ok(summary.files_indexed)
  }

  /// Delete chunks for `paths` from the active vector store and the manifest. Idempotent: a path with no manifest entry is silently skipped.
  pub async fn remove_files(&mut self, paths: &[String]) -> Result<usize, IndexerError> {
    let mut summary = IndexRunSummary::default();
    let normalized = self.normalize_paths(paths);
    let mut removed = 0;
    for relative in normalized {
      if self.checkpoint().manifest().has_file(&relative) {
        self.remove_one(&relative, &mut summary).await;
        removed += 1;
      }
    }
    self.checkpoint().save_manifest()?;
    self.manifest_counts.refresh(self.checkpoint().manifest());
    Ok(removed)
  }

  /// Reconciliation pass, also exposed standalone for an explicit CLI/management
  /// invocation outside of a full `prime_index`.
  pub async fn add_missing_embeddings_to_existing_chunks(&mut self) -> IndexRunSummary {
    let mut summary = IndexRunSummary::default();
    self.reconcile_missing_embeddings(&mut summary).await;
    summary
  }

  fn normalize_paths(&self, paths: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
      let absolute = if Path::new(path).is_absolute() { PathBuf::from(path) } else { self.project_root().join(path) };
      match normalize_relative_path(self.project_root(), &absolute) {
        Some(relative) => out.push(relative),
        None => warn!(path, "path failed normalization against project root; dropping event"),
      }
    }
    out
  }

  fn probe_single_file(&self, absolute: &Path, relative: &str) -> Option<DiscoveredFile> {
    let metadata = std::fs::metadata(absolute).ok()?;
    if metadata.len() > self.settings.discovery.max_file_size_bytes {
      return None;
    }
    let bytes = std::fs::read(absolute).ok()?;
    let probe_len = bytes.len().min(self.settings.discovery.binary_probe_bytes);
    if bytes[..probe_len].contains(&0) {
      return None;
    }
    let content = String::from_utf8_lossy(&bytes);
    let content_hash = compute_content_hash(&content);
    let language = Path::new(relative).extension().and_then(|e| e.to_str()).map(Language::from_extension).unwrap_or(Language::Other);
    Some(DiscoveredFile {
        absolute_path: absolute.to_string_lossy().into_owned(),
        relative_path: relative.to_string(),
        size_bytes: metadata.len(),
        language,
        content_hash,
      })
  }

  /// Pairs a STALE manifest path with a NEW discovered path sharing the same `content_hash`
  /// (S3: a rename is a delete+create with identical content, not a content change). Only
  /// ever matches against `stale` — an existing path whose own hash changed is `CHANGED`, not
  /// a rename candidate, even if it happens to collide with another file's prior hash.
  fn detect_renames(&self, stale: &[String], new_or_changed: &[String], discovered: &HashMap<String, DiscoveredFile>) -> Vec<(String, String)> {
    let mut by_hash: HashMap<&str, &str> = HashMap::new();
    for path in stale {
      if let Some(entry) = self.checkpoint().manifest().get(path) {
        by_hash.entry(entry.content_hash.as_str()).or_insert(path.as_str());
      }
    }

    let mut used_old = HashSet::new();
    let mut renames = Vec::new();
    for new_path in new_or_changed {
      // A path already present in the manifest under its own name is CHANGED, not a rename
      // candidate, even if its new content happens to collide with some other file's old hash.
      if self.checkpoint().manifest().has_file(new_path) {
        continue;
      }
      let Some(file) = discovered.get(new_path) else { continue };
      if let Some(&old_path) = by_hash.get(file.content_hash.as_str())
      && used_old.insert(old_path)
      {
        renames.push((old_path.to_string(), new_path.clone()));
      }
    }
    renames
  }

  /// Rewrites the `file_path` of every vector-store point belonging to a renamed file in
  /// place, preserving `chunk_id`/`content_hash`/embeddings, instead of deleting and
  /// re-chunking: the chunker's own content-hash dedup would otherwise discard the
  /// unchanged content on re-chunk and leave the new path with zero chunks (S3).
  async fn apply_renames(&mut self, renames: &[(String, String)], discovered: &HashMap<String, DiscoveredFile>, summary: &mut IndexRunSummary) {
    if renames.is_empty() {
      return;
    }

    let store = self.failover.active_store();
    let old_to_new: HashMap<&str, &str> = renames.iter().map(|(old, new)| (old.as_str(), new.as_str())).collect();

    let all_points = match scroll_all(store.as_ref(), &self.collection, RECONCILE_PAGE_SIZE).await {
      Ok(points) => points,
      Err(err) => {
        warn!(error = %err, "rename handling: scroll of vector store failed; falling back to delete+reindex");
        for (_, new_path) in renames {
          summary.failures.push(FileFailure { relative_path: new_path.clone(), cause: format!("rename bypass failed: {err}") });
        }
        return;
      }
    };

    let mut rewritten = Vec::new();
    for point in all_points {
      let Some(old_path) = point.payload.get("file_path").and_then(|v| v.as_str()) else { continue };
      let Some(&new_path) = old_to_new.get(old_path) else { continue };

      let mut payload = point.payload.clone();
      payload["file_path"] = json!(new_path);
      if let Some(chunk_value) = point.payload.get("chunk")
      && let Ok(chunk) = serde_json::from_value::<Chunk>(chunk_value.clone())
      {
        payload["chunk"] = json!(chunk.rehomed(new_path.to_string()));
      }
      rewritten.push(UpsertPoint { id: point.id, vectors: point.vectors, payload });
    }

    if !rewritten.is_empty()
    && let Err(err) = store.upsert(&self.collection, rewritten).await
    {
      warn!(error = %err, "rename handling: upsert of rewritten points failed");
    }

    for (old_path, new_path) in renames {
      let Some(file) = discovered.get(new_path) else { continue };
      let Some(old_entry) = self.checkpoint().manifest_mut().remove(old_path) else { continue };
      self.checkpoint().manifest_mut().set(
        new_path.clone(),
        ManifestEntry { content_hash: old_entry.content_hash, indexed_at: Utc::now(), chunk_count: old_entry.chunk_count, language: file.language },
      );
      summary.files_indexed += 1;
      info!(old = %old_path, new = %new_path, "rehomed file in place; embeddings not re-requested (dedup hit)");
    }
  }

  async fn remove_one(&mut self, relative_path: &str, summary: &mut IndexRunSummary) {
    let store = self.failover.active_store();
    match store.delete_by_file(&self.collection, relative_path).await {
      Ok(_) => {
        self.checkpoint().manifest_mut().remove(relative_path);
        self.context.stats.vector_store().deletes.fetch_add(1, Ordering::Relaxed);
      }
      Err(err) => {
        warn!(path = relative_path, error = %err, "failed to delete stale file's chunks; manifest entry left unchanged");
        summary.files_failed += 1;
        summary.failures.push(FileFailure { relative_path: relative_path.to_string(), cause: err.to_string() });
      }
    }
  }

  /// Chunks `targets` in groups of `batch_files`, accumulating into the current batch until
  /// either `batch_files` files or `batch_chunks` chunks is reached, then flushes. Each
  /// group's files are chunked concurrently on the bounded chunking worker pool
  /// (`min(num_cpus::get(), 8)` threads) via [`chunk_group_blocking`] so this CPU-bound work
  /// never runs on a tokio worker thread. Sorted processing keeps a run's ordering
  /// deterministic modulo discovery's own order.
  async fn index_targets(&mut self, targets: &[String], discovered: &HashMap<String, DiscoveredFile>, summary: &mut IndexRunSummary) {
    let batch_files = self.settings.index.batch_files.max(1);
    let batch_chunks_limit = self.settings.index.batch_chunks.max(1);

    let mut sorted_targets = targets.to_vec();
    sorted_targets.sort();

    let mut batch_paths: Vec<String> = Vec::new();
    let mut batch_chunks: Vec<Chunk> = Vec::new();
    let mut batch_file_chunk_counts: HashMap<String, usize> = HashMap::new();

    for group in sorted_targets.chunks(batch_files) {
      let jobs: Vec<ChunkJob> = group
      .iter()
      .filter_map(|path| {
        discovered.get(path).map(|file| ChunkJob {
          path: path.clone(),
          absolute_path: file.absolute_path.clone(),
          language: file.language,
        })
      })
      .collect();

      let chunker = self.chunker;
      let dedup = self.dedup.clone();
      let stats = self.context.stats.clone();
      let pool = Arc::clone(&self.chunk_pool);
      let outcomes = tokio::task::spawn_blocking(move || chunk_group_blocking(&pool, chunker, &dedup, &stats, jobs))
      .await
      .expect("chunking worker pool task does not panic");

      for (path, outcome) in outcomes {
        match outcome {
          Ok(chunks) => {
            batch_file_chunk_counts.insert(path.clone(), chunks.len());
            self.context.stats.chunking().chunks_emitted.fetch_add(chunks.len() as u64, Ordering::Relaxed);
            batch_chunks.extend(chunks);
            batch_paths.push(path);
          }
          Err(ChunkJobError::Read(err)) => {
            warn!(path = %path, error = %err, "failed to read file content for chunking");
            summary.files_failed += 1;
            summary.failures.push(FileFailure { relative_path: path, cause: err });
          }
          Err(ChunkJobError::Chunker(err)) => {
            warn!(path = %path, error = %err, "chunking failed; file skipped for this run");
            summary.files_failed += 1;
            summary.failures.push(FileFailure { relative_path: path, cause: err });
          }
        }
      }

      if batch_paths.len() >= batch_files || batch_chunks.len() >= batch_chunks_limit {
        self.flush_batch(&mut batch_paths, &mut batch_chunks, &mut batch_file_chunk_counts, discovered, summary).await;
      }
    }

    if !batch_paths.is_empty() {
      self.flush_batch(&mut batch_paths, &mut batch_chunks, &mut batch_file_chunk_counts, discovered, summary).await;
    }
  }

  /// Embeds, upserts, and records manifest entries for one accumulated batch. A batch is
  /// atomic at the vector-store level: an embedding or upsert failure
  /// fails every file still pending in the batch, never a partial subset.
  async fn flush_batch(
    &mut self,
    batch_paths: &mut Vec<String>,
    batch_chunks: &mut Vec<Chunk>,
    batch_file_chunk_counts: &mut HashMap<String, usize>,
    discovered: &HashMap<String, DiscoveredFile>,
    summary: &mut IndexRunSummary,
  ) {
    if batch_chunks.is_empty() {
      // Every chunk in this file set deduped away against content already indexed under a
      // different chunk_id; the files are still indexed, just with zero chunks of their own.
      for path in batch_paths.drain(..) {
        if let Some(file) = discovered.get(&path) {
          self.checkpoint().manifest_mut().set(
            path,
            ManifestEntry { content_hash: file.content_hash.clone(), indexed_at: Utc::now(), chunk_count: 0, language: file.language },
          );
        }
        summary.files_indexed += 1;
      }
      batch_file_chunk_counts.clear();
      return;
    }

    let texts: Vec<String> = batch_chunks.iter().map(|c| c.content.clone()).collect();
    let batch_id = Uuid::now_v7();

    let dense_vectors = match self.embed_dense(&texts).await {
      Ok(vectors) => vectors,
      Err(err) => {
        self.fail_batch(batch_paths, batch_chunks, batch_file_chunk_counts, summary, &err);
        return;
      }
    };

    let sparse_vectors = match self.embed_sparse(&texts).await {
      Ok(vectors) => vectors,
      Err(err) => {
        self.fail_batch(batch_paths, batch_chunks, batch_file_chunk_counts, summary, &err);
        return;
      }
    };

    self.context.stats.embedding().batches_issued.fetch_add(1, Ordering::Relaxed);
    self.context.stats.embedding().items_issued.fetch_add(texts.len() as u64, Ordering::Relaxed);
    self.context.stats.embedding().tokens_estimate.fetch_add(texts.iter().map(|t| estimate_tokens(t) as u64).sum(), Ordering::Relaxed);

    let dense_model = self.dense_provider.as_ref().map(|p| p.model_name().to_string()).unwrap_or_default();
    let sparse_model = self.sparse_provider.as_ref().map(|p| p.name().to_string()).unwrap_or_default();

    let mut points = Vec::with_capacity(batch_chunks.len());
    for (index, chunk) in batch_chunks.drain(..).enumerate() {
      let dense = dense_vectors.as_ref().map(|vs| vs[index].clone());
      if let Some(vector) = &dense {
        self.context.registry.set_dense(
          chunk.chunk_id,
          DenseEmbedding { batch_id, batch_index: index as u32, model_name: dense_model.clone(), vector: vector.clone() },
        );
      }
      let sparse = sparse_vectors.as_ref().map(|vs| vs[index].clone());
      if let Some(vector) = &sparse {
        self.context.registry.set_sparse(
          chunk.chunk_id,
          SparseEmbedding {
            batch_id,
            batch_index: index as u32,
            model_name: sparse_model.clone(),
            indices: vector.indices.clone(),
            values: vector.values.clone(),
          },
        );
      }

      let payload = json!({ "file_path": chunk.file_path, "chunk": chunk });
      points.push(UpsertPoint {
          id: chunk.chunk_id,
          vectors: PointVectors { dense, sparse: sparse.map(|v| SparseVectorData { indices: v.indices, values: v.values }) },
          payload,
        });
    }

    let batch_point_count = points.len();
    summary.chunks_emitted += batch_point_count;

    let store = self.failover.active_store();
    if let Err(err) = store
    .ensure_collection(&CollectionConfig {
        name: self.collection.clone(),
        dense_dimension: self.dense_provider.as_ref().map(|p| p.dimension()).unwrap_or(0),
        sparse_enabled: self.sparse_provider.is_some(),
      })
    .await
    {
      warn!(error = %err, "ensure_collection failed before upsert; attempting upsert anyway");
    }

    match store.upsert(&self.collection, points).await {
      Ok(()) => {
        self.context.stats.vector_store().upserts.fetch_add(1, Ordering::Relaxed);
        summary.chunks_upserted += batch_point_count;
        summary.files_indexed += batch_paths.len();
        for (path, chunk_count) in batch_file_chunk_counts.drain() {
          if let Some(file) = discovered.get(&path) {
            self.checkpoint().manifest_mut().set(
              path,
              ManifestEntry { content_hash: file.content_hash.clone(), indexed_at: Utc::now(), chunk_count, language: file.language },
            );
          }
        }
        batch_paths.clear();
      }
      Err(err) => {
        error!(error = %err, files = batch_paths.len(), "upsert failed for batch; batch files marked failed");
        for path in batch_paths.drain(..) {
          summary.files_failed += 1;
          summary.failures.push(FileFailure { relative_path: path, cause: err.to_string() });
        }
        batch_file_chunk_counts.clear();
      }
    }
  }

  fn fail_batch(
    &self,
    batch_paths: &mut Vec<String>,
    batch_chunks: &mut Vec<Chunk>,
    batch_file_chunk_counts: &mut HashMap<String, usize>,
    summary: &mut IndexRunSummary,
    cause: &str,
  ) {
    self.context.stats.embedding().failures.fetch_add(1, Ordering::Relaxed);
    for path in batch_paths.drain(..) {
      summary.files_failed += 1;
      summary.failures.push(FileFailure { relative_path: path, cause: cause.to_string() });
    }
    batch_chunks.clear();
    batch_file_chunk_counts.clear();
  }

  async fn embed_dense(&self, texts: &[String]) -> Result<Option<Vec<Vec<f32>>>, String> {
    let Some(provider) = &self.dense_provider else { return Ok(None) };
    provider.embed_documents(texts).await.map(Some).map_err(|err| {
        error!(error = %err, count = texts.len(), "dense embedding batch failed");
        err.to_string()
      })
  }

  async fn embed_sparse(&self, texts: &[String]) -> Result<Option<Vec<codeweaver_embedding::SparseVector>>, String> {
    let Some(provider) = &self.sparse_provider else { return Ok(None) };
    provider.embed_documents(texts).await.map(Some).map_err(|err| {
        error!(error = %err, count = texts.len(), "sparse embedding batch failed");
        err.to_string()
      })
  }

  /// : scroll the active vector store for points missing an embedding field a
  /// configured provider could supply, and re-embed just that field from `chunk.content`.
  async fn reconcile_missing_embeddings(&mut self, summary: &mut IndexRunSummary) {
    if self.dense_provider.is_none() && self.sparse_provider.is_none() {
      return;
    }

    let store = self.failover.active_store();
    let mut cursor = None;
    loop {
      let (page, next) = match store.scroll(&self.collection, cursor, RECONCILE_PAGE_SIZE).await {
        Ok(result) => result,
        Err(err) => {
          warn!(error = %err, "reconciliation scroll failed; skipping for this run");
          return;
        }
      };
      if page.is_empty() {
        break;
      }

      let mut rewrites = Vec::new();
      for point in &page {
        self.context.stats.reconciliation().scanned.fetch_add(1, Ordering::Relaxed);
        let missing_dense = self.dense_provider.is_some() && point.vectors.dense.is_none();
        let missing_sparse = self.sparse_provider.is_some() && point.vectors.sparse.is_none();
        if !missing_dense && !missing_sparse {
          continue;
        }
        let Some(chunk_value) = point.payload.get("chunk") else { continue };
        let Ok(chunk) = serde_json::from_value::<Chunk>(chunk_value.clone()) else { continue };

        let mut vectors = point.vectors.clone();
        if missing_dense && let Some(provider) = &self.dense_provider {
          match provider.embed_documents(std::slice::from_ref(&chunk.content)).await {
            Ok(mut vs) => vectors.dense = vs.pop(),
            Err(err) => {
              warn!(chunk_id = %point.id, error = %err, "reconciliation: dense re-embed failed");
              self.context.stats.reconciliation().unrecoverable.fetch_add(1, Ordering::Relaxed);
              continue;
            }
          }
        }
        if missing_sparse && let Some(provider) = &self.sparse_provider {
          match provider.embed_documents(std::slice::from_ref(&chunk.content)).await {
            Ok(mut vs) => vectors.sparse = vs.pop().map(|v| SparseVectorData { indices: v.indices, values: v.values }),
            Err(err) => {
              warn!(chunk_id = %point.id, error = %err, "reconciliation: sparse re-embed failed");
              self.context.stats.reconciliation().unrecoverable.fetch_add(1, Ordering::Relaxed);
              continue;
            }
          }
        }

        rewrites.push(UpsertPoint { id: point.id, vectors, payload: point.payload.clone() });
      }

      if !rewrites.is_empty() {
        let repaired = rewrites.len() as u64;
        match store.upsert(&self.collection, rewrites).await {
          Ok(()) => {
            self.context.stats.reconciliation().repaired.fetch_add(repaired, Ordering::Relaxed);
            summary.chunks_upserted += repaired as usize;
          }
          Err(err) => warn!(error = %err, "reconciliation: upsert of repaired points failed"),
        }
      }

      match next {
        Some(offset) => cursor = Some(offset),
        None => break,
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

  use async_trait::async_trait;
  use tempfile::TempDir;

  use codeweaver_core::Statistics;
  use codeweaver_core::config::{FailoverConfig, IndexerSettings};
  use codeweaver_embedding::{EmbeddingError, EmbeddingProvider};
  use codeweaver_failover::{FailoverManager, UnknownMemory};
  use codeweaver_vectorstore::{InMemoryBackupStore, VectorStore};

  use super::*;

  /// Deterministic, network-free dense provider: hashes each text's bytes into a short
  /// fixed-width vector so identical content always embeds identically, and counts calls so
  /// tests can assert dedup/idempotence actually skipped re-embedding.
  struct CountingDenseProvider {
    calls: AtomicUsize,
  }

  impl CountingDenseProvider {
    fn new() -> Self {
      Self { calls: AtomicUsize::new(0) }
    }

    fn calls(&self) -> usize {
      self.calls.load(AtomicOrdering::SeqCst)
    }

    fn vector_for(text: &str) -> Vec<f32> {
      let hash = blake3::hash(text.as_bytes());
      let bytes = hash.as_bytes();
      vec![bytes[0] as f32 / 255.0, bytes[1] as f32 / 255.0, bytes[2] as f32 / 255.0, bytes[3] as f32 / 255.0]
    }
  }

  #[async_trait]
  impl EmbeddingProvider for CountingDenseProvider {
    fn name(&self) -> &str {
      "counting"
    }
    fn model_name(&self) -> &str {
      "counting-test-model"
    }
    fn dimension(&self) -> usize {
      4
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
      self.calls.fetch_add(1, AtomicOrdering::SeqCst);
      Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
      Ok(Self::vector_for(text))
    }

    fn is_healthy(&self) -> bool {
      true
    }
  }

  struct Harness {
    _root: TempDir,
    _config: TempDir,
    root_path: PathBuf,
    provider: Arc<CountingDenseProvider>,
    indexer: Indexer,
  }

  impl Harness {
    async fn new() -> Self {
      let root = TempDir::new().unwrap();
      let config = TempDir::new().unwrap();
      let root_path = root.path().to_path_buf();

      let context = Context::new();
      let checkpoint = CheckpointManager::load(config.path()).unwrap();
      let manifest_counts = ManifestChunkCounts::from_manifest(checkpoint.manifest());

      let primary: Arc<dyn VectorStore> = Arc::new(InMemoryBackupStore::new());
      let backup = Arc::new(InMemoryBackupStore::new());
      let failover = Arc::new(FailoverManager::new(
        primary,
        backup,
        "codeweaver".to_string(),
        FailoverConfig::default(),
        Statistics::new(),
        Arc::new(manifest_counts.clone()),
        Arc::new(UnknownMemory),
        config.path().join("cache/vector_store.json"),
        true,
      ));

      let provider = Arc::new(CountingDenseProvider::new());
      let indexer = Indexer::new(
        root_path.clone(),
        IndexerSettings::default(),
        context,
        failover,
        checkpoint,
        manifest_counts,
        Some(provider.clone() as Arc<dyn EmbeddingProvider>),
        None,
      );

      Self { _root: root, _config: config, root_path, provider, indexer }
    }

    fn write_file(&self, relative: &str, content: &str) {
      let path = self.root_path.join(relative);
      if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
      }
      std::fs::write(path, content).unwrap();
    }

    fn remove_file(&self, relative: &str) {
      std::fs::remove_file(self.root_path.join(relative)).unwrap();
    }

    async fn collection_point_count(&self) -> usize {
      let store = self.indexer.failover.active_store();
      codeweaver_vectorstore::scroll_all(store.as_ref(), &self.indexer.collection, 100).await.unwrap().len()
    }
  }

  const FOO_PY: &str = "def foo(x):\n    return x + 1\n";

  // S1: empty project indexes to zero discovered files and an empty manifest.
  #[tokio::test]
  async fn empty_project_primes_to_zero() {
    let mut harness = Harness::new().await;
    let summary = harness.indexer.prime_index(false).await.unwrap();
    assert_eq!(summary.discovered_count, 0);
    assert_eq!(summary.files_indexed, 0);
    assert_eq!(summary.chunks_emitted, 0);
    assert!(harness.indexer.checkpoint().manifest().is_empty());
  }

  // S2: a single Python file with one function yields exactly one semantic chunk.
  #[tokio::test]
  async fn single_function_file_yields_one_chunk() {
    let mut harness = Harness::new().await;
    harness.write_file("src/a.py", FOO_PY);

    let summary = harness.indexer.prime_index(false).await.unwrap();
    assert_eq!(summary.discovered_count, 1);
    assert_eq!(summary.files_indexed, 1);
    assert_eq!(summary.chunks_emitted, 1);

    let entry = harness.indexer.checkpoint().manifest().get("src/a.py").unwrap();
    assert_eq!(entry.chunk_count, 1);
    assert_eq!(harness.collection_point_count().await, 1);
  }

  // Invariant 1: manifest chunk_count matches the live vector-store point count for the
  // file, immediately after prime_index.
  #[tokio::test]
  async fn manifest_chunk_count_matches_store_after_prime() {
    let mut harness = Harness::new().await;
    harness.write_file("src/a.py", FOO_PY);
    harness.write_file("src/b.py", "def bar(y):\n    return y * 2\n");
    harness.indexer.prime_index(false).await.unwrap();

    let total_manifest_chunks: usize = harness.indexer.checkpoint().manifest().paths().filter_map(|p| harness.indexer.checkpoint().manifest().get(p)).map(|e| e.chunk_count).sum();
    assert_eq!(total_manifest_chunks, harness.collection_point_count().await);
  }

  // prime_index(); prime_index() on an unchanged tree does zero embeddings/upserts the
  // second time and leaves the manifest byte-identical.
  #[tokio::test]
  async fn repeated_prime_is_idempotent() {
    let mut harness = Harness::new().await;
    harness.write_file("src/a.py", FOO_PY);

    harness.indexer.prime_index(false).await.unwrap();
    let calls_after_first = harness.provider.calls();
    let manifest_before = harness.indexer.checkpoint().manifest().get("src/a.py").cloned();

    let second = harness.indexer.prime_index(false).await.unwrap();
    assert_eq!(second.files_indexed, 0);
    assert_eq!(second.chunks_emitted, 0);
    assert_eq!(harness.provider.calls(), calls_after_first, "no new embedding calls on an unchanged tree");
    assert_eq!(harness.indexer.checkpoint().manifest().get("src/a.py").cloned(), manifest_before);
  }

  // delete_by_file is idempotent: removing an already-removed file returns 0 / no-ops.
  #[tokio::test]
  async fn remove_files_is_idempotent() {
    let mut harness = Harness::new().await;
    harness.write_file("src/a.py", FOO_PY);
    harness.indexer.prime_index(false).await.unwrap();

    let first = harness.indexer.remove_files(&["src/a.py".to_string()]).await.unwrap();
    assert_eq!(first, 1);
    assert_eq!(harness.collection_point_count().await, 0);

    let second = harness.indexer.remove_files(&["src/a.py".to_string()]).await.unwrap();
    assert_eq!(second, 0);
  }

  // S3: renaming a file with identical content rehomes its chunks without re-embedding.
  #[tokio::test]
  async fn rename_with_identical_content_skips_reembedding() {
    let mut harness = Harness::new().await;
    harness.write_file("src/a.py", FOO_PY);
    harness.indexer.prime_index(false).await.unwrap();
    let calls_after_first = harness.provider.calls();

    harness.remove_file("src/a.py");
    harness.write_file("src/b.py", FOO_PY);
    harness.indexer.prime_index(false).await.unwrap();

    assert_eq!(harness.provider.calls(), calls_after_first, "rename must not re-request embeddings");
    assert!(harness.indexer.checkpoint().manifest().get("src/a.py").is_none());
    let entry = harness.indexer.checkpoint().manifest().get("src/b.py").unwrap();
    assert_eq!(entry.chunk_count, 1);
    assert_eq!(harness.collection_point_count().await, 1);

    let store = harness.indexer.failover.active_store();
    let (points, _) = store.scroll(&harness.indexer.collection, None, 10).await.unwrap();
    assert_eq!(points[0].payload["file_path"], serde_json::json!("src/b.py"));
  }

  // A file whose content changes is CHANGED, not a rename, even though renames are detected
  // by content-hash collision against stale paths.
  #[tokio::test]
  async fn content_change_is_not_mistaken_for_rename() {
    let mut harness = Harness::new().await;
    harness.write_file("src/a.py", FOO_PY);
    harness.indexer.prime_index(false).await.unwrap();
    let calls_after_first = harness.provider.calls();

    harness.write_file("src/a.py", "def foo(x):\n    return x + 2\n");
    harness.indexer.prime_index(false).await.unwrap();

    assert!(harness.provider.calls() > calls_after_first, "changed content must re-embed");
    assert_eq!(harness.collection_point_count().await, 1);
  }

  // force_reindex invalidates dedup and re-embeds even unchanged content.
  #[tokio::test]
  async fn force_reindex_rebuilds_everything() {
    let mut harness = Harness::new().await;
    harness.write_file("src/a.py", FOO_PY);
    harness.indexer.prime_index(false).await.unwrap();
    let calls_after_first = harness.provider.calls();

    let summary = harness.indexer.prime_index(true).await.unwrap();
    assert_eq!(summary.files_indexed, 1);
    assert!(harness.provider.calls() > calls_after_first, "force_reindex must bypass dedup");
  }

  // A stale manifest entry whose file vanished from disk (no rename partner) is deleted and
  // dropped from the manifest.
  #[tokio::test]
  async fn stale_file_removed_when_deleted_outright() {
    let mut harness = Harness::new().await;
    harness.write_file("src/a.py", FOO_PY);
    harness.indexer.prime_index(false).await.unwrap();

    harness.remove_file("src/a.py");
    let summary = harness.indexer.prime_index(false).await.unwrap();
    assert_eq!(summary.discovered_count, 0);
    assert!(harness.indexer.checkpoint().manifest().is_empty());
    assert_eq!(harness.collection_point_count().await, 0);
  }

  // S6 (reconciliation): a point missing its dense field gets repaired on the next prime,
  // without re-chunking or touching points that are already complete.
  #[tokio::test]
  async fn reconciliation_repairs_points_missing_dense_embedding() {
    let mut harness = Harness::new().await;
    harness.write_file("src/a.py", FOO_PY);
    harness.indexer.prime_index(false).await.unwrap();

    // Simulate a point that was written before a dense provider existed (e.g. restored from
    // a backup taken while dense embedding was failing): strip its dense vector in place.
    let store = harness.indexer.failover.active_store();
    let (points, _) = store.scroll(&harness.indexer.collection, None, 10).await.unwrap();
    assert_eq!(points.len(), 1);
    let mut stripped = points[0].clone();
    stripped.vectors.dense = None;
    store
    .upsert(
      &harness.indexer.collection,
      vec![codeweaver_vectorstore::UpsertPoint { id: stripped.id, vectors: stripped.vectors, payload: stripped.payload }],
    )
    .await
    .unwrap();

    let summary = harness.indexer.add_missing_embeddings_to_existing_chunks().await;
    assert_eq!(summary.chunks_upserted, 1);

    let (repaired, _) = store.scroll(&harness.indexer.collection, None, 10).await.unwrap();
    assert!(repaired[0].vectors.dense.is_some());
  }

  // reindex_files targets exactly the given paths and leaves everything else untouched.
  #[tokio::test]
  async fn reindex_files_targets_only_named_paths() {
    let mut harness = Harness::new().await;
    harness.write_file("src/a.py", FOO_PY);
    harness.write_file("src/b.py", "def bar(y):\n    return y * 2\n");
    harness.indexer.prime_index(false).await.unwrap();

    harness.write_file("src/a.py", "def foo(x):\n    return x + 100\n");
    let count = harness.indexer.reindex_files(&["src/a.py".to_string()]).await.unwrap();
    assert_eq!(count, 1);
    assert_eq!(harness.collection_point_count().await, 2);
  }

  // A watcher-style Deleted event routed through reindex_files (path no longer exists) is
  // treated as a removal rather than an error.
  #[tokio::test]
  async fn reindex_files_treats_vanished_path_as_removal() {
    let mut harness = Harness::new().await;
    harness.write_file("src/a.py", FOO_PY);
    harness.indexer.prime_index(false).await.unwrap();

    harness.remove_file("src/a.py");
    let count = harness.indexer.reindex_files(&["src/a.py".to_string()]).await.unwrap();
    assert_eq!(count, 0);
    assert!(harness.indexer.checkpoint().manifest().get("src/a.py").is_none());
    assert_eq!(harness.collection_point_count().await, 0);
  }

  // prime_with_checkpoint forces a full reindex on first run (no prior fingerprint) and
  // persists a fingerprint that then keeps the second run incremental.
  #[tokio::test]
  async fn prime_with_checkpoint_forces_full_reindex_without_prior_fingerprint() {
    let mut harness = Harness::new().await;
    harness.write_file("src/a.py", FOO_PY);

    let providers = vec![];
    let summary = harness.indexer.prime_with_checkpoint(&providers).await.unwrap();
    assert_eq!(summary.files_indexed, 1);
    let calls_after_first = harness.provider.calls();

    let second = harness.indexer.prime_with_checkpoint(&providers).await.unwrap();
    assert_eq!(second.files_indexed, 0);
    assert_eq!(harness.provider.calls(), calls_after_first);
  }
}
