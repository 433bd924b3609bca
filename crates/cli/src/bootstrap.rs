//! Wires the independently-testable crates (`codeweaver-embedding`, `codeweaver-vectorstore`,
//! `codeweaver-failover`, `codeweaver-indexer`, `codeweaver-query`) into one running process.
//! This is the one place in the workspace that is allowed to know about all of them at once;
//! every other crate only depends on the pieces it actually needs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use codeweaver_core::Context;
use codeweaver_core::config::{EmbeddingProviderKind, IndexerSettings};
use codeweaver_embedding::{EmbeddingProvider, HashingSparseProvider, OllamaProvider, OpenRouterProvider, SparseEmbeddingProvider};
use codeweaver_failover::{FailoverManager, UnknownMemory};
use codeweaver_indexer::{CheckpointManager, Indexer, ManifestChunkCounts};
use codeweaver_query::QueryPipeline;
use codeweaver_vectorstore::{CollectionConfig, InMemoryBackupStore, QdrantStore, VectorStore};

pub struct Services {
  pub context: Context,
  pub failover: Arc<FailoverManager>,
  pub settings: IndexerSettings,
}

/// Resolves the dense embedding provider the demonstration binary actually ships with. The
/// full provider matrix is a configuration surface for a deployment to plug into;
/// this binary only carries the two HTTP-backed providers already implemented
/// (`OllamaProvider`, `OpenRouterProvider`) and otherwise runs dense-less (sparse + keyword
/// fallback still work per strategy table).
fn build_dense_provider(settings: &IndexerSettings) -> Option<Arc<dyn EmbeddingProvider>> {
  match settings.embedding.dense_provider {
    EmbeddingProviderKind::OpenAi | EmbeddingProviderKind::OpenAiCompatible => {
      let api_key = std::env::var("OPENROUTER_API_KEY").ok()?;
      let mut provider = OpenRouterProvider::new(api_key);
      if let Some(base_url) = &settings.embedding.base_url {
        provider = provider.with_base_url(base_url.clone());
      }
      provider = provider.with_model(settings.embedding.dense_model.clone(), settings.embedding.dense_dimension);
      Some(Arc::new(provider))
    }
    EmbeddingProviderKind::FastEmbed | EmbeddingProviderKind::SentenceTransformers => {
      Some(Arc::new(OllamaProvider::new()))
    }
    _ => None,
  }
}

fn build_sparse_provider(settings: &IndexerSettings) -> Option<Arc<dyn SparseEmbeddingProvider>> {
  if settings.embedding.sparse_enabled {
    Some(Arc::new(HashingSparseProvider::default()))
  } else {
    None
  }
}

/// Connects to Qdrant; falls back to an in-memory primary (still failover-managed, so the
/// backup-activation machinery is exercised identically) when the connection can't be
/// established, matching "no reachable primary at startup" boot path.
fn build_primary_store(settings: &IndexerSettings, stats: codeweaver_core::Statistics) -> (Arc<dyn VectorStore>, bool) {
  match QdrantStore::connect(
    &settings.vector_store.url,
    settings.vector_store.api_key.clone(),
    settings.vector_store.breaker_failure_threshold,
    settings.vector_store.breaker_cooldown_secs,
    stats,
  ) {
    Ok(store) => (Arc::new(store), true),
    Err(err) => {
      tracing::warn!(error = %err, "could not reach the primary vector store; starting on the backup");
      (Arc::new(InMemoryBackupStore::new()), false)
    }
  }
}

/// Assembles everything a command needs: loads project settings, brings up the failover
/// manager over whichever store is reachable, opens the on-disk checkpoint, and builds the
/// `Indexer`. Returns the pieces individually rather than one god-struct since `Indexer` and
/// `QueryPipeline` are used independently by different subcommands.
pub async fn bootstrap(project_root: &Path) -> anyhow::Result<(Indexer, QueryPipeline, Services)> {
  let settings = IndexerSettings::load_for_project(project_root);
  let context = Context::new();

  let (primary, primary_initialized) = build_primary_store(&settings, context.stats.clone());
  let backup = Arc::new(InMemoryBackupStore::new());
  primary
  .ensure_collection(&CollectionConfig {
      name: settings.vector_store.collection_name.clone(),
      dense_dimension: settings.embedding.dense_dimension,
      sparse_enabled: settings.embedding.sparse_enabled,
    })
  .await
  .ok();

  let config_dir = project_root.join(".codeweaver");
  std::fs::create_dir_all(&config_dir)?;
  let checkpoint = CheckpointManager::load(&config_dir)?;
  let manifest_counts = ManifestChunkCounts::from_manifest(checkpoint.manifest());

  let backup_file_path = settings
  .failover
  .backup_file_path
  .clone()
  .unwrap_or_else(|| config_dir.join("backup.json"));

  let failover = Arc::new(FailoverManager::new(
      primary,
      backup,
      settings.vector_store.collection_name.clone(),
      settings.failover.clone(),
      context.stats.clone(),
      Arc::new(manifest_counts.clone()),
      Arc::new(UnknownMemory),
      backup_file_path,
      primary_initialized,
    ));

  let dense = build_dense_provider(&settings);
  let sparse = build_sparse_provider(&settings);

  let indexer = Indexer::new(
    project_root.to_path_buf(),
    settings.clone(),
    context.clone(),
    failover.clone(),
    checkpoint,
    manifest_counts,
    dense.clone(),
    sparse.clone(),
  );

  let query_pipeline = QueryPipeline::new(
    dense,
    sparse,
    failover.clone(),
    settings.vector_store.collection_name.clone(),
    settings.query.clone(),
    context.clone(),
    None,
  );

  Ok((indexer, query_pipeline, Services { context, failover, settings }))
}

pub fn default_project_root() -> PathBuf {
  std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
