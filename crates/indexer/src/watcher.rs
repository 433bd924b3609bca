//! Debounced file-system watch loop: a thin `notify` wrapper plus an async driver
//! that coalesces bursts of events into one `reindex_files`/`remove_files` call per file,
//! falling back to a periodic rescan when no native event source is available.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, channel};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use codeweaver_core::normalize_relative_path;

use crate::indexer::Indexer;

#[derive(Debug, Error)]
pub enum WatchError {
  #[error("file watcher setup failed: {0}")]
  Notify(#[from] notify::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeKind {
  Upsert,
  Remove,
}

struct FileChange {
  path: PathBuf,
  kind: ChangeKind,
}

/// Wraps a `notify::RecommendedWatcher` with a std channel, same shape as the chunker's
/// synchronous consumer pattern; bridged onto the async runtime via `spawn_blocking` in
/// [`run_watch_loop`] rather than being made async itself, since `notify`'s callback runs on
/// its own OS thread regardless.
struct RawWatcher {
  _watcher: RecommendedWatcher,
  receiver: Receiver<Result<Event, notify::Error>>,
}

impl RawWatcher {
  fn new(root: &Path, poll_interval: Duration) -> Result<Self, WatchError> {
    let (tx, rx) = channel();
    let config = Config::default().with_poll_interval(poll_interval);
    let mut watcher = RecommendedWatcher::new(
      move |res| {
        let _ = tx.send(res);
      },
      config,
    )?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok(Self { _watcher: watcher, receiver: rx })
  }

  fn recv_timeout(&self, timeout: Duration) -> Option<FileChange> {
    match self.receiver.recv_timeout(timeout) {
      Ok(Ok(event)) => Self::classify(event),
      Ok(Err(err)) => {
        warn!(error = %err, "watch backend reported an error");
        None
      }
      Err(RecvTimeoutError::Timeout) => None,
      Err(RecvTimeoutError::Disconnected) => None,
    }
  }

  fn classify(event: Event) -> Option<FileChange> {
    let path = event.paths.first()?.clone();
    let kind = match event.kind {
      EventKind::Create(_) | EventKind::Modify(_) => ChangeKind::Upsert,
      EventKind::Remove(_) => ChangeKind::Remove,
      EventKind::Access(_) | EventKind::Any | EventKind::Other => return None,
    };
    Some(FileChange { path, kind })
  }
}

/// Drives the watch loop for `root` until `cancel` fires. Debounces within a
/// `debounce_ms`-wide quiet window before routing to the indexer, and
/// falls back to a `poll_interval_seconds` rescan loop if the native watcher can't be set up
/// at all (e.g. inotify instance limits exhausted).
pub async fn run_watch_loop(indexer: Arc<Mutex<Indexer>>, root: PathBuf, debounce_ms: u64, poll_interval_seconds: u64, cancel: CancellationToken) {
  let poll_interval = Duration::from_secs(poll_interval_seconds.max(1));
  let watcher = match RawWatcher::new(&root, poll_interval) {
    Ok(watcher) => watcher,
    Err(err) => {
      warn!(error = %err, "native file watcher unavailable; degrading to periodic full rescans");
      run_polling_fallback(indexer, poll_interval, cancel).await;
      return;
    }
  };

  let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
  let blocking_cancel = cancel.clone();
  let pump = tokio::task::spawn_blocking(move || {
      while !blocking_cancel.is_cancelled() {
        if let Some(change) = watcher.recv_timeout(Duration::from_millis(200)) && event_tx.send(change).is_err() {
          break;
        }
      }
    });

  let debounce = Duration::from_millis(debounce_ms.max(1));
  let mut pending: HashMap<PathBuf, ChangeKind> = HashMap::new();
  let mut deadline: Option<Instant> = None;

  loop {
    let sleep = match deadline {
      Some(at) => tokio::time::sleep_until(at),
      None => tokio::time::sleep(Duration::from_secs(poll_interval_seconds.max(1))),
    };
    tokio::pin!(sleep);

    tokio::select! {
      _ = cancel.cancelled() => break,
      maybe_change = event_rx.recv() => {
        match maybe_change {
          Some(change) => {
            pending.insert(change.path, change.kind);
            deadline = Some(Instant::now() + debounce);
          }
          None => break,
        }
      }
      _ = &mut sleep, if deadline.is_some() => {
        flush_pending(&indexer, &root, std::mem::take(&mut pending)).await;
        deadline = None;
      }
    }
  }

  if !pending.is_empty() {
    flush_pending(&indexer, &root, pending).await;
  }
  pump.abort();
}

async fn flush_pending(indexer: &Arc<Mutex<Indexer>>, root: &Path, pending: HashMap<PathBuf, ChangeKind>) {
  let mut to_remove = Vec::new();
  let mut to_upsert = Vec::new();
  for (path, kind) in pending {
    let Some(relative) = normalize_relative_path(root, &path) else {
      warn!(path = %path.display(), "watch event path failed normalization; dropping");
      continue;
    };
    match kind {
      ChangeKind::Remove if !path.exists() => to_remove.push(relative),
      ChangeKind::Remove => to_upsert.push(relative),
      ChangeKind::Upsert => to_upsert.push(relative),
    }
  }

  if to_remove.is_empty() && to_upsert.is_empty() {
    return;
  }

  let mut guard = indexer.lock().await;
  if !to_remove.is_empty() {
    match guard.remove_files(&to_remove).await {
      Ok(count) => debug!(count, "watch loop removed files"),
      Err(err) => warn!(error = %err, "watch loop: remove_files failed"),
    }
  }
  if !to_upsert.is_empty() {
    match guard.reindex_files(&to_upsert).await {
      Ok(count) => debug!(count, "watch loop reindexed files"),
      Err(err) => warn!(error = %err, "watch loop: reindex_files failed"),
    }
  }
}

async fn run_polling_fallback(indexer: Arc<Mutex<Indexer>>, poll_interval: Duration, cancel: CancellationToken) {
  loop {
    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = tokio::time::sleep(poll_interval) => {
        info!("periodic rescan (no native watcher available)");
        if let Err(err) = indexer.lock().await.prime_index(false).await {
          warn!(error = %err, "periodic rescan failed");
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use async_trait::async_trait;
  use tempfile::TempDir;

  use codeweaver_core::Context;
  use codeweaver_core::config::{FailoverConfig, IndexerSettings};
  use codeweaver_embedding::{EmbeddingError, EmbeddingProvider};
  use codeweaver_failover::{FailoverManager, UnknownMemory};
  use codeweaver_vectorstore::{InMemoryBackupStore, VectorStore};

  use super::*;
  use crate::checkpoint::CheckpointManager;
  use crate::indexer::ManifestChunkCounts;

  struct StubProvider;

  #[async_trait]
  impl EmbeddingProvider for StubProvider {
    fn name(&self) -> &str {
      "stub"
    }
    fn model_name(&self) -> &str {
      "stub-model"
    }
    fn dimension(&self) -> usize {
      4
    }
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
      Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
    }
    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
      Ok(vec![0.0; 4])
    }
    fn is_healthy(&self) -> bool {
      true
    }
  }

  async fn build_indexer(root: &Path, config_dir: &Path) -> Indexer {
    let checkpoint = CheckpointManager::load(config_dir).unwrap();
    let manifest_counts = ManifestChunkCounts::from_manifest(checkpoint.manifest());
    let primary: Arc<dyn VectorStore> = Arc::new(InMemoryBackupStore::new());
    let backup = Arc::new(InMemoryBackupStore::new());
    let failover = Arc::new(FailoverManager::new(
      primary,
      backup,
      "codeweaver".to_string(),
      FailoverConfig::default(),
      codeweaver_core::Statistics::new(),
      Arc::new(manifest_counts.clone()),
      Arc::new(UnknownMemory),
      config_dir.join("cache/vector_store.json"),
      true,
    ));
    Indexer::new(root, IndexerSettings::default(), Context::new(), failover, checkpoint, manifest_counts, Some(Arc::new(StubProvider)), None)
  }

  #[tokio::test]
  async fn flush_pending_indexes_a_created_file() {
    let root = TempDir::new().unwrap();
    let config = TempDir::new().unwrap();
    std::fs::write(root.path().join("a.py"), "def foo(x):\n    return x + 1\n").unwrap();

    let indexer = Arc::new(Mutex::new(build_indexer(root.path(), config.path()).await));
    let mut pending = HashMap::new();
    pending.insert(root.path().join("a.py"), ChangeKind::Upsert);
    flush_pending(&indexer, root.path(), pending).await;

    let guard = indexer.lock().await;
    assert!(guard.checkpoint().manifest().has_file("a.py"));
  }

  #[tokio::test]
  async fn flush_pending_removes_a_vanished_file() {
    let root = TempDir::new().unwrap();
    let config = TempDir::new().unwrap();
    std::fs::write(root.path().join("a.py"), "def foo(x):\n    return x + 1\n").unwrap();

    let indexer = Arc::new(Mutex::new(build_indexer(root.path(), config.path()).await));
    indexer.lock().await.prime_index(false).await.unwrap();

    std::fs::remove_file(root.path().join("a.py")).unwrap();
    let mut pending = HashMap::new();
    pending.insert(root.path().join("a.py"), ChangeKind::Remove);
    flush_pending(&indexer, root.path(), pending).await;

    let guard = indexer.lock().await;
    assert!(!guard.checkpoint().manifest().has_file("a.py"));
  }

  #[tokio::test]
  async fn flush_pending_ignores_empty_batch() {
    let root = TempDir::new().unwrap();
    let config = TempDir::new().unwrap();
    let indexer = Arc::new(Mutex::new(build_indexer(root.path(), config.path()).await));
    flush_pending(&indexer, root.path(), HashMap::new()).await;
    let guard = indexer.lock().await;
    assert!(guard.checkpoint().manifest().is_empty());
  }
}
