use std::path::PathBuf;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use codeweaver_core::config::FailoverConfig;
use codeweaver_core::Statistics;
use codeweaver_vectorstore::{BreakerState, CollectionConfig, InMemoryBackupStore, VectorStore, VectorStoreError, load_backup, restore_backup, save_backup, scroll_all};

use crate::error::FailoverError;
use crate::memory_safety::{check_activation, estimate_chunk_count_from_files};
use crate::state::{ActiveStore, FailoverState};

const MONITOR_INTERVAL: Duration = Duration::from_secs(5);
const SCROLL_PAGE_SIZE: usize = 100;

/// Lets the failover manager ask "about how many chunks does the index hold" without
/// depending on `codeweaver-indexer` (which in turn depends on this crate). `codeweaver-indexer`
/// implements this over its `IndexFileManifest`.
pub trait ChunkCountSource: Send + Sync {
  fn total_chunk_count(&self) -> Option<u64>;
  fn total_file_count(&self) -> u64;
}

/// Reads total system memory, if determinable, for the yellow-zone check. Split out as a
/// trait so tests can inject a fixed value instead of depending on a real sysinfo probe.
pub trait AvailableMemorySource: Send + Sync {
  fn available_bytes(&self) -> Option<u64>;
}

/// No-op default: "unknown available RAM" makes the yellow zone always pass, matching the
/// conservative-but-permissive posture describes for a zone that isn't outright refused.
pub struct UnknownMemory;
impl AvailableMemorySource for UnknownMemory {
  fn available_bytes(&self) -> Option<u64> {
    None
  }
}

/// Watches the primary `VectorStore`'s circuit breaker and drives `PRIMARY_ACTIVE` <->
/// `BACKUP_ACTIVE` transitions, runs the periodic backup-file sync, and
/// exposes whichever store is currently active to callers (`Indexer`, `QueryPipeline`) via
/// [`Self::active_store()`].
pub struct FailoverManager {
  primary: Arc<dyn VectorStore>,
  backup: Arc<InMemoryBackupStore>,
  collection: String,
  config: FailoverConfig,
  stats: Statistics,
  chunk_counts: Arc<dyn ChunkCountSource>,
  memory: Arc<dyn AvailableMemorySource>,
  state: RwLock<FailoverState>,
  closed_since: RwLock<Option<Instant>>,
  backup_file_path: PathBuf,
}

impl FailoverManager {
  pub fn new(
    primary: Arc<dyn VectorStore>,
    backup: Arc<InMemoryBackupStore>,
    collection: String,
    config: FailoverConfig,
    stats: Statistics,
    chunk_counts: Arc<dyn ChunkCountSource>,
    memory: Arc<dyn AvailableMemorySource>,
    backup_file_path: PathBuf,
    primary_initialized: bool,
  ) -> Self {
    Self {
      primary,
      backup,
      collection,
      config,
      stats,
      chunk_counts,
      memory,
      state: RwLock::new(FailoverState::initial(primary_initialized)),
      closed_since: RwLock::new(if primary_initialized { Some(Instant::now()) } else { None }),
      backup_file_path,
    }
  }

  pub fn state(&self) -> FailoverState {
    self.state.read().unwrap().clone()
  }

  /// The store callers should issue reads/writes against right now.
  pub fn active_store(&self) -> Arc<dyn VectorStore> {
    match self.state.read().unwrap().active {
      ActiveStore::Primary => self.primary.clone(),
      ActiveStore::Backup => self.backup.clone() as Arc<dyn VectorStore>,
    }
  }

  /// One iteration of the monitor loop's decision logic, callable directly
  /// by tests without spinning up a background task.
  pub async fn evaluate(&self) {
    let breaker = self.primary.breaker_state();
    let now = Utc::now();
    {
      let mut state = self.state.write().unwrap();
      state.last_health_check = Some(now);
    }

    match breaker {
      BreakerState::Closed => {
        let became_closed_just_now = self.closed_since.read().unwrap().is_none();
        if became_closed_just_now {
          *self.closed_since.write().unwrap() = Some(Instant::now());
        }
        self.maybe_restore().await;
      }
      BreakerState::Open | BreakerState::HalfOpen => {
        *self.closed_since.write().unwrap() = None;
        self.maybe_activate_backup().await;
      }
    }
  }

  async fn maybe_activate_backup(&self) {
    let already_backup = self.state.read().unwrap().active == ActiveStore::Backup;
    if already_backup {
      return;
    }

    let chunk_count = self
    .chunk_counts
    .total_chunk_count()
    .unwrap_or_else(|| estimate_chunk_count_from_files(self.chunk_counts.total_file_count()));

    if let Err(reason) = check_activation(chunk_count, self.memory.available_bytes(), self.config.max_memory_mb) {
      error!(
        reason = %reason,
        "refusing to activate in-memory backup store; continuing without vector search \
        (suggestions: free memory, point at a remote vector store, shrink the index, or set max_memory_mb)"
      );
      let mut state = self.state.write().unwrap();
      state.reason = Some(format!("backup_refused_memory: {reason}"));
      return;
    }

    match self.restore_backup_file_if_present().await {
      Ok(()) => {}
      Err(err) => {
        warn!(error = %err, "no valid backup file on disk; activating with an empty backup store");
      }
    }

    warn!("primary vector store circuit breaker open; activating in-memory backup store");
    let mut state = self.state.write().unwrap();
    state.active = ActiveStore::Backup;
    state.reason = Some("primary circuit breaker open".to_string());
    drop(state);
    self.stats.failover().activations.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
  }

  async fn maybe_restore(&self) {
    let already_primary = self.state.read().unwrap().active == ActiveStore::Primary;
    if already_primary {
      return;
    }

    let closed_long_enough = self
    .closed_since
    .read()
    .unwrap()
    .is_some_and(|since| since.elapsed() >= Duration::from_secs(self.config.restore_delay_secs));
    if !closed_long_enough {
      return;
    }

    if !self.probe_primary_health().await {
      return;
    }

    info!("primary vector store healthy for restore_delay; restoring primary as active store");
    let mut state = self.state.write().unwrap();
    state.active = ActiveStore::Primary;
    state.reason = None;
    drop(state);
    self.stats.failover().restorations.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
  }

  async fn probe_primary_health(&self) -> bool {
    self.primary.list_collections().await.is_ok()
  }

  async fn restore_backup_file_if_present(&self) -> Result<(), FailoverError> {
    let file = load_backup(&self.backup_file_path).await?;
    restore_backup(&file, &self.backup).await?;
    let mut state = self.state.write().unwrap();
    state.backup_file_present = true;
    Ok(())
  }

  /// Runs [`Self::evaluate`] every 5 seconds until `cancel` fires. Survives any single
  /// evaluation panicking logically into an `Err` path by logging and continuing, per
  /// "the loop must survive exceptions".
  pub async fn run_monitor_loop(self: Arc<Self>, cancel: CancellationToken) {
    let mut ticker = interval(MONITOR_INTERVAL);
    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!("failover monitor loop shutting down");
          return;
        }
        _ = ticker.tick() => {
          self.evaluate().await;
        }
      }
    }
  }

  /// One sync cycle: only runs when `PRIMARY_ACTIVE` and the primary breaker is
  /// closed. Scrolls every collection in pages of 100, writes the whole backup file
  /// atomically, and records the outcome in Statistics. A failure here is logged and does not
  /// cancel future cycles — the caller's loop keeps ticking regardless of this call's result.
  pub async fn sync_once(&self) -> Result<(), FailoverError> {
    let is_primary_active = self.state.read().unwrap().active == ActiveStore::Primary;
    if !is_primary_active || self.primary.breaker_state() != BreakerState::Closed {
      return Ok(());
    }

    let points = scroll_all(self.primary.as_ref(), &self.collection, SCROLL_PAGE_SIZE).await?;
    let dense_dim = points.iter().find_map(|p| p.vectors.dense.as_ref().map(|v| v.len())).unwrap_or(0);
    let sparse_enabled = points.iter().any(|p| p.vectors.sparse.is_some());

    let snapshot_store = InMemoryBackupStore::new();
    snapshot_store
    .ensure_collection(&CollectionConfig { name: self.collection.clone(), dense_dimension: dense_dim, sparse_enabled })
    .await?;
    snapshot_store
    .upsert(
      &self.collection,
      points
      .into_iter()
      .map(|p| codeweaver_vectorstore::UpsertPoint { id: p.id, vectors: p.vectors, payload: p.payload })
      .collect(),
    )
    .await?;

    save_backup(&snapshot_store, &self.backup_file_path, Utc::now().timestamp_millis() as u64).await?;

    let bytes = tokio::fs::metadata(&self.backup_file_path).await.map(|m| m.len()).unwrap_or(0);
    let mut state = self.state.write().unwrap();
    state.last_backup_sync = Some(Utc::now());
    state.backup_file_present = true;
    state.backup_file_bytes = bytes;
    Ok(())
  }

  /// Periodic sync loop; `interval_secs` is clamped to the spec's 30 s floor.
  pub async fn run_sync_loop(self: Arc<Self>, cancel: CancellationToken) {
    let interval_secs = self.config.backup_sync_interval_secs.max(30);
    let mut ticker = interval(Duration::from_secs(interval_secs));
    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!("failover backup sync loop shutting down");
          return;
        }
        _ = ticker.tick() => {
          match self.sync_once().await {
            Ok(()) => {
              self.stats.failover().sync_successes.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            Err(err) => {
              warn!(error = %err, "backup sync cycle failed; will retry next cycle");
              self.stats.failover().sync_failures.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
          }
        }
      }
    }
  }

  /// Persist one final backup if currently `BACKUP_ACTIVE`, per graceful-shutdown
  /// sequence. A no-op when the primary is active, since the primary already holds the
  /// authoritative state.
  pub async fn shutdown_sync(&self) -> Result<(), VectorStoreError> {
    if self.state.read().unwrap().active != ActiveStore::Backup {
      return Ok(());
    }
    save_backup(&self.backup, &self.backup_file_path, Utc::now().timestamp_millis() as u64).await
  }
}
