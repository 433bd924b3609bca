use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::bootstrap;

pub async fn run(project_root: std::path::PathBuf) -> anyhow::Result<()> {
  let (mut indexer, _query, services) = bootstrap::bootstrap(&project_root).await?;
  indexer.prime_with_checkpoint(&[]).await?;

  let debounce_ms = services.settings.watcher.debounce_ms;
  let poll_interval_seconds = services.settings.watcher.poll_interval_seconds;
  let root = indexer.project_root().to_path_buf();
  let indexer = Arc::new(Mutex::new(indexer));
  let cancel = CancellationToken::new();

  let watch_cancel = cancel.clone();
  let watch_handle = tokio::spawn(codeweaver_indexer::run_watch_loop(indexer, root, debounce_ms, poll_interval_seconds, watch_cancel));

  let monitor_handle = tokio::spawn(services.failover.clone().run_monitor_loop(cancel.clone()));
  let sync_handle = tokio::spawn(services.failover.clone().run_sync_loop(cancel.clone()));

  tokio::signal::ctrl_c().await?;
  println!("stopping watcher...");
  cancel.cancel();
  watch_handle.await?;
  monitor_handle.await?;
  sync_handle.await?;
  Ok(())
}
