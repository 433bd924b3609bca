use crate::bootstrap;

pub async fn run(project_root: std::path::PathBuf, force: bool) -> anyhow::Result<()> {
  let (mut indexer, _query, _services) = bootstrap::bootstrap(&project_root).await?;

  let summary = if force {
    indexer.prime_index(true).await?
  } else {
    // Empty provider list: this demonstration binary doesn't fingerprint its own embedding
    // choice, so a settings change alone (not a provider swap) drives the forced-reindex path.
    indexer.prime_with_checkpoint(&[]).await?
  };

  println!("status: {}", summary.status());
  println!("files discovered: {}", summary.discovered_count);
  println!("files indexed:    {}", summary.files_indexed);
  println!("files failed:     {}", summary.files_failed);
  println!("chunks emitted:   {}", summary.chunks_emitted);
  println!("chunks upserted:  {}", summary.chunks_upserted);
  for failure in &summary.failures {
    println!("  ! {}: {}", failure.relative_path, failure.cause);
  }

  Ok(())
}
