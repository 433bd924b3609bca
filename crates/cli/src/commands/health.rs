use crate::bootstrap;

pub async fn run(project_root: std::path::PathBuf, json: bool) -> anyhow::Result<()> {
  let (_indexer, pipeline, services) = bootstrap::bootstrap(&project_root).await?;
  let snapshot = pipeline.health_snapshot();
  let failover_state = services.failover.state();

  if json {
    println!(
      "{}",
      serde_json::json!({
        "health": snapshot,
        "failover": failover_state,
      })
    );
    return Ok(());
  }

  println!("status: {:?}", snapshot.status);
  println!("  vector_store:    {}", snapshot.services.vector_store);
  println!("  embedding:       {}", snapshot.services.embedding);
  println!("  sparse_embedding:{}", snapshot.services.sparse_embedding);
  println!("  reranker:        {}", snapshot.services.reranker);
  println!();
  println!("active store: {:?}", failover_state.active);
  if let Some(reason) = &failover_state.reason {
    println!("reason: {reason}");
  }
  Ok(())
}
