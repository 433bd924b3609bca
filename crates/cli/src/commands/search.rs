use codeweaver_query::FindCodeRequest;

use crate::bootstrap;

pub async fn run(project_root: std::path::PathBuf, query: String, focus_language: Vec<String>, token_limit: Option<usize>, json: bool) -> anyhow::Result<()> {
  let (_indexer, pipeline, _services) = bootstrap::bootstrap(&project_root).await?;

  let mut request = FindCodeRequest::new(query);
  if !focus_language.is_empty() {
    request.focus_languages = Some(focus_language);
  }
  request.token_limit = token_limit;

  let response = pipeline.find_code(request).await;

  if json {
    println!("{}", serde_json::to_string_pretty(&response)?);
    return Ok(());
  }

  println!("strategy: {:?}  candidates: {}  latency: {}ms", response.strategy_used, response.total_candidates, response.latency_ms);
  if !response.warnings.is_empty() {
    println!("warnings: {}", response.warnings.join(", "));
  }
  println!();
  for (i, result) in response.results.iter().enumerate() {
    println!(
      "{}. {} ({}:{}-{})  score={:.3}",
      i + 1,
      result.chunk.chunk_name,
      result.chunk.file_path,
      result.chunk.line_range.0,
      result.chunk.line_range.1,
      result.score
    );
    println!("{}", result.chunk.content.trim());
    println!();
  }

  Ok(())
}
