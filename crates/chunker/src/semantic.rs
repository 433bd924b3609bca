use tree_sitter::Node;

use codeweaver_core::chunk::{Chunk, ChunkerType, Classification, ImportanceScores, estimate_tokens};
use codeweaver_core::{Language, Statistics};
use codeweaver_parser::{AstParser, classify_node, default_importance};

use crate::dedup::DedupStore;
use crate::delimiter::DelimiterChunker;
use crate::error::ChunkerError;
use crate::governor::ChunkGovernor;

/// Tunables the `SemanticChunker` needs from [`codeweaver_core::config::ChunkerConfig`],
/// kept as a plain struct here so this crate does not depend on the config type directly.
#[derive(Debug, Clone, Copy)]
pub struct SemanticLimits {
  pub importance_threshold: f32,
  pub max_chunk_tokens: usize,
}

/// AST-first chunker. Emits one chunk per node whose importance clears the threshold
/// and whose token count is under the per-chunk limit; oversized qualifying nodes delegate to
/// their chunkable children, and if none qualify, to [`DelimiterChunker`] over that node's own
/// byte range — never failing the whole file over one huge node.
pub struct SemanticChunker;

impl SemanticChunker {
  pub fn chunk(
    content: &str,
    file_path: &str,
    language: Language,
    limits: SemanticLimits,
    governor: &mut ChunkGovernor,
    dedup: &DedupStore,
    stats: &Statistics,
  ) -> Result<Vec<Chunk>, ChunkerError> {
    let mut parser = AstParser::new();
    let tree = parser.parse(content, language)?;
    let root = tree.root_node();

    let mut out = Vec::new();
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
      governor.check_timeout()?;
      visit(child, content, file_path, language, limits, 0, governor, dedup, stats, &mut out)?;
    }
    Ok(out)
  }
}

#[allow(clippy::too_many_arguments)]
fn visit(
  node: Node,
  content: &str,
  file_path: &str,
  language: Language,
  limits: SemanticLimits,
  depth: u32,
  governor: &mut ChunkGovernor,
  dedup: &DedupStore,
  stats: &Statistics,
  out: &mut Vec<Chunk>,
) -> Result<(), ChunkerError> {
  governor.check_timeout()?;
  governor.check_depth(depth)?;

  let Some(classification) = classify_node(language, node.kind()) else {
    // Not individually classified: walk through as a pure container.
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
      visit(child, content, file_path, language, limits, depth + 1, governor, dedup, stats, out)?;
    }
    return Ok(());
  };

  let span = node_text(node, content);
  let token_count = estimate_tokens(span) as usize;
  let importance = scored_importance(node, classification, content);

  if importance.overall() >= limits.importance_threshold && token_count < limits.max_chunk_tokens {
    emit(node, span, content, file_path, language, classification, importance, depth, dedup, governor, stats, out)?;
    return Ok(());
  }

  if token_count >= limits.max_chunk_tokens {
    // Oversized: try splitting into chunkable children first.
    let before = out.len();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
      visit(child, content, file_path, language, limits, depth + 1, governor, dedup, stats, out)?;
    }
    if out.len() > before {
      return Ok(());
    }
    // No chunkable children either: fall back to delimiter chunking over this node's own
    // byte range, matching step 4 and the `OversizedChunkError` recovery policy.
    stats.chunking().oversized_fallback.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    let fallback = DelimiterChunker::chunk(span, file_path, language, governor, dedup, stats)?;
    let line_offset = line_of(content, node.start_byte()).saturating_sub(1);
    for mut chunk in fallback {
      chunk.line_range = (chunk.line_range.0 + line_offset, chunk.line_range.1 + line_offset);
      out.push(chunk);
    }
    return Ok(());
  }

  // Below the importance threshold and not oversized: still worth walking in case a nested
  // node (e.g. a closure inside a low-importance statement) independently qualifies.
  let mut cursor = node.walk();
  for child in node.children(&mut cursor) {
    visit(child, content, file_path, language, limits, depth + 1, governor, dedup, stats, out)?;
  }
  Ok(())
}

#[allow(clippy::too_many_arguments)]
fn emit(
  node: Node,
  span: &str,
  content: &str,
  file_path: &str,
  language: Language,
  classification: Classification,
  importance: ImportanceScores,
  depth: u32,
  dedup: &DedupStore,
  governor: &mut ChunkGovernor,
  stats: &Statistics,
  out: &mut Vec<Chunk>,
) -> Result<(), ChunkerError> {
  let start_line = line_of(content, node.start_byte());
  let end_line = line_of(content, node.end_byte().saturating_sub(1).max(node.start_byte()));
  let name = extract_name(node, content).unwrap_or_else(|| "anonymous".to_string());
  let is_composite = node_has_classified_descendant(node, language);
  let chunk_name = format!("{}-{}-{}: '{}'", language.as_str(), node.kind(), role_of(classification), name);

  let chunk = Chunk::new(
    chunk_name,
    file_path.to_string(),
    span.to_string(),
    (start_line, end_line),
    classification,
    importance,
    is_composite,
    depth,
    ChunkerType::Semantic,
    language,
  );

  let (winner, is_duplicate) = dedup.get_or_insert(&chunk.content_hash, ChunkerType::Semantic, chunk.chunk_id, stats);
  if is_duplicate {
    debug_assert_ne!(winner, chunk.chunk_id);
    return Ok(());
  }
  governor.record_chunk()?;
  out.push(chunk);
  Ok(())
}

fn role_of(classification: Classification) -> &'static str {
  match classification {
    Classification::Function => "Function",
    Classification::TypeDef => "Type",
    Classification::ControlFlow => "ControlFlow",
    Classification::Call => "Call",
    Classification::Literal => "Literal",
    Classification::Comment => "Comment",
    Classification::Structural => "Structural",
  }
}

fn node_text<'a>(node: Node, content: &'a str) -> &'a str {
&content[node.start_byte()..node.end_byte()]
}

fn line_of(content: &str, byte_offset: usize) -> u32 {
  content[..byte_offset.min(content.len())].matches('\n').count() as u32 + 1
}

/// Looks for the first identifier-shaped direct child, which covers the common shape across
/// every grammar we carry a table for (`fn NAME`, `def NAME`, `class NAME`, `func NAME`,...).
fn extract_name(node: Node, content: &str) -> Option<String> {
  let mut cursor = node.walk();
  for child in node.children(&mut cursor) {
    if child.kind().ends_with("identifier") {
      return Some(node_text(child, content).to_string());
    }
  }
  None
}

/// Whether `node` contains a descendant that would itself be independently classified — used
/// to flag `is_composite` on an emitted chunk (a chunk whose nested structure was not further
/// split out).
fn node_has_classified_descendant(node: Node, language: Language) -> bool {
  let mut cursor = node.walk();
  for child in node.children(&mut cursor) {
    if classify_node(language, child.kind()).is_some() {
      return true;
    }
    if node_has_classified_descendant(child, language) {
      return true;
    }
  }
  false
}

/// Importance is the max of: the classification's default score, a boost for containing an
/// identifier (concrete, nameable things are more discoverable), and a penalty for being
/// inside trivia (here: the node itself being a comment, which `default_importance` already
/// scores low — this only adds the extra boost/penalty layer called for by step 3).
fn scored_importance(node: Node, classification: Classification, content: &str) -> ImportanceScores {
  let base = default_importance(classification);
  let has_identifier = extract_name(node, content).is_some();
  let boost = if has_identifier { 0.05 } else { 0.0 };
  let penalty = if classification == Classification::Comment { 0.1 } else { 0.0 };
  ImportanceScores {
    relevance: (base.relevance + boost - penalty).clamp(0.0, 1.0),
    context: (base.context + boost - penalty).clamp(0.0, 1.0),
    discovery: (base.discovery + boost - penalty).clamp(0.0, 1.0),
    modification: (base.modification + boost - penalty).clamp(0.0, 1.0),
  }
}
