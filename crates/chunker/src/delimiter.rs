use regex::Regex;
use std::sync::OnceLock;

use codeweaver_core::chunk::{Chunk, ChunkerType, Classification, ImportanceScores};
use codeweaver_core::{Language, Statistics};

use crate::dedup::DedupStore;
use crate::error::ChunkerError;
use crate::governor::ChunkGovernor;

/// One entry in a language's delimiter family: a regex matching the *opening* delimiter, its
/// matching close (used only for nestable kinds), a priority (higher wins when candidates
/// overlap), and whether it nests via a brace/paren-style stack.
#[derive(Debug, Clone, Copy)]
struct DelimiterRule {
  kind: &'static str,
  open_pattern: &'static str,
  close: Option<&'static str>,
  priority: u8,
  nestable: bool,
}

fn rules_for(language: Language) -> &'static [DelimiterRule] {
  use Language::*;
  match language {
    Rust | Java | C | Cpp => &[
      DelimiterRule { kind: "function", open_pattern: r"\bfn\s+\w+\s*\(|\b\w+\s*\([^;{}]*\)\s*\{", close: Some("}"), priority: 10, nestable: true },
      DelimiterRule { kind: "type", open_pattern: r"\b(struct|enum|trait|class|interface|union)\s+\w+", close: Some("}"), priority: 9, nestable: true },
      DelimiterRule { kind: "block", open_pattern: r"\{", close: Some("}"), priority: 1, nestable: true },
    ],
    JavaScript | TypeScript => &[
      DelimiterRule { kind: "function", open_pattern: r"\bfunction\s*\w*\s*\(|=>\s*\{|\b\w+\s*\([^;{}]*\)\s*\{", close: Some("}"), priority: 10, nestable: true },
      DelimiterRule { kind: "type", open_pattern: r"\bclass\s+\w+|\binterface\s+\w+", close: Some("}"), priority: 9, nestable: true },
      DelimiterRule { kind: "block", open_pattern: r"\{", close: Some("}"), priority: 1, nestable: true },
    ],
    Go => &[
      DelimiterRule { kind: "function", open_pattern: r"\bfunc\s+(\([^)]*\)\s*)?\w+\s*\(", close: Some("}"), priority: 10, nestable: true },
      DelimiterRule { kind: "type", open_pattern: r"\btype\s+\w+\s+(struct|interface)", close: Some("}"), priority: 9, nestable: true },
      DelimiterRule { kind: "block", open_pattern: r"\{", close: Some("}"), priority: 1, nestable: true },
    ],
    Python | Other => &[
      DelimiterRule { kind: "function", open_pattern: r"(?m)^\s*def\s+\w+\s*\(", close: None, priority: 10, nestable: false },
      DelimiterRule { kind: "type", open_pattern: r"(?m)^\s*class\s+\w+", close: None, priority: 9, nestable: false },
    ],
  }
}

static COMPILED: OnceLock<std::sync::Mutex<std::collections::HashMap<(Language, &'static str), Regex>>> = OnceLock::new();

fn compiled_regex(language: Language, rule: &DelimiterRule) -> Regex {
  let cache = COMPILED.get_or_init(|| std::sync::Mutex::new(std::collections::HashMap::new()));
  let mut guard = cache.lock().unwrap();
  guard
  .entry((language, rule.open_pattern))
  .or_insert_with(|| Regex::new(rule.open_pattern).expect("delimiter pattern is a valid regex"))
  .clone()
}

#[derive(Debug, Clone)]
struct Boundary {
  start: usize,
  end: usize,
  start_line: u32,
  end_line: u32,
  kind: &'static str,
  priority: u8,
  nesting_level: u32,
}

/// Phase-3 chunker used when no AST grammar is available, or when the `SemanticChunker`
/// falls back for a specific node. See : match detection, boundary extraction with a
/// nesting stack for brace/paren-style delimiters, then greedy non-overlapping selection by
/// `(priority DESC, length DESC, start ASC)`.
pub struct DelimiterChunker;

impl DelimiterChunker {
  pub fn chunk(
    content: &str,
    file_path: &str,
    language: Language,
    governor: &mut ChunkGovernor,
    dedup: &DedupStore,
    stats: &Statistics,
  ) -> Result<Vec<Chunk>, ChunkerError> {
    stats.chunking().delimiter_used.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    let boundaries = Self::extract_boundaries(content, language, governor)?;
    let selected = Self::resolve_priority(boundaries);

    let mut chunks = Vec::with_capacity(selected.len());
    for boundary in selected {
      governor.check_timeout()?;
      let span = &content[boundary.start..boundary.end];
      if span.trim().is_empty() {
        continue;
      }
      let chunk_name = format!("Block at line {}", boundary.start_line);
      let chunk = Chunk::new(
        chunk_name,
        file_path.to_string(),
        span.to_string(),
        (boundary.start_line, boundary.end_line),
        delimiter_classification(boundary.kind),
        ImportanceScores::uniform(delimiter_importance(boundary.kind)),
        boundary.kind == "block",
        boundary.nesting_level,
        ChunkerType::Delimiter,
        language,
      );
      let (winner, is_duplicate) = dedup.get_or_insert(&chunk.content_hash, ChunkerType::Delimiter, chunk.chunk_id, stats);
      if is_duplicate {
        debug_assert_ne!(winner, chunk.chunk_id);
        continue;
      }
      governor.record_chunk()?;
      chunks.push(chunk);
    }
    Ok(chunks)
  }

  /// Phase 1 (match detection) + phase 2 (boundary extraction with a nesting stack).
  fn extract_boundaries(content: &str, language: Language, governor: &ChunkGovernor) -> Result<Vec<Boundary>, ChunkerError> {
    let rules = rules_for(language);
    let mut candidates: Vec<(usize, &DelimiterRule)> = Vec::new();
    for rule in rules {
      let re = compiled_regex(language, rule);
      for m in re.find_iter(content) {
        candidates.push((m.start(), rule));
      }
    }
    candidates.sort_by_key(|(start, _)| *start);

    let mut boundaries = Vec::new();
    let mut brace_stack: Vec<usize> = Vec::new();
    for (start, rule) in candidates {
      governor.check_timeout()?;
      if rule.nestable {
        let Some(open_brace) = content[start..].find('{') else { continue };
        let brace_pos = start + open_brace;
        let Some(end) = find_matching_brace(content, brace_pos) else { continue };
        let nesting_level = brace_stack.len() as u32;
        governor.check_depth(nesting_level)?;
        brace_stack.retain(|&b| b > end);
        let start_line = line_of(content, start);
        let end_line = line_of(content, end);
        boundaries.push(Boundary {
            start,
            end: end + 1,
            start_line,
            end_line,
            kind: rule.kind,
            priority: rule.priority,
            nesting_level,
          });
        brace_stack.push(end);
      } else {
        // Indentation-delimited (Python-style): the block runs until the next line with
        // indentation <= the opening line's indentation.
        let end = find_indentation_block_end(content, start);
        let start_line = line_of(content, start);
        let end_line = line_of(content, end);
        boundaries.push(Boundary {
            start,
            end,
            start_line,
            end_line,
            kind: rule.kind,
            priority: rule.priority,
            nesting_level: 0,
          });
      }
    }
    Ok(boundaries)
  }

  /// Phase 3: sort by `(priority DESC, length DESC, start ASC)` and greedily select
  /// non-overlapping boundaries.
  fn resolve_priority(mut boundaries: Vec<Boundary>) -> Vec<Boundary> {
    boundaries.sort_by(|a, b| {
        b.priority
        .cmp(&a.priority)
        .then((b.end - b.start).cmp(&(a.end - a.start)))
        .then(a.start.cmp(&b.start))
      });

    let mut selected: Vec<Boundary> = Vec::new();
    for candidate in boundaries {
      let overlaps = selected.iter().any(|s| candidate.start < s.end && s.start < candidate.end);
      if !overlaps {
        selected.push(candidate);
      }
    }
    selected.sort_by_key(|b| b.start);
    selected
  }
}

fn delimiter_classification(kind: &str) -> Classification {
  match kind {
    "function" => Classification::Function,
    "type" => Classification::TypeDef,
    _ => Classification::Structural,
  }
}

fn delimiter_importance(kind: &str) -> f32 {
  match kind {
    "function" => 0.8,
    "type" => 0.75,
    _ => 0.35,
  }
}

fn line_of(content: &str, byte_offset: usize) -> u32 {
  content[..byte_offset.min(content.len())].matches('\n').count() as u32 + 1
}

fn find_matching_brace(content: &str, open_pos: usize) -> Option<usize> {
  let bytes = content.as_bytes();
  let mut depth = 0i32;
  for (i, &b) in bytes.iter().enumerate().skip(open_pos) {
    match b {
      b'{' => depth += 1,
      b'}' => {
        depth -= 1;
        if depth == 0 {
          return Some(i);
        }
      }
      _ => {}
    }
  }
  None
}

fn find_indentation_block_end(content: &str, start: usize) -> usize {
  let line_start = content[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
  let indent = content[line_start..start].len() - content[line_start..start].trim_start().len();

  let mut offset = start;
  for line in content[start..].split_inclusive('\n') {
    if offset != start {
      let trimmed = line.trim_start();
      if !trimmed.is_empty() {
        let this_indent = line.len() - trimmed.len();
        if this_indent <= indent {
          return offset;
        }
      }
    }
    offset += line.len();
  }
  content.len()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn governor() -> ChunkGovernor {
    ChunkGovernor::new(std::time::Duration::from_secs(30), 4096, 200)
  }

  #[test]
  fn chunks_a_python_function_by_indentation() {
    let source = "def foo(x):\n return x + 1\n\ndef bar:\n pass\n";
    let chunks = DelimiterChunker::chunk(source, "a.py", Language::Python, &mut governor(), &DedupStore::new(), &Statistics::new()).unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].classification, Classification::Function);
    assert!(chunks[0].content.starts_with("def foo"));
  }

  #[test]
  fn chunks_a_rust_function_by_braces() {
    let source = "fn foo() {\n let x = 1;\n}\n\nfn bar {\n let y = 2;\n}\n";
    let chunks = DelimiterChunker::chunk(source, "a.rs", Language::Rust, &mut governor(), &DedupStore::new(), &Statistics::new()).unwrap();
    assert_eq!(chunks.len(), 2);
    assert!(chunks[0].content.contains("let x = 1"));
    assert!(chunks[1].content.contains("let y = 2"));
  }

  #[test]
  fn nested_braces_resolve_to_outer_function_only() {
    let source = "fn outer() {\n if true {\n let x = 1;\n }\n}\n";
    let chunks = DelimiterChunker::chunk(source, "a.rs", Language::Rust, &mut governor(), &DedupStore::new(), &Statistics::new()).unwrap();
    // The outer function wins priority over the nested bare-brace block.
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].content.contains("if true"));
  }

  #[test]
  fn boundaries_never_overlap() {
    let source = "fn a() { fn_body_a; }\nstruct S { field: i32 }\n";
    let chunks = DelimiterChunker::chunk(source, "a.rs", Language::Rust, &mut governor(), &DedupStore::new(), &Statistics::new()).unwrap();
    for i in 0..chunks.len() {
      for j in (i + 1)..chunks.len() {
        let (a, b) = (&chunks[i], &chunks[j]);
        assert!(a.line_range.1 < b.line_range.0 || b.line_range.1 < a.line_range.0, "chunks must not overlap");
      }
    }
  }
}
