use serde::{Deserialize, Serialize};

use crate::language::Language;

/// A file found by `FileDiscovery`. `relative_path` is the canonical identity of a file
/// within a project: forward-slash separated, never prefixed with `./`, never
/// trailing-slashed. Every other component (manifest, vector-store payload, backup file)
/// must reference files by this same string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredFile {
  pub absolute_path: String,
  pub relative_path: String,
  pub size_bytes: u64,
  pub language: Language,
  pub content_hash: String,
}

/// Normalize a path relative to `root` into the canonical manifest/payload form.
///
/// This is the single entry point paths must pass through before being used as a manifest
/// key, a vector-store payload field, or a backup-file point id reference. Both
/// `FileDiscovery` and the `Indexer`'s watcher-driven incremental paths call this function;
/// no other code constructs a relative-path string by hand.
pub fn normalize_relative_path(root: &std::path::Path, absolute: &std::path::Path) -> Option<String> {
  let rel = absolute.strip_prefix(root).ok()?;
  let mut s = rel.to_string_lossy().replace('\\', "/");
  while let Some(stripped) = s.strip_prefix("./") {
    s = stripped.to_string();
  }
  while s.ends_with('/') {
    s.pop();
  }
  if s.is_empty() { None } else { Some(s) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::Path;

  #[test]
  fn normalizes_separators_and_prefix() {
    let root = Path::new("/proj");
    let abs = Path::new("/proj/./src/a.rs");
    assert_eq!(normalize_relative_path(root, abs).as_deref(), Some("src/a.rs"));
  }

  #[test]
  fn rejects_paths_outside_root() {
    let root = Path::new("/proj");
    let abs = Path::new("/other/a.rs");
    assert_eq!(normalize_relative_path(root, abs), None);
  }
}
