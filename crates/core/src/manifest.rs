use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::language::Language;

#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("I/O error persisting manifest: {0}")]
  Io(#[from] std::io::Error),
  #[error("manifest is not valid JSON: {0}")]
  Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
  pub content_hash: String,
  pub indexed_at: DateTime<Utc>,
  pub chunk_count: usize,
  pub language: Language,
}

/// Map from project-relative path to per-file indexed state. The owning `Indexer` is the
/// sole writer; readers outside the indexer only ever see a cloned snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexFileManifest {
  files: HashMap<String, ManifestEntry>,
}

impl IndexFileManifest {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, relative_path: &str) -> Option<&ManifestEntry> {
    self.files.get(relative_path)
  }

  pub fn set(&mut self, relative_path: String, entry: ManifestEntry) {
    self.files.insert(relative_path, entry);
  }

  pub fn remove(&mut self, relative_path: &str) -> Option<ManifestEntry> {
    self.files.remove(relative_path)
  }

  pub fn has_file(&self, relative_path: &str) -> bool {
    self.files.contains_key(relative_path)
  }

  pub fn paths(&self) -> impl Iterator<Item = &String> {
    self.files.keys()
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  /// Total chunk count across every manifest entry; used by `FailoverManager`'s
  /// memory-safety estimate when a manifest is available.
  pub fn total_chunk_count(&self) -> usize {
    self.files.values().map(|e| e.chunk_count).sum()
  }

  /// Atomic persistence: write to a sibling temp file, then rename over the target. Any
  /// reader — including a process that crashed mid-write of a previous generation — either
  /// sees the old complete file or the new complete file, never a partial one.
  pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
    let json = serde_json::to_vec_pretty(self)?;
    let tmp = tmp_path(path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
  }

  /// Readers must tolerate absence: a missing file is an empty manifest, not an error.
  pub fn load(path: &Path) -> Result<Self, ManifestError> {
    match std::fs::read(path) {
      Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
      Err(e) => Err(e.into()),
    }
  }
}

fn tmp_path(path: &Path) -> PathBuf {
  let mut tmp = path.to_path_buf();
  let file_name = format!(".{}.tmp", path.file_name().and_then(|n| n.to_str()).unwrap_or("manifest"));
  tmp.set_file_name(file_name);
  tmp
}
