use codeweaver_core::config::DiscoveryConfig;
use codeweaver_core::{DiscoveredFile, Statistics, chunk::compute_content_hash, language::Language, normalize_relative_path};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ignore::GitignoreCache;

/// Walks a project tree honoring ignore rules and yields [`DiscoveredFile`]s.
///
/// Restartable and deterministic given the same filesystem state: two calls to
/// [`FileDiscovery::discover`] over an unchanged tree produce the same set (modulo
/// directory-entry iteration order, which callers must not depend on for anything beyond
/// set membership).
pub struct FileDiscovery {
  project_root: PathBuf,
  config: DiscoveryConfig,
  ignore_cache: Arc<GitignoreCache>,
  stats: Statistics,
}

impl FileDiscovery {
  pub fn new(project_root: impl Into<PathBuf>, config: DiscoveryConfig, stats: Statistics) -> Self {
    Self {
      project_root: project_root.into(),
      config,
      ignore_cache: Arc::new(GitignoreCache::new()),
      stats,
    }
  }

  pub fn with_ignore_cache(mut self, cache: Arc<GitignoreCache>) -> Self {
    self.ignore_cache = cache;
    self
  }

  /// Same as [`Self::discover`] but rejects a root that is missing or not a directory up
  /// front, instead of silently walking nothing.
  pub fn discover_checked(&self) -> Result<Vec<DiscoveredFile>, crate::error::DiscoveryError> {
    if !self.project_root.is_dir() {
      return Err(crate::error::DiscoveryError::InvalidRoot(self.project_root.clone()));
    }
    Ok(self.discover())
  }

  /// Finite, eagerly-collected walk. Unreadable files (permission errors, I/O errors) never
  /// abort the walk; they are counted under `discovery.unreadable` and skipped.
  pub fn discover(&self) -> Vec<DiscoveredFile> {
    let mut out = Vec::new();
    let mut stack = vec![self.project_root.clone()];

    while let Some(dir) = stack.pop() {
      let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) => {
          warn!(path = %dir.display(), error = %e, "cannot read directory");
          self.stats.discovery().unreadable.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
          continue;
        }
      };

      for entry in entries.flatten() {
        let path = entry.path();

        if self.ignore_cache.should_ignore(&self.project_root, &path) {
          continue;
        }

        let file_type = match entry.file_type() {
          Ok(ft) => ft,
          Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot stat entry");
            self.stats.discovery().unreadable.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            continue;
          }
        };

        if file_type.is_dir() {
          stack.push(path);
          continue;
        }

        if !file_type.is_file() {
          continue;
        }

        self.stats.discovery().files_seen.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        match self.probe_file(&path) {
          Some(discovered) => out.push(discovered),
          None => {
            self.stats.discovery().files_skipped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
          }
        }
      }
    }

    out
  }

  /// Size ceiling, then a binary probe of the first `binary_probe_bytes` bytes. The probe is
  /// authoritative; extension-based language detection is only ever used to tag the
  /// resulting `DiscoveredFile`, never to decide whether to skip it.
  fn probe_file(&self, path: &Path) -> Option<DiscoveredFile> {
    let metadata = match fs::metadata(path) {
      Ok(m) => m,
      Err(e) => {
        warn!(path = %path.display(), error = %e, "unreadable file");
        self.stats.discovery().unreadable.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        return None;
      }
    };

    if metadata.len() > self.config.max_file_size_bytes {
      debug!(path = %path.display(), size = metadata.len(), "file exceeds size ceiling");
      return None;
    }

    let bytes = match fs::read(path) {
      Ok(b) => b,
      Err(e) => {
        warn!(path = %path.display(), error = %e, "unreadable file");
        self.stats.discovery().unreadable.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        return None;
      }
    };

    if is_binary(&bytes, self.config.binary_probe_bytes) {
      return None;
    }

    let relative_path = normalize_relative_path(&self.project_root, path)?;
    let language = path
      .extension()
      .and_then(|e| e.to_str())
      .map(Language::from_extension)
      .unwrap_or(Language::Other);
    let content = String::from_utf8_lossy(&bytes);
    let content_hash = compute_content_hash(&content);

    Some(DiscoveredFile {
      absolute_path: path.to_string_lossy().into_owned(),
      relative_path,
      size_bytes: metadata.len(),
      language,
      content_hash,
    })
  }
}

/// Classify by null-byte frequency in the first `probe_bytes` of the file: any null byte
/// marks the file as binary. This matches common heuristics (git, ripgrep) for detecting
/// non-text content without a full file read.
fn is_binary(bytes: &[u8], probe_bytes: usize) -> bool {
  let probe = &bytes[..bytes.len().min(probe_bytes)];
  probe.contains(&0)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::DiscoveryError;
  use tempfile::TempDir;

  fn stats() -> Statistics {
    Statistics::new()
  }

  #[test]
  fn discovers_text_files_and_skips_binary() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.rs"), "fn main() {}").unwrap();
    fs::write(dir.path().join("b.bin"), [0u8, 1, 2, 3]).unwrap();

    let discovery = FileDiscovery::new(dir.path(), DiscoveryConfig::default(), stats());
    let files = discovery.discover();

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].relative_path, "a.rs");
    assert_eq!(files[0].language, Language::Rust);
  }

  #[test]
  fn honors_size_ceiling() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("big.rs"), "x".repeat(100)).unwrap();

    let mut config = DiscoveryConfig::default();
    config.max_file_size_bytes = 10;
    let discovery = FileDiscovery::new(dir.path(), config, stats());
    assert!(discovery.discover().is_empty());
  }

  #[test]
  fn prunes_ignored_directories() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("target/debug")).unwrap();
    fs::write(dir.path().join("target/debug/main"), "binary-ish").unwrap();
    fs::write(dir.path().join("a.rs"), "fn main() {}").unwrap();

    let discovery = FileDiscovery::new(dir.path(), DiscoveryConfig::default(), stats());
    let files = discovery.discover();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].relative_path, "a.rs");
  }

  #[test]
  fn missing_root_yields_empty_walk_but_checked_variant_errors() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist");
    let discovery = FileDiscovery::new(&missing, DiscoveryConfig::default(), stats());
    assert!(discovery.discover().is_empty());
    assert!(matches!(discovery.discover_checked(), Err(DiscoveryError::InvalidRoot(p)) if p == missing));
  }

  #[test]
  fn is_restartable_and_deterministic_for_set_membership() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.rs"), "fn main() {}").unwrap();
    fs::write(dir.path().join("b.py"), "def f(): pass").unwrap();

    let discovery = FileDiscovery::new(dir.path(), DiscoveryConfig::default(), stats());
    let mut first: Vec<_> = discovery.discover().into_iter().map(|f| f.relative_path).collect();
    let mut second: Vec<_> = discovery.discover().into_iter().map(|f| f.relative_path).collect();
    first.sort();
    second.sort();
    assert_eq!(first, second);
  }
}
