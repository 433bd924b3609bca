//! Gitignore pattern matching with per-project caching.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

/// Patterns ignored regardless of the project's own `.gitignore`.
const GLOBAL_PATTERNS: &[&str] = &[
  ".git/",
  ".hg/",
  ".svn/",
  "node_modules/",
  "vendor/",
  ".venv/",
  "venv/",
  "target/",
  "dist/",
  "build/",
  ".next/",
  ".nuxt/",
  ".cache/",
  "__pycache__/",
  ".pytest_cache/",
  ".mypy_cache/",
  ".ruff_cache/",
  ".tox/",
  "coverage/",
  ".coverage/",
  ".nyc_output/",
  "*.min.js",
  "*.min.css",
  "*.map",
  "package-lock.json",
  "bun.lock",
  "yarn.lock",
  "pnpm-lock.yaml",
  "Cargo.lock",
  "poetry.lock",
  "Pipfile.lock",
  "composer.lock",
  "Gemfile.lock",
];

struct CompiledIgnore {
  matcher: Gitignore,
  gitignore_mtime: Option<SystemTime>,
}

/// Thread-safe cache of compiled gitignore matchers, one per project root. Rebuilds only
/// when the project's `.gitignore` mtime changes.
pub struct GitignoreCache {
  cache: RwLock<HashMap<PathBuf, CompiledIgnore>>,
}

impl GitignoreCache {
  pub fn new() -> Self {
    Self {
      cache: RwLock::new(HashMap::new()),
    }
  }

  pub fn should_ignore(&self, project_root: &Path, path: &Path) -> bool {
    {
      let cache = self.cache.read().unwrap();
      if let Some(compiled) = cache.get(project_root)
        && self.is_cache_valid(project_root, compiled)
      {
        return self.check_match(&compiled.matcher, project_root, path);
      }
    }
    let matcher = self.build_and_cache_matcher(project_root);
    self.check_match(&matcher, project_root, path)
  }

  fn check_match(&self, matcher: &Gitignore, project_root: &Path, path: &Path) -> bool {
    let relative_path = path.strip_prefix(project_root).unwrap_or(path);
    let is_dir = path.is_dir();
    matcher.matched_path_or_any_parents(relative_path, is_dir).is_ignore()
  }

  fn build_and_cache_matcher(&self, project_root: &Path) -> Gitignore {
    let matcher = self.build_matcher(project_root);
    let mtime = self.gitignore_mtime(project_root);
    let mut cache = self.cache.write().unwrap();
    cache.insert(
      project_root.to_path_buf(),
      CompiledIgnore {
        matcher: matcher.clone(),
        gitignore_mtime: mtime,
      },
    );
    matcher
  }

  fn build_matcher(&self, project_root: &Path) -> Gitignore {
    let mut builder = GitignoreBuilder::new(project_root);
    for pattern in GLOBAL_PATTERNS {
      let _ = builder.add_line(None, pattern);
    }
    let gitignore_path = project_root.join(".gitignore");
    if gitignore_path.exists() {
      let _ = builder.add(&gitignore_path);
    }
    let exclude_path = project_root.join(".git/info/exclude");
    if exclude_path.exists() {
      let _ = builder.add(&exclude_path);
    }
    let codeweaver_ignore = project_root.join(".codeweaverignore");
    if codeweaver_ignore.exists() {
      let _ = builder.add(&codeweaver_ignore);
    }

    builder.build().unwrap_or_else(|_| {
      let mut fallback = GitignoreBuilder::new(project_root);
      for pattern in GLOBAL_PATTERNS {
        let _ = fallback.add_line(None, pattern);
      }
      fallback.build().unwrap()
    })
  }

  fn is_cache_valid(&self, project_root: &Path, compiled: &CompiledIgnore) -> bool {
    self.gitignore_mtime(project_root) == compiled.gitignore_mtime
  }

  fn gitignore_mtime(&self, project_root: &Path) -> Option<SystemTime> {
    fs::metadata(project_root.join(".gitignore")).ok().and_then(|m| m.modified().ok())
  }

  pub fn invalidate(&self, project_root: &Path) {
    self.cache.write().unwrap().remove(project_root);
  }
}

impl Default for GitignoreCache {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn ignores_global_patterns() {
    let dir = TempDir::new().unwrap();
    let cache = GitignoreCache::new();
    assert!(cache.should_ignore(dir.path(), &dir.path().join("node_modules/foo.js")));
    assert!(cache.should_ignore(dir.path(), &dir.path().join("target/debug/main")));
    assert!(!cache.should_ignore(dir.path(), &dir.path().join("src/main.rs")));
  }

  #[test]
  fn uses_project_gitignore() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(".gitignore"), "custom_ignored/\n*.custom").unwrap();
    let cache = GitignoreCache::new();
    assert!(cache.should_ignore(dir.path(), &dir.path().join("custom_ignored/file.rs")));
    assert!(cache.should_ignore(dir.path(), &dir.path().join("test.custom")));
    assert!(!cache.should_ignore(dir.path(), &dir.path().join("src/main.rs")));
  }

  #[test]
  fn invalidates_on_gitignore_change() {
    let dir = TempDir::new().unwrap();
    let cache = GitignoreCache::new();
    assert!(!cache.should_ignore(dir.path(), &dir.path().join("custom/file.rs")));
    fs::write(dir.path().join(".gitignore"), "custom/").unwrap();
    std::thread::sleep(std::time::Duration::from_millis(10));
    assert!(cache.should_ignore(dir.path(), &dir.path().join("custom/file.rs")));
  }
}
