//! Checkpoint fingerprinting and manifest/fingerprint persistence.

use std::path::{Path, PathBuf};

use serde_json::{Value, json};

use codeweaver_core::{CheckpointSettingsFingerprint, IndexFileManifest, IndexerSettings, compute_fingerprint};

use crate::error::IndexerError;

const MANIFEST_FILE_NAME: &str = "manifest.json";
const FINGERPRINT_FILE_NAME: &str = "settings_fingerprint.hex";

/// Describes one configured embedding provider for the fingerprint, matching
/// "Provider `(name, model, dimension)` triples for each embedding kind".
#[derive(Debug, Clone)]
pub struct ProviderFingerprint {
  pub kind: &'static str,
  pub name: String,
  pub model: String,
  pub dimension: usize,
}

/// Assembles the JSON value that feeds [`codeweaver_core::compute_fingerprint`]: the
/// effective settings plus every field calls out that isn't already captured by
/// `IndexerSettings` (provider identity, vector-store kind, chunker version, project root).
/// Computed/derived fields and live object references never appear here by construction —
/// everything going in is a plain string, number, or nested object.
pub fn fingerprint_inputs(settings: &IndexerSettings, project_root: &Path, providers: &[ProviderFingerprint]) -> Value {
  let canonical_root = project_root.canonicalize().unwrap_or_else(|_| project_root.to_path_buf());
  json!({
      "settings": settings.fingerprint_value(),
      "providers": providers.iter().map(|p| json!({
            "kind": p.kind,
            "name": p.name,
            "model": p.model,
            "dimension": p.dimension,
          })).collect::<Vec<_>>(),
      "vector_store": {
        "kind": "qdrant",
        "collection_name": settings.vector_store.collection_name,
      },
      "chunker": {
        "kind": "semantic+delimiter",
        "version": env!("CARGO_PKG_VERSION"),
        "importance_threshold": settings.chunker.importance_threshold,
      },
      "project_root": canonical_root.to_string_lossy(),
    })
}

/// Owns the on-disk `manifest.json` and `settings_fingerprint.hex`, and the in-memory
/// manifest the `Indexer` mutates during a run. The manifest is single-owner: only the
/// `Indexer` holding this `CheckpointManager` ever writes it.
pub struct CheckpointManager {
  manifest_path: PathBuf,
  fingerprint_path: PathBuf,
  manifest: IndexFileManifest,
}

impl CheckpointManager {
  /// Load persisted state under `config_dir`, tolerating absence of either file.
  pub fn load(config_dir: &Path) -> Result<Self, IndexerError> {
    let manifest_path = config_dir.join(MANIFEST_FILE_NAME);
    let fingerprint_path = config_dir.join(FINGERPRINT_FILE_NAME);
    let manifest = IndexFileManifest::load(&manifest_path)?;
    Ok(Self { manifest_path, fingerprint_path, manifest })
  }

  pub fn manifest(&self) -> &IndexFileManifest {
    &self.manifest
  }

  pub fn manifest_mut(&mut self) -> &mut IndexFileManifest {
    &mut self.manifest
  }

  pub fn replace_manifest(&mut self, manifest: IndexFileManifest) {
    self.manifest = manifest;
  }

  pub fn save_manifest(&self) -> Result<(), IndexerError> {
    Ok(self.manifest.save(&self.manifest_path)?)
  }

  /// The fingerprint recorded by the previous run, if any. `None` is treated the same as a
  /// mismatch by the caller: a fresh project has no prior fingerprint to compare against, so
  /// `prime_index` runs a full (non-incremental) pass the first time regardless.
  pub fn last_fingerprint(&self) -> Option<CheckpointSettingsFingerprint> {
    let hex = std::fs::read_to_string(&self.fingerprint_path).ok()?;
    let trimmed = hex.trim();
    if trimmed.is_empty() { None } else { Some(CheckpointSettingsFingerprint(trimmed.to_string())) }
  }

  pub fn persist_fingerprint(&self, fingerprint: &CheckpointSettingsFingerprint) -> Result<(), IndexerError> {
    let tmp = self.fingerprint_path.with_extension("hex.tmp");
    if let Some(parent) = self.fingerprint_path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&tmp, fingerprint.as_hex())?;
    std::fs::rename(&tmp, &self.fingerprint_path)?;
    Ok(())
  }

  pub fn compute_settings_hash(inputs: &Value) -> CheckpointSettingsFingerprint {
    compute_fingerprint(inputs)
  }
}
