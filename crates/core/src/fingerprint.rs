use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The canonicalized, hashed form of the settings that participate in the checkpoint. A
/// mismatch between a freshly computed fingerprint and the last-persisted one invalidates
/// the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSettingsFingerprint(pub String);

impl CheckpointSettingsFingerprint {
  pub fn as_hex(&self) -> &str {
    &self.0
  }
}

/// Recursively sort object keys alphabetically so the fingerprint is insensitive to
/// insertion order; arrays keep their order since it is semantically meaningful
/// (e.g. `focus_languages`).
fn canonicalize(value: &Value) -> Value {
  match value {
    Value::Object(map) => {
      let sorted: BTreeMap<String, Value> = map.iter().map(|(k, v)| (k.clone(), canonicalize(v))).collect();
      let mut out = serde_json::Map::new();
      for (k, v) in sorted {
        out.insert(k, v);
      }
      Value::Object(out)
    }
    Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
    other => other.clone(),
  }
}

/// Hash a JSON-compatible value (already stripped of computed/derived fields and live
/// object references by the caller) into a checkpoint fingerprint. Canonicalizes key order
/// before hashing so whitespace and field order never change the result, per invariant 6
/// in the testable-properties section.
pub fn compute_fingerprint(value: &Value) -> CheckpointSettingsFingerprint {
  let canonical = canonicalize(value);
  // `to_string` on a serde_json::Value never reintroduces nondeterministic whitespace; the
  // only remaining source of instability would be key order, which `canonicalize` fixes.
  let bytes = serde_json::to_vec(&canonical).expect("canonicalized value is always serializable");
  let hash = blake3::hash(&bytes);
  CheckpointSettingsFingerprint(hash.to_hex().to_string())
}
