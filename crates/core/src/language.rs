use serde::{Deserialize, Serialize};

/// Languages with a real tree-sitter grammar wired into `codeweaver-parser`.
///
/// Kept deliberately smaller than a generic "language tag" enum would be: every variant
/// here has a working `SemanticChunker` path. Anything else falls back to
/// `DelimiterChunker` via `Language::Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
  Rust,
  Python,
  JavaScript,
  TypeScript,
  Go,
  Java,
  C,
  Cpp,
  /// Recognized but not tree-sitter-backed; always routed to DelimiterChunker.
  Other,
}

impl Language {
  pub fn from_extension(ext: &str) -> Self {
    match ext.to_lowercase().as_str() {
      "rs" => Language::Rust,
      "py" | "pyi" | "pyw" => Language::Python,
      "js" | "mjs" | "cjs" | "jsx" => Language::JavaScript,
      "ts" | "mts" | "tsx" => Language::TypeScript,
      "go" => Language::Go,
      "java" => Language::Java,
      "c" | "h" => Language::C,
      "cpp" | "cc" | "cxx" | "hpp" | "hxx" => Language::Cpp,
      _ => Language::Other,
    }
  }

  /// Whether `codeweaver-parser` carries a tree-sitter grammar for this language.
  pub fn has_semantic_support(&self) -> bool {
    !matches!(self, Language::Other)
  }

  /// Parses a case-insensitive language name, the form `find_code`'s `focus_languages`
  /// request field carries.
  pub fn from_name(name: &str) -> Self {
    match name.to_lowercase().as_str() {
      "rust" => Language::Rust,
      "python" => Language::Python,
      "javascript" => Language::JavaScript,
      "typescript" => Language::TypeScript,
      "go" | "golang" => Language::Go,
      "java" => Language::Java,
      "c" => Language::C,
      "cpp" | "c++" => Language::Cpp,
      _ => Language::Other,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Language::Rust => "Rust",
      Language::Python => "Python",
      Language::JavaScript => "JavaScript",
      Language::TypeScript => "TypeScript",
      Language::Go => "Go",
      Language::Java => "Java",
      Language::C => "C",
      Language::Cpp => "Cpp",
      Language::Other => "Other",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn recognizes_known_extensions() {
    assert_eq!(Language::from_extension("rs"), Language::Rust);
    assert_eq!(Language::from_extension("PY"), Language::Python);
    assert_eq!(Language::from_extension("tsx"), Language::TypeScript);
  }

  #[test]
  fn unknown_extension_is_other() {
    assert_eq!(Language::from_extension("xyz"), Language::Other);
    assert!(!Language::Other.has_semantic_support());
    assert!(Language::Rust.has_semantic_support());
  }

  #[test]
  fn recognizes_case_insensitive_names() {
    assert_eq!(Language::from_name("Python"), Language::Python);
    assert_eq!(Language::from_name("GOLANG"), Language::Go);
    assert_eq!(Language::from_name("cobol"), Language::Other);
  }
}
