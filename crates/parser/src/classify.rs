use codeweaver_core::chunk::{Classification, ImportanceScores};
use codeweaver_core::Language;

/// Maps a tree-sitter node kind to its abstract [`Classification`], one table per language.
/// This is the "language-specific abstract-type map" the `SemanticChunker` consults at every
/// node it visits; unmapped kinds (most of them, in any grammar) return `None` and are never
/// emitted as their own chunk, only walked into.
pub fn classify_node(language: Language, kind: &str) -> Option<Classification> {
  use Classification::*;
  match language {
    Language::Rust => match kind {
      "function_item" => Some(Function),
      "struct_item" | "enum_item" | "trait_item" | "type_item" | "union_item" => Some(TypeDef),
      "if_expression" | "if_let_expression" | "for_expression" | "while_expression" | "while_let_expression" | "loop_expression" | "match_expression" => Some(ControlFlow),
      "call_expression" | "macro_invocation" => Some(Call),
      "string_literal" | "raw_string_literal" | "integer_literal" | "float_literal" | "boolean_literal" | "char_literal" => Some(Literal),
      "line_comment" | "block_comment" => Some(Comment),
      "mod_item" | "const_item" | "static_item" | "use_declaration" | "impl_item" => Some(Structural),
      _ => None,
    },
    Language::Python => match kind {
      "function_definition" => Some(Function),
      "class_definition" => Some(TypeDef),
      "if_statement" | "for_statement" | "while_statement" | "try_statement" | "with_statement" | "match_statement" => Some(ControlFlow),
      "call" => Some(Call),
      "string" | "integer" | "float" | "true" | "false" | "none" => Some(Literal),
      "comment" => Some(Comment),
      "import_statement" | "import_from_statement" => Some(Structural),
      _ => None,
    },
    Language::JavaScript | Language::TypeScript => match kind {
      "function_declaration" | "method_definition" | "arrow_function" | "function_expression" | "generator_function_declaration" => Some(Function),
      "class_declaration" | "interface_declaration" | "type_alias_declaration" => Some(TypeDef),
      "if_statement" | "for_statement" | "for_in_statement" | "while_statement" | "switch_statement" | "try_statement" => Some(ControlFlow),
      "call_expression" | "new_expression" => Some(Call),
      "string" | "template_string" | "number" | "true" | "false" | "null" => Some(Literal),
      "comment" => Some(Comment),
      "import_statement" | "export_statement" => Some(Structural),
      _ => None,
    },
    Language::Go => match kind {
      "function_declaration" | "method_declaration" | "func_literal" => Some(Function),
      "type_declaration" | "interface_type" | "struct_type" => Some(TypeDef),
      "if_statement" | "for_statement" | "switch_statement" | "type_switch_statement" | "select_statement" => Some(ControlFlow),
      "call_expression" => Some(Call),
      "interpreted_string_literal" | "raw_string_literal" | "int_literal" | "float_literal" => Some(Literal),
      "comment" => Some(Comment),
      "import_declaration" | "package_clause" => Some(Structural),
      _ => None,
    },
    Language::Java => match kind {
      "method_declaration" | "constructor_declaration" | "lambda_expression" => Some(Function),
      "class_declaration" | "interface_declaration" | "enum_declaration" | "record_declaration" => Some(TypeDef),
      "if_statement" | "for_statement" | "enhanced_for_statement" | "while_statement" | "switch_expression" | "try_statement" => Some(ControlFlow),
      "method_invocation" | "object_creation_expression" => Some(Call),
      "string_literal" | "decimal_integer_literal" | "true" | "false" => Some(Literal),
      "line_comment" | "block_comment" => Some(Comment),
      "import_declaration" | "package_declaration" => Some(Structural),
      _ => None,
    },
    Language::C => match kind {
      "function_definition" => Some(Function),
      "struct_specifier" | "union_specifier" | "enum_specifier" | "type_definition" => Some(TypeDef),
      "if_statement" | "for_statement" | "while_statement" | "switch_statement" => Some(ControlFlow),
      "call_expression" => Some(Call),
      "string_literal" | "number_literal" => Some(Literal),
      "comment" => Some(Comment),
      "preproc_include" | "preproc_def" | "declaration" => Some(Structural),
      _ => None,
    },
    Language::Cpp => match kind {
      "function_definition" => Some(Function),
      "class_specifier" | "struct_specifier" | "enum_specifier" | "namespace_definition" => Some(TypeDef),
      "if_statement" | "for_statement" | "while_statement" | "switch_statement" => Some(ControlFlow),
      "call_expression" => Some(Call),
      "string_literal" | "number_literal" => Some(Literal),
      "comment" => Some(Comment),
      "preproc_include" | "preproc_def" | "declaration" => Some(Structural),
      _ => None,
    },
    Language::Other => None,
  }
}

/// Default importance facets for a classification, before the chunker's identifier/trivia
/// adjustments. Function and type definitions anchor discovery; control flow and calls are
/// context without being independently discoverable; literals and comments rarely justify a
/// chunk of their own.
pub fn default_importance(classification: Classification) -> ImportanceScores {
  use Classification::*;
  match classification {
    Function => ImportanceScores { relevance: 0.9, context: 0.6, discovery: 0.9, modification: 0.7 },
    TypeDef => ImportanceScores { relevance: 0.85, context: 0.7, discovery: 0.85, modification: 0.6 },
    ControlFlow => ImportanceScores { relevance: 0.4, context: 0.5, discovery: 0.3, modification: 0.5 },
    Call => ImportanceScores { relevance: 0.35, context: 0.4, discovery: 0.3, modification: 0.3 },
    Literal => ImportanceScores { relevance: 0.15, context: 0.2, discovery: 0.1, modification: 0.2 },
    Comment => ImportanceScores { relevance: 0.2, context: 0.3, discovery: 0.15, modification: 0.1 },
    Structural => ImportanceScores { relevance: 0.25, context: 0.3, discovery: 0.2, modification: 0.25 },
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn classifies_rust_function_and_type() {
    assert_eq!(classify_node(Language::Rust, "function_item"), Some(Classification::Function));
    assert_eq!(classify_node(Language::Rust, "struct_item"), Some(Classification::TypeDef));
    assert_eq!(classify_node(Language::Rust, "block"), None);
  }

  #[test]
  fn classifies_python_and_go() {
    assert_eq!(classify_node(Language::Python, "function_definition"), Some(Classification::Function));
    assert_eq!(classify_node(Language::Go, "method_declaration"), Some(Classification::Function));
  }

  #[test]
  fn default_importance_ranks_functions_above_literals() {
    let f = default_importance(Classification::Function);
    let l = default_importance(Classification::Literal);
    assert!(f.overall() > l.overall());
  }
}
