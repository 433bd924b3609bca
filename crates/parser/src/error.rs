use codeweaver_core::Language;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
  #[error("no tree-sitter grammar compiled in for {0:?}")]
  UnsupportedLanguage(Language),
  #[error("tree-sitter failed to build an AST for this file")]
  GrammarRejected,
}
