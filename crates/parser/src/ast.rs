use std::collections::HashMap;
use tree_sitter::{Language as TsLanguage, Parser, Tree};

use codeweaver_core::Language;

use crate::error::ParseError;

/// Lazily loads one tree-sitter [`Parser`] per language the first time it's needed.
///
/// Unlike a long-lived interactive parser, the indexer parses each file exactly once per
/// chunking pass, so there is no tree cache or incremental-edit support here: every call to
/// [`Self::parse`] is a fresh, full parse.
#[derive(Default)]
pub struct AstParser {
  parsers: HashMap<Language, Parser>,
}

impl AstParser {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn parse(&mut self, content: &str, language: Language) -> Result<Tree, ParseError> {
    self.ensure_loaded(language)?;
    let parser = self.parsers.get_mut(&language).expect("ensure_loaded just inserted this parser");
    parser.parse(content, None).ok_or(ParseError::GrammarRejected)
  }

  fn ensure_loaded(&mut self, language: Language) -> Result<(), ParseError> {
    if self.parsers.contains_key(&language) {
      return Ok(());
    }
    let grammar = Self::grammar_for(language).ok_or(ParseError::UnsupportedLanguage(language))?;
    let mut parser = Parser::new();
    parser.set_language(&grammar).map_err(|_| ParseError::UnsupportedLanguage(language))?;
    self.parsers.insert(language, parser);
    Ok(())
  }

  fn grammar_for(language: Language) -> Option<TsLanguage> {
    match language {
      Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
      Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
      Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
      Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
      Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
      Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
      Language::C => Some(tree_sitter_c::LANGUAGE.into()),
      Language::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
      Language::Other => None,
    }
  }
}
