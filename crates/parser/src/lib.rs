//! Tree-sitter based AST parsing and per-language node classification.
//!
//! This crate owns the parse step only: building a [`tree_sitter::Tree`] for a language and
//! mapping its node kinds onto the abstract classifications `codeweaver-chunker`'s
//! `SemanticChunker` reasons about. The AST walk itself, the importance-threshold decision,
//! and dedup all live in `codeweaver-chunker`.

pub mod ast;
pub mod classify;
pub mod error;

pub use ast::AstParser;
pub use classify::{classify_node, default_importance};
pub use error::ParseError;

pub use tree_sitter::{Node, Tree};
