use codeweaver_core::Language;
use thiserror::Error;

/// Failure modes a chunker can raise. Per, `ParseError` and `OversizedChunkError` are
/// recovered locally (the caller falls back to [`crate::delimiter::DelimiterChunker`]); the
/// governor-raised variants and `BinaryFileError` are recorded and the file is skipped, but
/// never abort the overall indexing run.
#[derive(Debug, Error)]
pub enum ChunkerError {
  #[error("AST could not be built: {0}")]
  Parse(#[from] codeweaver_parser::ParseError),
  #[error("node at line {line} has no chunkable children and exceeds the token limit")]
  OversizedChunk { line: u32 },
  #[error("chunking of this file exceeded its {0:?} budget")]
  ChunkingTimeout(std::time::Duration),
  #[error("chunk count for this file exceeded the {0} ceiling")]
  ChunkLimitExceeded(usize),
  #[error("AST nesting depth exceeded the {0} ceiling")]
  ASTDepthExceeded(u32),
  #[error("refusing to chunk binary content")]
  BinaryFile,
  #[error("language {0:?} has no chunker implementation")]
  UnsupportedLanguage(Language),
}

impl ChunkerError {
  /// Whether this failure should cause the selector to retry with
  /// [`crate::delimiter::DelimiterChunker`] over the same byte range, rather than skip the
  /// file outright.
  pub fn falls_back_to_delimiter(&self) -> bool {
    matches!(self, ChunkerError::Parse(_) | ChunkerError::OversizedChunk {.. })
  }
}
