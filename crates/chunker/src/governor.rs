use std::time::{Duration, Instant};

use crate::error::ChunkerError;

/// Enforces the per-file resource budget shared by both chunkers: wall-clock timeout, chunk
/// count ceiling, and AST depth ceiling. One governor is constructed per file and threaded
/// through the walk; `check_timeout` is meant to be called periodically (once per visited
/// node), not just at the end, so a pathological file is interrupted promptly rather than
/// after it has already produced thousands of chunks.
#[derive(Debug)]
pub struct ChunkGovernor {
  started_at: Instant,
  timeout: Duration,
  max_chunks: usize,
  max_depth: u32,
  chunks_emitted: usize,
}

impl ChunkGovernor {
  pub fn new(timeout: Duration, max_chunks: usize, max_depth: u32) -> Self {
    Self {
      started_at: Instant::now(),
      timeout,
      max_chunks,
      max_depth,
      chunks_emitted: 0,
    }
  }

  pub fn check_timeout(&self) -> Result<(), ChunkerError> {
    if self.started_at.elapsed() > self.timeout {
      return Err(ChunkerError::ChunkingTimeout(self.timeout));
    }
    Ok(())
  }

  pub fn check_depth(&self, depth: u32) -> Result<(), ChunkerError> {
    if depth > self.max_depth {
      return Err(ChunkerError::ASTDepthExceeded(self.max_depth));
    }
    Ok(())
  }

  /// Records one emitted chunk and fails once the ceiling is crossed.
  pub fn record_chunk(&mut self) -> Result<(), ChunkerError> {
    self.chunks_emitted += 1;
    if self.chunks_emitted > self.max_chunks {
      return Err(ChunkerError::ChunkLimitExceeded(self.max_chunks));
    }
    Ok(())
  }

  pub fn chunks_emitted(&self) -> usize {
    self.chunks_emitted
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn trips_chunk_limit() {
    let mut governor = ChunkGovernor::new(Duration::from_secs(30), 2, 200);
    governor.record_chunk().unwrap();
    governor.record_chunk().unwrap();
    assert!(governor.record_chunk().is_err());
  }

  #[test]
  fn trips_depth_limit() {
    let governor = ChunkGovernor::new(Duration::from_secs(30), 4096, 3);
    assert!(governor.check_depth(3).is_ok());
    assert!(governor.check_depth(4).is_err());
  }

  #[test]
  fn trips_timeout() {
    let governor = ChunkGovernor::new(Duration::from_millis(0), 4096, 200);
    std::thread::sleep(Duration::from_millis(2));
    assert!(governor.check_timeout().is_err());
  }
}
