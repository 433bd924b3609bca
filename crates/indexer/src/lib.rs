//! End-to-end indexing orchestration for the CodeWeaver indexing core: discovery, chunking,
//! embedding, checkpointing, reconciliation, and the file watcher.

pub mod checkpoint;
pub mod error;
pub mod indexer;
pub mod watcher;

pub use checkpoint::{CheckpointManager, ProviderFingerprint, fingerprint_inputs};
pub use error::{FileFailure, IndexerError};
pub use indexer::{Indexer, IndexRunSummary, ManifestChunkCounts};
pub use watcher::{WatchError, run_watch_loop};
