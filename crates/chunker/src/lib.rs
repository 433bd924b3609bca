//! Chunking: AST-first with delimiter fallback, the content-addressed dedup store, and the
//! per-file resource governor that bounds both chunkers.

pub mod dedup;
pub mod delimiter;
pub mod error;
pub mod governor;
pub mod selector;
pub mod semantic;

pub use dedup::DedupStore;
pub use delimiter::DelimiterChunker;
pub use error::ChunkerError;
pub use governor::ChunkGovernor;
pub use selector::{ChunkerSelector, ChunkerTunables};
pub use semantic::{SemanticChunker, SemanticLimits};
