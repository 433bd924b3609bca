pub mod error;
pub mod manager;
pub mod memory_safety;
pub mod state;

pub use error::FailoverError;
pub use manager::{AvailableMemorySource, ChunkCountSource, FailoverManager, UnknownMemory};
pub use memory_safety::{MemoryZone, check_activation, classify, estimate_bytes, estimate_chunk_count_from_files};
pub use state::{ActiveStore, FailoverState};
