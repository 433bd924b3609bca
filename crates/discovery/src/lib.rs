//! Project-tree walking: gitignore-aware, size- and binary-probe-gated file discovery.

pub mod error;
pub mod ignore;
pub mod walker;

pub use error::DiscoveryError;
pub use ignore::GitignoreCache;
pub use walker::FileDiscovery;
