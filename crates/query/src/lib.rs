//! `find_code` query pipeline: embedding-aware strategy selection, dense/sparse/hybrid/keyword
//! search dispatch, reranking, and token-budget response packing, plus the health-query
//! interface's computed payload.

pub mod error;
pub mod health;
pub mod pipeline;
pub mod reranker;

pub use error::QueryError;
pub use health::{HealthSnapshot, OverallStatus, ServiceHealth};
pub use pipeline::{FindCodeRequest, QueryPipeline};
pub use reranker::{LexicalOverlapReranker, NoopReranker, RerankError, Reranker};
