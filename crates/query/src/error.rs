use thiserror::Error;

/// Fatal `QueryPipeline` construction/configuration failures. Per-request failures never reach this type — they are caught inside
/// [`crate::pipeline::QueryPipeline::find_code()`] and surfaced as warnings on an
/// otherwise-empty response instead, matching propagation rule: "any unrecovered error
/// yields an empty-results response... we never surface raw stack traces to the agent."
#[derive(Debug, Error)]
pub enum QueryError {
  #[error("query pipeline misconfigured: {0}")]
  Configuration(String),
}
