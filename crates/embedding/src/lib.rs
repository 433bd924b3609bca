pub mod ollama;
pub mod openrouter;
pub mod provider;
pub mod rate_limit;
pub mod resilient;
pub mod sparse;

pub use ollama::{OllamaHealthStatus, OllamaProvider};
pub use openrouter::OpenRouterProvider;
pub use provider::{EmbeddingError, EmbeddingProvider, SparseEmbeddingProvider, SparseVector};
pub use rate_limit::{RateLimitConfig, RateLimitedProvider, SlidingWindowLimiter, wrap_rate_limited};
pub use resilient::{ResilientProvider, RetryConfig, is_retryable_error, wrap_resilient, wrap_resilient_arc};
pub use sparse::HashingSparseProvider;
