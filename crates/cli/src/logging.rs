//! Console logging setup for the demonstration binary, adapted from the daemon/CLI logging
//! split the indexing core was originally paired with: no file rotation here since this
//! binary never backgrounds itself, just the env-filter-over-config-level pattern.

use codeweaver_core::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

fn parse_level(level: &str) -> tracing::Level {
  match level.to_lowercase().as_str() {
    "off" | "error" => tracing::Level::ERROR,
    "warn" => tracing::Level::WARN,
    "debug" => tracing::Level::DEBUG,
    "trace" => tracing::Level::TRACE,
    _ => tracing::Level::INFO,
  }
}

/// Initializes a console subscriber at `config.level`, overridable via `RUST_LOG`.
pub fn init(config: &LoggingConfig) {
  let env_filter = EnvFilter::builder()
    .with_default_directive(parse_level(&config.level).into())
    .from_env_lossy();

  tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).init();
}
