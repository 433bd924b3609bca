use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Embedding providers recognized by configuration. The concrete HTTP client for each lives
/// in `codeweaver-embedding`; this enum only records the user's choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
  Voyage,
  OpenAi,
  Cohere,
  Google,
  Anthropic,
  Mistral,
  Bedrock,
  HuggingFace,
  FastEmbed,
  SentenceTransformers,
  OpenAiCompatible,
}

impl Default for EmbeddingProviderKind {
  fn default() -> Self {
    EmbeddingProviderKind::FastEmbed
  }
}

fn default_dense_model() -> String {
  "voyage-code-3".to_string()
}

fn default_dimension() -> usize {
  1024
}

fn default_timeout_ms() -> u64 {
  60_000
}

fn default_max_retries() -> u32 {
  5
}

fn default_max_connections() -> usize {
  100
}

fn default_keepalive_secs() -> u64 {
  5
}

fn default_in_flight_batches() -> usize {
  4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
  pub dense_provider: EmbeddingProviderKind,
  #[serde(default = "default_dense_model")]
  pub dense_model: String,
  #[serde(default = "default_dimension")]
  pub dense_dimension: usize,
  pub sparse_enabled: bool,
  pub base_url: Option<String>,
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  pub rate_limit_per_minute: Option<u32>,
  #[serde(default = "default_max_connections")]
  pub max_connections: usize,
  #[serde(default = "default_keepalive_secs")]
  pub keepalive_secs: u64,
  #[serde(default = "default_in_flight_batches")]
  pub max_in_flight_batches: usize,
}

impl Default for EmbeddingConfig {
  fn default() -> Self {
    Self {
      dense_provider: EmbeddingProviderKind::default(),
      dense_model: default_dense_model(),
      dense_dimension: default_dimension(),
      sparse_enabled: false,
      base_url: None,
      timeout_ms: default_timeout_ms(),
      max_retries: default_max_retries(),
      rate_limit_per_minute: None,
      max_connections: default_max_connections(),
      keepalive_secs: default_keepalive_secs(),
      max_in_flight_batches: default_in_flight_batches(),
    }
  }
}

fn default_collection_name() -> String {
  "codeweaver".to_string()
}

fn default_qdrant_url() -> String {
  "http://localhost:6334".to_string()
}

fn default_backup_sync_interval_secs() -> u64 {
  300
}

fn default_breaker_failure_threshold() -> u32 {
  3
}

fn default_breaker_cooldown_secs() -> u64 {
  30
}

fn default_restore_delay_secs() -> u64 {
  60
}

fn default_max_memory_mb() -> Option<u64> {
  None
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
  #[serde(default = "default_qdrant_url")]
  pub url: String,
  pub api_key: Option<String>,
  #[serde(default = "default_collection_name")]
  pub collection_name: String,
  #[serde(default = "default_breaker_failure_threshold")]
  pub breaker_failure_threshold: u32,
  #[serde(default = "default_breaker_cooldown_secs")]
  pub breaker_cooldown_secs: u64,
}

impl Default for VectorStoreConfig {
  fn default() -> Self {
    Self {
      url: default_qdrant_url(),
      api_key: None,
      collection_name: default_collection_name(),
      breaker_failure_threshold: default_breaker_failure_threshold(),
      breaker_cooldown_secs: default_breaker_cooldown_secs(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig {
  #[serde(default = "default_backup_sync_interval_secs")]
  pub backup_sync_interval_secs: u64,
  #[serde(default = "default_restore_delay_secs")]
  pub restore_delay_secs: u64,
  #[serde(default = "default_max_memory_mb")]
  pub max_memory_mb: Option<u64>,
  pub backup_file_path: Option<PathBuf>,
}

impl Default for FailoverConfig {
  fn default() -> Self {
    Self {
      backup_sync_interval_secs: default_backup_sync_interval_secs(),
      restore_delay_secs: default_restore_delay_secs(),
      max_memory_mb: default_max_memory_mb(),
      backup_file_path: None,
    }
  }
}

fn default_max_file_size_bytes() -> u64 {
  10 * 1024 * 1024
}

fn default_probe_bytes() -> usize {
  8192
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
  #[serde(default = "default_max_file_size_bytes")]
  pub max_file_size_bytes: u64,
  #[serde(default = "default_probe_bytes")]
  pub binary_probe_bytes: usize,
}

impl Default for DiscoveryConfig {
  fn default() -> Self {
    Self {
      max_file_size_bytes: default_max_file_size_bytes(),
      binary_probe_bytes: default_probe_bytes(),
    }
  }
}

fn default_target_lines() -> usize {
  50
}

fn default_min_lines() -> usize {
  10
}

fn default_max_lines() -> usize {
  150
}

fn default_importance_threshold() -> f32 {
  0.3
}

fn default_max_chunk_tokens() -> usize {
  512
}

fn default_max_ast_depth() -> u32 {
  200
}

fn default_chunk_timeout_secs() -> u64 {
  30
}

fn default_chunk_limit() -> usize {
  4096
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
  #[serde(default = "default_target_lines")]
  pub target_lines: usize,
  #[serde(default = "default_min_lines")]
  pub min_lines: usize,
  #[serde(default = "default_max_lines")]
  pub max_lines: usize,
  #[serde(default = "default_importance_threshold")]
  pub importance_threshold: f32,
  #[serde(default = "default_max_chunk_tokens")]
  pub max_chunk_tokens: usize,
  #[serde(default = "default_max_ast_depth")]
  pub max_ast_depth: u32,
  #[serde(default = "default_chunk_timeout_secs")]
  pub timeout_secs: u64,
  #[serde(default = "default_chunk_limit")]
  pub max_chunks_per_file: usize,
}

impl Default for ChunkerConfig {
  fn default() -> Self {
    Self {
      target_lines: default_target_lines(),
      min_lines: default_min_lines(),
      max_lines: default_max_lines(),
      importance_threshold: default_importance_threshold(),
      max_chunk_tokens: default_max_chunk_tokens(),
      max_ast_depth: default_max_ast_depth(),
      timeout_secs: default_chunk_timeout_secs(),
      max_chunks_per_file: default_chunk_limit(),
    }
  }
}

fn default_checkpoint_interval_secs() -> u64 {
  30
}

fn default_parallel_files() -> usize {
  4
}

fn default_batch_files() -> usize {
  32
}

fn default_batch_chunks() -> usize {
  512
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
  #[serde(default = "default_checkpoint_interval_secs")]
  pub checkpoint_interval_secs: u64,
  #[serde(default = "default_parallel_files")]
  pub parallel_files: usize,
  #[serde(default = "default_batch_files")]
  pub batch_files: usize,
  #[serde(default = "default_batch_chunks")]
  pub batch_chunks: usize,
}

impl Default for IndexConfig {
  fn default() -> Self {
    Self {
      checkpoint_interval_secs: default_checkpoint_interval_secs(),
      parallel_files: default_parallel_files(),
      batch_files: default_batch_files(),
      batch_chunks: default_batch_chunks(),
    }
  }
}

fn default_debounce_ms() -> u64 {
  500
}

fn default_poll_interval_secs() -> u64 {
  2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
  #[serde(default = "default_debounce_ms")]
  pub debounce_ms: u64,
  #[serde(default = "default_poll_interval_secs")]
  pub poll_interval_seconds: u64,
}

impl Default for WatcherConfig {
  fn default() -> Self {
    Self {
      debounce_ms: default_debounce_ms(),
      poll_interval_seconds: default_poll_interval_secs(),
    }
  }
}

fn default_token_budget() -> usize {
  30_000
}

fn default_candidate_multiplier() -> usize {
  3
}

fn default_final_k() -> usize {
  10
}

fn default_query_timeout_secs() -> u64 {
  15
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
  #[serde(default = "default_token_budget")]
  pub token_budget: usize,
  #[serde(default = "default_candidate_multiplier")]
  pub candidate_multiplier: usize,
  #[serde(default = "default_final_k")]
  pub final_k: usize,
  #[serde(default = "default_query_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for QueryConfig {
  fn default() -> Self {
    Self {
      token_budget: default_token_budget(),
      candidate_multiplier: default_candidate_multiplier(),
      final_k: default_final_k(),
      timeout_secs: default_query_timeout_secs(),
    }
  }
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_log_rotation() -> String {
  "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  #[serde(default = "default_log_level")]
  pub level: String,
  #[serde(default = "default_log_rotation")]
  pub rotation: String,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      rotation: default_log_rotation(),
    }
  }
}

/// The effective, resolved settings snapshot the indexing core consumes. This is the
/// concrete type whose canonical-JSON form feeds `codeweaver_core::fingerprint`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerSettings {
  pub discovery: DiscoveryConfig,
  pub chunker: ChunkerConfig,
  pub embedding: EmbeddingConfig,
  pub vector_store: VectorStoreConfig,
  pub failover: FailoverConfig,
  pub index: IndexConfig,
  pub watcher: WatcherConfig,
  pub query: QueryConfig,
  pub logging: LoggingConfig,
}

const CONFIG_FILE_NAME: &str = "codeweaver.toml";

impl IndexerSettings {
  /// Project file, then user config dir, then built-in defaults — the same precedence order
  /// as the teacher's `Config::load_for_project()`.
  pub fn load_for_project(project_root: &Path) -> Self {
    let project_config = project_root.join(".codeweaver").join(CONFIG_FILE_NAME);
    if let Ok(contents) = std::fs::read_to_string(&project_config)
    && let Ok(settings) = toml::from_str(&contents)
    {
      return settings;
    }

    if let Some(config_dir) = dirs::config_dir() {
      let user_config = config_dir.join("codeweaver").join(CONFIG_FILE_NAME);
      if let Ok(contents) = std::fs::read_to_string(&user_config)
      && let Ok(settings) = toml::from_str(&contents)
      {
        return settings;
      }
    }

    Self::default()
  }

  /// The JSON-compatible subset of settings that feeds the checkpoint fingerprint:
  /// everything fingerprinted is here and computed/derived fields (nothing in this struct is
  /// computed) and live object references (none are held here) are excluded by construction.
  pub fn fingerprint_value(&self) -> serde_json::Value {
    serde_json::to_value(self).expect("IndexerSettings is always JSON-serializable")
  }

  /// Emit a fully commented TOML template, mirroring the teacher's `generate_template`.
  pub fn generate_template() -> String {
    let defaults = Self::default();
    format!(
      r#"# CodeWeaver indexer configuration

      [discovery]
      # Files larger than this are skipped outright.
      max_file_size_bytes = {max_file_size_bytes}
      # Bytes read from the head of a file to probe for binary content.
      binary_probe_bytes = {binary_probe_bytes}

      [chunker]
      target_lines = {target_lines}
      min_lines = {min_lines}
      max_lines = {max_lines}
      importance_threshold = {importance_threshold}
      max_chunk_tokens = {max_chunk_tokens}
      max_ast_depth = {max_ast_depth}
      timeout_secs = {chunk_timeout_secs}
      max_chunks_per_file = {max_chunks_per_file}

      [embedding]
      dense_provider = "fastembed"
      dense_model = "{dense_model}"
      dense_dimension = {dense_dimension}
      sparse_enabled = {sparse_enabled}
      timeout_ms = {embed_timeout_ms}
      max_retries = {embed_max_retries}
      max_connections = {embed_max_connections}
      keepalive_secs = {embed_keepalive_secs}
      max_in_flight_batches = {embed_in_flight}

      [vector_store]
      url = "{vs_url}"
      collection_name = "{vs_collection}"
      breaker_failure_threshold = {breaker_failure_threshold}
      breaker_cooldown_secs = {breaker_cooldown_secs}

      [failover]
      backup_sync_interval_secs = {backup_sync_interval_secs}
      restore_delay_secs = {restore_delay_secs}

      [index]
      checkpoint_interval_secs = {checkpoint_interval_secs}
      parallel_files = {parallel_files}
      batch_files = {batch_files}
      batch_chunks = {batch_chunks}

      [watcher]
      debounce_ms = {debounce_ms}
      poll_interval_seconds = {poll_interval_seconds}

      [query]
      token_budget = {token_budget}
      candidate_multiplier = {candidate_multiplier}
      final_k = {final_k}
      timeout_secs = {query_timeout_secs}

      [logging]
      level = "{log_level}"
      rotation = "{log_rotation}"
      "#,
      max_file_size_bytes = defaults.discovery.max_file_size_bytes,
      binary_probe_bytes = defaults.discovery.binary_probe_bytes,
      target_lines = defaults.chunker.target_lines,
      min_lines = defaults.chunker.min_lines,
      max_lines = defaults.chunker.max_lines,
      importance_threshold = defaults.chunker.importance_threshold,
      max_chunk_tokens = defaults.chunker.max_chunk_tokens,
      max_ast_depth = defaults.chunker.max_ast_depth,
      chunk_timeout_secs = defaults.chunker.timeout_secs,
      max_chunks_per_file = defaults.chunker.max_chunks_per_file,
      dense_model = defaults.embedding.dense_model,
      dense_dimension = defaults.embedding.dense_dimension,
      sparse_enabled = defaults.embedding.sparse_enabled,
      embed_timeout_ms = defaults.embedding.timeout_ms,
      embed_max_retries = defaults.embedding.max_retries,
      embed_max_connections = defaults.embedding.max_connections,
      embed_keepalive_secs = defaults.embedding.keepalive_secs,
      embed_in_flight = defaults.embedding.max_in_flight_batches,
      vs_url = defaults.vector_store.url,
      vs_collection = defaults.vector_store.collection_name,
      breaker_failure_threshold = defaults.vector_store.breaker_failure_threshold,
      breaker_cooldown_secs = defaults.vector_store.breaker_cooldown_secs,
      backup_sync_interval_secs = defaults.failover.backup_sync_interval_secs,
      restore_delay_secs = defaults.failover.restore_delay_secs,
      checkpoint_interval_secs = defaults.index.checkpoint_interval_secs,
      parallel_files = defaults.index.parallel_files,
      batch_files = defaults.index.batch_files,
      batch_chunks = defaults.index.batch_chunks,
      debounce_ms = defaults.watcher.debounce_ms,
      poll_interval_seconds = defaults.watcher.poll_interval_seconds,
      token_budget = defaults.query.token_budget,
      candidate_multiplier = defaults.query.candidate_multiplier,
      final_k = defaults.query.final_k,
      query_timeout_secs = defaults.query.timeout_secs,
      log_level = defaults.logging.level,
      log_rotation = defaults.logging.rotation,
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_round_trip_through_toml() {
    let settings = IndexerSettings::default();
    let toml_str = toml::to_string(&settings).unwrap();
    let parsed: IndexerSettings = toml::from_str(&toml_str).unwrap();
    assert_eq!(parsed.chunker.target_lines, settings.chunker.target_lines);
  }

  #[test]
  fn template_parses_back_to_defaults() {
    let template = IndexerSettings::generate_template();
    let parsed: IndexerSettings = toml::from_str(&template).unwrap();
    let defaults = IndexerSettings::default();
    assert_eq!(parsed.chunker.target_lines, defaults.chunker.target_lines);
    assert_eq!(parsed.vector_store.collection_name, defaults.vector_store.collection_name);
  }

  #[test]
  fn load_for_project_falls_back_to_defaults_when_absent() {
    let dir = tempfile::tempdir().unwrap();
    let settings = IndexerSettings::load_for_project(dir.path());
    assert_eq!(settings.chunker.target_lines, IndexerSettings::default().chunker.target_lines);
  }

  #[test]
  fn load_for_project_reads_project_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join(".codeweaver");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join(CONFIG_FILE_NAME), "[chunker]\ntarget_lines = 99\n").unwrap();
    let settings = IndexerSettings::load_for_project(dir.path());
    assert_eq!(settings.chunker.target_lines, 99);
  }

  #[test]
  fn fingerprint_value_is_stable_for_unchanged_settings() {
    let a = IndexerSettings::default().fingerprint_value();
    let b = IndexerSettings::default().fingerprint_value();
    assert_eq!(a, b);
  }
}
