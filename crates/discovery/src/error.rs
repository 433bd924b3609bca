use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
  #[error("project root {0} does not exist or is not a directory")]
  InvalidRoot(std::path::PathBuf),
}
