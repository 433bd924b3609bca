//! Health-query interface and `GET /health` payload shape. Binding an actual HTTP
//! socket is out of scope; this module only computes the data that surface would serve.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
  Ok,
  Degraded,
  Down,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
  pub vector_store: bool,
  pub embedding: bool,
  pub sparse_embedding: bool,
  pub reranker: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
  pub status: OverallStatus,
  pub services: ServiceHealth,
}

impl HealthSnapshot {
  /// Derives the `/health` payload: `down` if the vector store itself is unusable (no
  /// candidate search is possible at all), `degraded` if any configured-but-unhealthy
  /// service exists or the failover manager is currently serving off the backup store,
  /// `ok` otherwise. A service that was never configured is vacuously healthy — its absence
  /// doesn't degrade the system, it just narrows `QueryPipeline`'s strategy choice.
  pub fn compute(vector_store_usable: bool, backup_active: bool, embedding: Option<bool>, sparse_embedding: Option<bool>, reranker: Option<bool>) -> Self {
    let services = ServiceHealth {
      vector_store: vector_store_usable,
      embedding: embedding.unwrap_or(true),
      sparse_embedding: sparse_embedding.unwrap_or(true),
      reranker: reranker.unwrap_or(true),
    };

    let status = if !services.vector_store {
      OverallStatus::Down
    } else if backup_active || !services.embedding || !services.sparse_embedding || !services.reranker {
      OverallStatus::Degraded
    } else {
      OverallStatus::Ok
    };

    Self { status, services }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn all_healthy_is_ok() {
    let snap = HealthSnapshot::compute(true, false, Some(true), Some(true), Some(true));
    assert_eq!(snap.status, OverallStatus::Ok);
  }

  #[test]
  fn unconfigured_services_dont_degrade() {
    let snap = HealthSnapshot::compute(true, false, None, None, None);
    assert_eq!(snap.status, OverallStatus::Ok);
  }

  #[test]
  fn backup_active_is_degraded_even_if_everything_else_healthy() {
    let snap = HealthSnapshot::compute(true, true, Some(true), Some(true), Some(true));
    assert_eq!(snap.status, OverallStatus::Degraded);
  }

  #[test]
  fn unusable_vector_store_is_down() {
    let snap = HealthSnapshot::compute(false, false, Some(true), Some(true), Some(true));
    assert_eq!(snap.status, OverallStatus::Down);
  }
}
