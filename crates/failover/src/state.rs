use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveStore {
  Primary,
  Backup,
}

/// `FailoverState` from : the externally observable snapshot of which store is serving
/// traffic and why. Cloned out to callers rather than handed out by reference, since the
/// manager keeps mutating its own copy behind a lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverState {
  pub active: ActiveStore,
  pub last_health_check: Option<DateTime<Utc>>,
  pub last_backup_sync: Option<DateTime<Utc>>,
  pub backup_file_present: bool,
  pub backup_file_bytes: u64,
  pub reason: Option<String>,
}

impl FailoverState {
  /// initial state: `PRIMARY_ACTIVE` if the primary initialized, otherwise
  /// `BACKUP_ACTIVE` with a warning attached.
  pub fn initial(primary_initialized: bool) -> Self {
    if primary_initialized {
      Self {
        active: ActiveStore::Primary,
        last_health_check: None,
        last_backup_sync: None,
        backup_file_present: false,
        backup_file_bytes: 0,
        reason: None,
      }
    } else {
      Self {
        active: ActiveStore::Backup,
        last_health_check: None,
        last_backup_sync: None,
        backup_file_present: false,
        backup_file_bytes: 0,
        reason: Some("primary did not initialize; starting on backup".to_string()),
      }
    }
  }
}
