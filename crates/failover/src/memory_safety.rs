//! Pre-flight memory-safety check run before activating the in-memory backup. Modeled on nothing in the teacher — the teacher has no backup store at
//! all — so this follows the spec's formula directly.

const BYTES_PER_CHUNK_ESTIMATE: u64 = 5 * 1024;
const BASE_OVERHEAD_BYTES: u64 = 500 * 1024 * 1024;
const YELLOW_FLOOR_BYTES: u64 = 500 * 1024 * 1024;
const RED_FLOOR_BYTES: u64 = 2_500 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryZone {
  Green,
  Yellow,
  Red,
}

/// `chunk_count_estimate * per_chunk_bytes(~5 KiB) * 2 + 500 MiB`, exactly as specifies.
/// The `* 2` covers holding both the backup store's copy and the point still in flight from
/// the primary scroll that seeded it.
pub fn estimate_bytes(chunk_count_estimate: u64) -> u64 {
  chunk_count_estimate.saturating_mul(BYTES_PER_CHUNK_ESTIMATE).saturating_mul(2).saturating_add(BASE_OVERHEAD_BYTES)
}

pub fn classify(estimated_bytes: u64) -> MemoryZone {
  if estimated_bytes < YELLOW_FLOOR_BYTES {
    MemoryZone::Green
  } else if estimated_bytes <= RED_FLOOR_BYTES {
    MemoryZone::Yellow
  } else {
    MemoryZone::Red
  }
}

/// Rough fallback when no manifest is available yet: assume an average chunk count per
/// file, matching the spec's "chunk count is taken from the manifest if available, otherwise
/// estimated from file count".
pub fn estimate_chunk_count_from_files(file_count: u64) -> u64 {
  const AVG_CHUNKS_PER_FILE: u64 = 8;
  file_count.saturating_mul(AVG_CHUNKS_PER_FILE)
}

/// Pre-flight decision: `Ok(())` permits activation, `Err(reason)` refuses it. Green always
/// passes. Yellow passes unless the caller supplies a known-available-RAM figure that the
/// estimate would exceed. Red refuses unless `max_memory_mb` explicitly covers the estimate.
pub fn check_activation(chunk_count_estimate: u64, available_ram_bytes: Option<u64>, max_memory_mb: Option<u64>) -> Result<(), String> {
  let estimated = estimate_bytes(chunk_count_estimate);
  match classify(estimated) {
    MemoryZone::Green => Ok(()),
    MemoryZone::Yellow => match available_ram_bytes {
      Some(available) if available < estimated => {
        Err(format!("estimated backup size {estimated} bytes exceeds available RAM {available} bytes"))
      }
      _ => Ok(()),
    },
    MemoryZone::Red => {
      let allowed = max_memory_mb.map(|mb| mb.saturating_mul(1024 * 1024)).unwrap_or(0);
      if allowed >= estimated {
        Ok(())
      } else {
        Err(format!(
            "estimated backup size {estimated} bytes is in the red zone (> {RED_FLOOR_BYTES} bytes); \
            free memory, point at a remote vector store, shrink the index, or raise max_memory_mb"
          ))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn small_index_is_green() {
    assert_eq!(classify(estimate_bytes(1_000)), MemoryZone::Green);
  }

  #[test]
  fn huge_index_is_red_and_refused_without_override() {
    // S5: ~800,000 chunks.
    let estimate = estimate_bytes(800_000);
    assert_eq!(classify(estimate), MemoryZone::Red);
    assert!(check_activation(800_000, None, Some(2048)).is_err());
  }

  #[test]
  fn red_zone_permitted_with_sufficient_max_memory_override() {
    let estimate = estimate_bytes(800_000);
    let allowed_mb = estimate / (1024 * 1024) + 1;
    assert!(check_activation(800_000, None, Some(allowed_mb)).is_ok());
  }

  #[test]
  fn yellow_zone_refused_when_available_ram_insufficient() {
    // Pick a chunk count that lands in the yellow band.
    let chunk_count = 100_000;
    assert_eq!(classify(estimate_bytes(chunk_count)), MemoryZone::Yellow);
    assert!(check_activation(chunk_count, Some(1), None).is_err());
    assert!(check_activation(chunk_count, Some(u64::MAX), None).is_ok());
  }

  #[test]
  fn file_count_fallback_is_a_reasonable_proxy() {
    assert_eq!(estimate_chunk_count_from_files(100), 800);
  }
}
