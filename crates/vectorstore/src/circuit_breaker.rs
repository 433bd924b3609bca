use std::sync::Mutex;
use std::time::{Duration, Instant};

use codeweaver_core::Statistics;
use tracing::{info, warn};

use crate::error::VectorStoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
  Closed,
  Open,
  HalfOpen,
}

struct Inner {
  state: BreakerState,
  consecutive_failures: u32,
  opened_at: Option<Instant>,
}

/// Per-: CLOSED -> OPEN after `failure_threshold` consecutive counted failures; OPEN ->
/// HALF_OPEN after `cooldown`; HALF_OPEN -> CLOSED on one success, HALF_OPEN -> OPEN on any
/// failure. One instance guards one `VectorStore`; `QdrantStore` and `InMemoryBackupStore`
/// both hold one so `FailoverManager` can watch either's state uniformly.
pub struct CircuitBreaker {
  inner: Mutex<Inner>,
  failure_threshold: u32,
  cooldown: Duration,
}

impl CircuitBreaker {
  pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
    Self {
      inner: Mutex::new(Inner {
          state: BreakerState::Closed,
          consecutive_failures: 0,
          opened_at: None,
        }),
      failure_threshold,
      cooldown,
    }
  }

  /// Current state, resolving an expired OPEN cooldown into HALF_OPEN as a side effect —
  /// mirrors how the real breaker is always consulted right before attempting a call.
  pub fn state(&self) -> BreakerState {
    let mut guard = self.inner.lock().unwrap();
    if guard.state == BreakerState::Open {
      if let Some(opened_at) = guard.opened_at {
        if opened_at.elapsed() >= self.cooldown {
          guard.state = BreakerState::HalfOpen;
        }
      }
    }
    guard.state
  }

  /// Whether a call should be attempted at all (OPEN with cooldown still running refuses).
  pub fn allow_request(&self) -> bool {
    self.state() != BreakerState::Open
  }

  pub fn record_success(&self, stats: &Statistics) {
    let mut guard = self.inner.lock().unwrap();
    let was_open_class = guard.state != BreakerState::Closed;
    guard.state = BreakerState::Closed;
    guard.consecutive_failures = 0;
    guard.opened_at = None;
    if was_open_class {
      info!("vector store circuit breaker closed after successful probe");
      stats.vector_store().breaker_closed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
  }

  pub fn record_failure(&self, err: &VectorStoreError, stats: &Statistics) {
    if !err.counts_toward_breaker() {
      return;
    }
    let mut guard = self.inner.lock().unwrap();
    match guard.state {
      BreakerState::HalfOpen => {
        warn!(error = %err, "vector store probe failed during half-open state, reopening breaker");
        guard.state = BreakerState::Open;
        guard.opened_at = Some(Instant::now());
        stats.vector_store().breaker_opened.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
      }
      BreakerState::Closed => {
        guard.consecutive_failures += 1;
        if guard.consecutive_failures >= self.failure_threshold {
          warn!(failures = guard.consecutive_failures, "vector store circuit breaker opening");
          guard.state = BreakerState::Open;
          guard.opened_at = Some(Instant::now());
          stats.vector_store().breaker_opened.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
      }
      BreakerState::Open => {}
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn opens_after_threshold_consecutive_failures() {
    let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
    let stats = Statistics::new();
    for _ in 0..2 {
      breaker.record_failure(&VectorStoreError::Connection("refused".into()), &stats);
      assert_eq!(breaker.state(), BreakerState::Closed);
    }
    breaker.record_failure(&VectorStoreError::Connection("refused".into()), &stats);
    assert_eq!(breaker.state(), BreakerState::Open);
  }

  #[test]
  fn authentication_failures_do_not_count() {
    let breaker = CircuitBreaker::new(1, Duration::from_secs(30));
    let stats = Statistics::new();
    breaker.record_failure(&VectorStoreError::Authentication("bad key".into()), &stats);
    assert_eq!(breaker.state(), BreakerState::Closed);
  }

  #[test]
  fn transitions_to_half_open_after_cooldown() {
    let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
    let stats = Statistics::new();
    breaker.record_failure(&VectorStoreError::Connection("refused".into()), &stats);
    assert_eq!(breaker.state(), BreakerState::Open);
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(breaker.state(), BreakerState::HalfOpen);
  }

  #[test]
  fn half_open_failure_reopens() {
    let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
    let stats = Statistics::new();
    breaker.record_failure(&VectorStoreError::Connection("refused".into()), &stats);
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(breaker.state(), BreakerState::HalfOpen);
    breaker.record_failure(&VectorStoreError::Connection("refused".into()), &stats);
    assert_eq!(breaker.state(), BreakerState::Open);
  }

  #[test]
  fn half_open_success_closes() {
    let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
    let stats = Statistics::new();
    breaker.record_failure(&VectorStoreError::Connection("refused".into()), &stats);
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(breaker.state(), BreakerState::HalfOpen);
    breaker.record_success(&stats);
    assert_eq!(breaker.state(), BreakerState::Closed);
  }
}
