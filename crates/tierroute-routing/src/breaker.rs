//! Primary breaker
//!
//! Tracks connection failures of the primary and blocks it for a fixed period
//! once a failure threshold is reached. There are two states:
//! - Closed: failures accumulate, the primary is tried first
//! - Open: `now < blocked_until`, fallback-eligible requests skip the primary
//!
//! State transitions:
//! - Closed → Open: the failure that brings the count to the threshold
//! - Open → Closed: implicitly, once the deadline passes
//!
//! The state is never stored as a flag. "Open" is re-derived from the deadline
//! on every read, so there is no transition event that could race. Successful
//! connections do not reset the failure count.

use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use crate::config::FailoverConfig;

/// Result of recording one failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The failure was counted, the breaker stays closed
    Counted { failures: u32 },
    /// This failure reached the threshold and opened the breaker
    Opened { blocked_until: u64 },
}

impl FailureOutcome {
    pub fn opened(&self) -> bool {
        matches!(self, FailureOutcome::Opened { .. })
    }
}

/// Breaker bookkeeping shared by every caller of one router
#[derive(Debug)]
pub struct BreakerState {
    failure_threshold: AtomicI32,
    block_duration_ms: AtomicU64,
    failure_count: AtomicU32,
    /// Milliseconds since the Unix epoch; 0 means never blocked
    blocked_until: AtomicU64,
}

impl BreakerState {
    pub fn new(config: &FailoverConfig) -> Self {
        Self {
            failure_threshold: AtomicI32::new(config.failure_threshold),
            block_duration_ms: AtomicU64::new(config.block_duration_ms),
            failure_count: AtomicU32::new(0),
            blocked_until: AtomicU64::new(0),
        }
    }

    /// Whether the primary is blocked at `now_millis`
    pub fn is_open_at(&self, now_millis: u64) -> bool {
        now_millis < self.blocked_until.load(Ordering::Acquire)
    }

    /// Count one primary failure observed at `now_millis`.
    ///
    /// The increment, the threshold check and the reset to zero happen in a
    /// single compare-and-swap loop, so when several callers cross the
    /// threshold together exactly one of them observes `Opened`.
    pub fn record_failure(&self, now_millis: u64) -> FailureOutcome {
        let threshold = self.failure_threshold.load(Ordering::Acquire);
        let reaches_threshold = |failures: u32| threshold > 0 && failures >= threshold as u32;

        let previous = match self.failure_count.fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |current| {
                let next = current.saturating_add(1);
                Some(if reaches_threshold(next) { 0 } else { next })
            },
        ) {
            Ok(previous) | Err(previous) => previous,
        };

        let failures = previous.saturating_add(1);
        if !reaches_threshold(failures) {
            return FailureOutcome::Counted { failures };
        }

        let blocked_until =
            now_millis.saturating_add(self.block_duration_ms.load(Ordering::Acquire));
        self.blocked_until.fetch_max(blocked_until, Ordering::AcqRel);

        FailureOutcome::Opened { blocked_until }
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Acquire)
    }

    /// Deadline in milliseconds since the Unix epoch (0 if never opened)
    pub fn blocked_until(&self) -> u64 {
        self.blocked_until.load(Ordering::Acquire)
    }

    pub fn failure_threshold(&self) -> i32 {
        self.failure_threshold.load(Ordering::Acquire)
    }

    pub fn block_duration(&self) -> Duration {
        Duration::from_millis(self.block_duration_ms.load(Ordering::Acquire))
    }

    pub fn set_failure_threshold(&self, threshold: i32) {
        self.failure_threshold.store(threshold, Ordering::Release);
    }

    pub fn set_block_duration(&self, duration: Duration) {
        self.block_duration_ms
            .store(duration.as_millis() as u64, Ordering::Release);
    }

    /// Apply new settings and clear all accumulated state
    pub fn reset(&self, config: &FailoverConfig) {
        self.set_failure_threshold(config.failure_threshold);
        self.block_duration_ms
            .store(config.block_duration_ms, Ordering::Release);
        self.failure_count.store(0, Ordering::Release);
        self.blocked_until.store(0, Ordering::Release);
    }
}

impl Default for BreakerState {
    fn default() -> Self {
        Self::new(&FailoverConfig::default())
    }
}
