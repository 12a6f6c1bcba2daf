//! Health-check metrics.
//!
//! Counters are lock-free so the health loop, lifecycle callbacks and
//! scheduled pre-checks can all record into the same [`CheckMetrics`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::events::CheckTrigger;

/// Point-in-time view of [`CheckMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckStats {
    /// Total number of checks.
    pub count: u64,
    /// Checks where the bridge accepted the credential.
    pub success_count: u64,
    /// Checks that failed for any reason.
    pub failure_count: u64,
    /// Checks started by the periodic loop.
    pub periodic_count: u64,
    /// Checks started by a foreground transition.
    pub foreground_count: u64,
    /// Checks started explicitly.
    pub forced_count: u64,
    /// Total duration of all checks.
    pub total_duration_ms: u64,
    /// Fastest check.
    pub min_duration_ms: Option<u64>,
    /// Slowest check.
    pub max_duration_ms: Option<u64>,
    /// Average check duration.
    pub avg_duration_ms: Option<f64>,
}

/// Thread-safe health-check counters.
#[derive(Debug)]
pub struct CheckMetrics {
    count: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    periodic_count: AtomicU64,
    foreground_count: AtomicU64,
    forced_count: AtomicU64,
    total_duration_ms: AtomicU64,
    min_duration_ms: AtomicU64,
    max_duration_ms: AtomicU64,
}

impl Default for CheckMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckMetrics {
    /// Create empty metrics.
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            periodic_count: AtomicU64::new(0),
            foreground_count: AtomicU64::new(0),
            forced_count: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            min_duration_ms: AtomicU64::new(u64::MAX),
            max_duration_ms: AtomicU64::new(0),
        }
    }

    /// Record a finished check.
    pub fn record(&self, trigger: CheckTrigger, success: bool, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        if success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
        }
        let by_trigger = match trigger {
            CheckTrigger::Periodic => &self.periodic_count,
            CheckTrigger::Foreground => &self.foreground_count,
            CheckTrigger::Forced => &self.forced_count,
        };
        by_trigger.fetch_add(1, Ordering::Relaxed);
        self.total_duration_ms.fetch_add(ms, Ordering::Relaxed);
        self.min_duration_ms.fetch_min(ms, Ordering::Relaxed);
        self.max_duration_ms.fetch_max(ms, Ordering::Relaxed);
    }

    /// Number of checks recorded so far.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Get a snapshot of the current metrics.
    pub fn snapshot(&self) -> CheckStats {
        let count = self.count.load(Ordering::Relaxed);
        let total_duration_ms = self.total_duration_ms.load(Ordering::Relaxed);
        let min = self.min_duration_ms.load(Ordering::Relaxed);
        let max = self.max_duration_ms.load(Ordering::Relaxed);

        CheckStats {
            count,
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            periodic_count: self.periodic_count.load(Ordering::Relaxed),
            foreground_count: self.foreground_count.load(Ordering::Relaxed),
            forced_count: self.forced_count.load(Ordering::Relaxed),
            total_duration_ms,
            min_duration_ms: (min != u64::MAX).then_some(min),
            max_duration_ms: (count > 0).then_some(max),
            avg_duration_ms: (count > 0).then(|| total_duration_ms as f64 / count as f64),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        for counter in [
            &self.count,
            &self.success_count,
            &self.failure_count,
            &self.periodic_count,
            &self.foreground_count,
            &self.forced_count,
            &self.total_duration_ms,
            &self.max_duration_ms,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.min_duration_ms.store(u64::MAX, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_success_and_failure() {
        let metrics = CheckMetrics::new();
        metrics.record(CheckTrigger::Periodic, true, Duration::from_millis(100));
        metrics.record(CheckTrigger::Forced, false, Duration::from_millis(300));

        let stats = metrics.snapshot();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.failure_count, 1);
        assert_eq!(stats.periodic_count, 1);
        assert_eq!(stats.forced_count, 1);
        assert_eq!(stats.min_duration_ms, Some(100));
        assert_eq!(stats.max_duration_ms, Some(300));
        assert_eq!(stats.avg_duration_ms, Some(200.0));
    }

    #[test]
    fn test_empty_snapshot() {
        let stats = CheckMetrics::new().snapshot();
        assert_eq!(stats, CheckStats::default());
    }

    #[test]
    fn test_reset() {
        let metrics = CheckMetrics::new();
        metrics.record(CheckTrigger::Foreground, true, Duration::from_millis(5));
        metrics.reset();
        assert_eq!(metrics.snapshot(), CheckStats::default());
    }
}
