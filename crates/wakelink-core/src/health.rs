//! Visibility-aware health checking.
//!
//! [`HealthChecker`] decides *when* the bridge connection is re-confirmed; the
//! confirmation itself is [`ConnectionStateMachine::revalidate`]. Checks are
//! throttled by elapsed time since the last check of any kind, so a sustained
//! outage costs one check per interval rather than one per poll:
//!
//! | App | Check at most every | Poll every |
//! |-----|---------------------|------------|
//! | visible | `foreground_interval` (5 min) | `foreground_poll` (1 min) |
//! | hidden | `background_interval` (30 min) | `background_poll` (10 min) |
//!
//! Failures are never retried inline; the next due check is the retry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use wakelink_types::ConnectionStatus;

use crate::config::HealthConfig;
use crate::connection::ConnectionStateMachine;
use crate::error::Result;
use crate::events::{BridgeEvent, CheckTrigger};
use crate::metrics::{CheckMetrics, CheckStats};

#[derive(Debug, Default)]
struct Timers {
    last_check_at: Option<Instant>,
    last_foreground_check_at: Option<Instant>,
    last_manual_check_at: Option<Instant>,
}

struct Inner {
    machine: ConnectionStateMachine,
    config: HealthConfig,
    visible: AtomicBool,
    timers: Mutex<Timers>,
    /// Wakes the loop early when visibility changes.
    wake: Notify,
    /// One check at a time.
    check_lock: tokio::sync::Mutex<()>,
    metrics: CheckMetrics,
}

/// Serializable view of the health checker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Whether the app is in the foreground.
    pub visible: bool,
    /// Current connection status.
    pub status: ConnectionStatus,
    /// Time since the last check of any kind.
    pub since_last_check: Option<Duration>,
    /// Time since the last foreground-triggered check.
    pub since_foreground_check: Option<Duration>,
    /// Time since the last explicitly requested check.
    pub since_manual_check: Option<Duration>,
    /// Check counters.
    pub checks: CheckStats,
}

/// Event-driven health-check loop.
///
/// Cloning is cheap; clones share timers and metrics.
#[derive(Clone)]
pub struct HealthChecker {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for HealthChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthChecker")
            .field("visible", &self.is_visible())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl HealthChecker {
    /// Create a checker for `machine`. The app starts out hidden.
    pub fn new(machine: ConnectionStateMachine, config: HealthConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                machine,
                config,
                visible: AtomicBool::new(false),
                timers: Mutex::new(Timers::default()),
                wake: Notify::new(),
                check_lock: tokio::sync::Mutex::new(()),
                metrics: CheckMetrics::new(),
            }),
        }
    }

    /// Whether the app is currently in the foreground.
    pub fn is_visible(&self) -> bool {
        self.inner.visible.load(Ordering::SeqCst)
    }

    /// Check counters.
    pub fn metrics(&self) -> &CheckMetrics {
        &self.inner.metrics
    }

    /// The app came to the foreground.
    ///
    /// Runs a check right away when more than `foreground_interval` has
    /// passed since the last foreground check. Returns whether a check ran.
    pub async fn on_foreground(&self) -> bool {
        self.inner.visible.store(true, Ordering::SeqCst);
        self.inner.wake.notify_one();

        let interval = self.inner.config.foreground_interval();
        let due = self
            .timers()
            .last_foreground_check_at
            .is_none_or(|at| at.elapsed() > interval);
        if !due || !self.has_connection() {
            trace!("Foreground check not due");
            return false;
        }

        debug!("App foregrounded, checking bridge");
        // Outcome is logged and published by run_check.
        let _ = self.run_check(CheckTrigger::Foreground).await;
        true
    }

    /// The app went to the background. Only slows the loop down.
    pub fn on_background(&self) {
        self.inner.visible.store(false, Ordering::SeqCst);
        self.inner.wake.notify_one();
        trace!("App backgrounded");
    }

    /// Run a check now, regardless of timers.
    pub async fn force_check(&self) -> Result<()> {
        self.run_check(CheckTrigger::Forced).await
    }

    /// Current timers and counters.
    pub fn snapshot(&self) -> HealthSnapshot {
        let timers = self.timers();
        HealthSnapshot {
            visible: self.is_visible(),
            status: self.inner.machine.state().status(),
            since_last_check: timers.last_check_at.map(|at| at.elapsed()),
            since_foreground_check: timers.last_foreground_check_at.map(|at| at.elapsed()),
            since_manual_check: timers.last_manual_check_at.map(|at| at.elapsed()),
            checks: self.inner.metrics.snapshot(),
        }
    }

    /// Spawn the loop; it runs until `cancel` fires.
    pub fn start(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let checker = self.clone();
        tokio::spawn(async move { checker.run(cancel).await })
    }

    /// Run the loop on the current task until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("Health checker started");
        loop {
            if self.check_due() {
                let _ = self.run_check(CheckTrigger::Periodic).await;
            }

            let pause = if self.is_visible() {
                self.inner.config.foreground_poll()
            } else {
                self.inner.config.background_poll()
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Health checker cancelled, shutting down");
                    break;
                }
                _ = tokio::time::sleep(pause) => {}
                _ = self.inner.wake.notified() => {
                    trace!("Visibility changed, re-evaluating health check pace");
                }
            }
        }
    }

    fn check_due(&self) -> bool {
        if !self.has_connection() {
            return false;
        }
        let interval = if self.is_visible() {
            self.inner.config.foreground_interval()
        } else {
            self.inner.config.background_interval()
        };
        self.timers()
            .last_check_at
            .is_none_or(|at| at.elapsed() >= interval)
    }

    /// Whether there is a connection worth checking.
    fn has_connection(&self) -> bool {
        matches!(
            self.inner.machine.state().status(),
            ConnectionStatus::Connected | ConnectionStatus::Error
        )
    }

    async fn run_check(&self, trigger: CheckTrigger) -> Result<()> {
        let _serial = self.inner.check_lock.lock().await;
        let started = Instant::now();
        {
            let mut timers = self.timers();
            timers.last_check_at = Some(started);
            match trigger {
                CheckTrigger::Foreground => timers.last_foreground_check_at = Some(started),
                CheckTrigger::Forced => timers.last_manual_check_at = Some(started),
                CheckTrigger::Periodic => {}
            }
        }

        let result = self.inner.machine.revalidate().await;
        let success = result.is_ok();
        self.inner
            .metrics
            .record(trigger, success, started.elapsed());
        match &result {
            Ok(()) => debug!(?trigger, "Health check passed"),
            Err(e) => info!(?trigger, "Health check failed: {}", e),
        }
        self.inner
            .machine
            .events()
            .send(BridgeEvent::CheckCompleted { trigger, success });
        result
    }

    fn timers(&self) -> MutexGuard<'_, Timers> {
        self.inner
            .timers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBridgeClient, MockClock, MockValidation};
    use time::macros::datetime;
    use wakelink_store::MemoryStore;
    use wakelink_types::{ConnectionRecord, Credentials};

    fn checker() -> (HealthChecker, Arc<MockBridgeClient>) {
        let start = datetime!(2026-10-19 05:00 UTC);
        let store = Arc::new(MemoryStore::with_record(ConnectionRecord::validated(
            &Credentials::new("10.0.0.2", "secret"),
            start,
        )));
        let client = Arc::new(MockBridgeClient::new());
        let machine = ConnectionStateMachine::builder(store, client.clone())
            .clock(Arc::new(MockClock::new(start)))
            .build();
        machine.initialize();
        (HealthChecker::new(machine, HealthConfig::default()), client)
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_app_checks_every_thirty_minutes() {
        let (checker, client) = checker();
        let cancel = CancellationToken::new();
        let handle = checker.start(cancel.clone());

        tokio::time::sleep(Duration::from_secs(119 * 60 + 30)).await;
        cancel.cancel();
        handle.await.unwrap();

        // t = 0, 30, 60 and 90 minutes
        assert_eq!(client.validate_count(), 4);
        assert_eq!(checker.metrics().snapshot().periodic_count, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreground_check_is_throttled() {
        let (checker, client) = checker();

        assert!(checker.on_foreground().await);
        assert!(!checker.on_foreground().await);
        assert_eq!(client.validate_count(), 1);

        checker.on_background();
        tokio::time::advance(Duration::from_secs(5 * 60 + 1)).await;
        assert!(checker.on_foreground().await);
        assert_eq!(client.validate_count(), 2);
        assert_eq!(checker.metrics().snapshot().foreground_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_check_ignores_timers() {
        let (checker, client) = checker();
        client.set_mode(MockValidation::Reject);

        assert!(checker.force_check().await.is_err());
        assert!(checker.force_check().await.is_err());
        assert_eq!(client.validate_count(), 2);

        let snapshot = checker.snapshot();
        assert_eq!(snapshot.status, ConnectionStatus::Error);
        assert_eq!(snapshot.checks.failure_count, 2);
        assert!(snapshot.since_manual_check.is_some());
        assert!(snapshot.since_foreground_check.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_checks_without_connection() {
        let store = Arc::new(MemoryStore::new());
        let client = Arc::new(MockBridgeClient::new());
        let machine = ConnectionStateMachine::new(store, client.clone());
        machine.initialize();
        let checker = HealthChecker::new(machine, HealthConfig::default());

        let cancel = CancellationToken::new();
        let handle = checker.start(cancel.clone());
        assert!(!checker.on_foreground().await);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(client.validate_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreground_speeds_up_loop() {
        let (checker, client) = checker();
        let cancel = CancellationToken::new();
        let handle = checker.start(cancel.clone());

        // Hidden: first check at t = 0, next not before t = 30 min.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(client.validate_count(), 1);

        // The foreground check itself, then the visible cadence takes over.
        assert!(checker.on_foreground().await);
        tokio::time::sleep(Duration::from_secs(5 * 60 + 30)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(client.validate_count(), 3);
    }
}
