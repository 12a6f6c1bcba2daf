//! Mock collaborators for testing.
//!
//! This module provides in-process stand-ins for every seam in
//! [`crate::traits`] so the connectivity subsystem can be exercised without a
//! bridge, a prediction engine or a job platform.
//!
//! # Features
//!
//! - **Failure injection**: reject credentials, fail with network errors, or
//!   hang forever; fail job submissions per key
//! - **Latency simulation**: delay validations to widen race windows
//! - **Call accounting**: count validations, predictions and job operations
//! - **Controllable time**: [`MockClock`] follows tokio's (pausable) clock

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use time::OffsetDateTime;
use tokio::time::Instant;

use wakelink_types::{
    Bridge, DiscoveryStage, DiscoveryStatus, JobConstraints, JobKey, JobPayload,
};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::events::RecoveryIssue;
use crate::traits::{BridgeClient, BridgeDiscovery, ErrorReporter, JobScheduler, WakePredictor};

// Mocks are test infrastructure; a panic while a lock is held must not
// cascade into unrelated assertions.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// How a [`MockBridgeClient`] answers validation requests.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MockValidation {
    /// Accept every credential.
    #[default]
    Accept,
    /// Answer, but reject every credential.
    Reject,
    /// Fail with a network error.
    Unreachable(String),
    /// Never answer.
    Hang,
}

/// A mock device-control client.
///
/// # Example
///
/// ```
/// use wakelink_core::{BridgeClient, MockBridgeClient, MockValidation};
///
/// #[tokio::main]
/// async fn main() {
///     let client = MockBridgeClient::new();
///     assert!(client.validate("192.168.1.20", "token").await.unwrap());
///
///     client.set_mode(MockValidation::Reject);
///     assert!(!client.validate("192.168.1.20", "token").await.unwrap());
///     assert_eq!(client.validate_count(), 2);
/// }
/// ```
#[derive(Debug, Default)]
pub struct MockBridgeClient {
    mode: Mutex<MockValidation>,
    /// Simulated validation latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
    validate_count: AtomicU32,
    /// Number of validations to fail as unreachable before `mode` applies.
    remaining_failures: AtomicU32,
    /// When set, only this credential is accepted in `Accept` mode.
    accepted_credential: Mutex<Option<String>>,
}

impl MockBridgeClient {
    /// Create a client that accepts everything immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Change how subsequent validations are answered.
    pub fn set_mode(&self, mode: MockValidation) {
        *lock(&self.mode) = mode;
    }

    /// Current answer mode.
    pub fn mode(&self) -> MockValidation {
        lock(&self.mode).clone()
    }

    /// Set simulated latency.
    ///
    /// Set to `Duration::ZERO` to disable latency simulation.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Fail the next `count` validations as unreachable, then follow the mode.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Only accept `credential`; every other credential is rejected.
    pub fn accept_only(&self, credential: impl Into<String>) {
        *lock(&self.accepted_credential) = Some(credential.into());
    }

    /// Number of validations started so far.
    pub fn validate_count(&self) -> u32 {
        self.validate_count.load(Ordering::SeqCst)
    }

    /// Reset the validation counter.
    pub fn reset_validate_count(&self) {
        self.validate_count.store(0, Ordering::SeqCst);
    }

    fn take_transient_failure(&self) -> bool {
        self.remaining_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl BridgeClient for MockBridgeClient {
    async fn validate(&self, _bridge_ip: &str, credential: &str) -> Result<bool> {
        self.validate_count.fetch_add(1, Ordering::SeqCst);

        let latency_ms = self.latency_ms.load(Ordering::Relaxed);
        if latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(latency_ms)).await;
        }

        if self.take_transient_failure() {
            return Err(Error::network("mock transient failure"));
        }

        match self.mode() {
            MockValidation::Accept => Ok(lock(&self.accepted_credential)
                .as_deref()
                .is_none_or(|accepted| accepted == credential)),
            MockValidation::Reject => Ok(false),
            MockValidation::Unreachable(message) => Err(Error::network(message)),
            MockValidation::Hang => std::future::pending().await,
        }
    }
}

/// Builder for [`MockBridgeClient`].
#[derive(Debug, Default)]
pub struct MockBridgeClientBuilder {
    mode: MockValidation,
    latency: Duration,
    transient_failures: u32,
    accepted_credential: Option<String>,
}

impl MockBridgeClientBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the answer mode.
    #[must_use]
    pub fn mode(mut self, mode: MockValidation) -> Self {
        self.mode = mode;
        self
    }

    /// Set the simulated latency.
    #[must_use]
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the first `count` validations as unreachable.
    #[must_use]
    pub fn transient_failures(mut self, count: u32) -> Self {
        self.transient_failures = count;
        self
    }

    /// Only accept this credential.
    #[must_use]
    pub fn accept_only(mut self, credential: impl Into<String>) -> Self {
        self.accepted_credential = Some(credential.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> MockBridgeClient {
        let client = MockBridgeClient::new();
        client.set_mode(self.mode);
        client.set_latency(self.latency);
        client.set_transient_failures(self.transient_failures);
        *lock(&client.accepted_credential) = self.accepted_credential;
        client
    }
}

/// A mock wake-time predictor returning a fixed list.
#[derive(Debug, Default)]
pub struct MockPredictor {
    wake_times: Mutex<Vec<OffsetDateTime>>,
    fail: AtomicBool,
    call_count: AtomicU32,
}

impl MockPredictor {
    /// Create a predictor with no predictions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a predictor returning `wake_times` (in the given order).
    pub fn with_wake_times(wake_times: Vec<OffsetDateTime>) -> Self {
        let predictor = Self::new();
        predictor.set_wake_times(wake_times);
        predictor
    }

    /// Replace the predictions.
    pub fn set_wake_times(&self, wake_times: Vec<OffsetDateTime>) {
        *lock(&self.wake_times) = wake_times;
    }

    /// Make every call fail.
    pub fn set_should_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    /// Number of calls so far.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WakePredictor for MockPredictor {
    async fn next_wake_times(
        &self,
        _horizon_days: u32,
        limit: usize,
    ) -> Result<Vec<OffsetDateTime>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::Relaxed) {
            return Err(Error::Prediction("mock prediction failure".into()));
        }
        Ok(lock(&self.wake_times).iter().take(limit).copied().collect())
    }
}

/// When a [`MockJob`] fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTrigger {
    /// Once, at the given time.
    At(OffsetDateTime),
    /// Repeatedly, at the given interval.
    Every(Duration),
}

/// A job pending in a [`MockJobScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockJob {
    /// Job key.
    pub key: JobKey,
    /// When the job fires.
    pub trigger: JobTrigger,
    /// Payload handed back on execution.
    pub payload: JobPayload,
    /// Execution constraints.
    pub constraints: JobConstraints,
}

impl MockJob {
    /// Run time of a one-shot job.
    pub fn run_at(&self) -> Option<OffsetDateTime> {
        match self.trigger {
            JobTrigger::At(at) => Some(at),
            JobTrigger::Every(_) => None,
        }
    }
}

/// An operation recorded by [`MockJobScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOp {
    /// A job was submitted (one-shot or recurring).
    Scheduled(JobKey),
    /// A job was cancelled.
    Cancelled(JobKey),
}

#[derive(Debug, Default)]
struct JobTable {
    pending: HashMap<JobKey, MockJob>,
    ops: Vec<JobOp>,
    failing: HashSet<JobKey>,
    fail_all: bool,
}

/// A mock durable job platform.
///
/// Submissions upsert by key, like real platforms with unique job names.
#[derive(Debug, Default)]
pub struct MockJobScheduler {
    table: Mutex<JobTable>,
}

impl MockJobScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending jobs ordered by key.
    pub fn pending(&self) -> Vec<MockJob> {
        let mut jobs: Vec<_> = lock(&self.table).pending.values().cloned().collect();
        jobs.sort_by_key(|job| job.key);
        jobs
    }

    /// The pending job under `key`.
    pub fn job(&self, key: JobKey) -> Option<MockJob> {
        lock(&self.table).pending.get(&key).cloned()
    }

    /// Whether a job is pending under `key`.
    pub fn is_pending(&self, key: JobKey) -> bool {
        lock(&self.table).pending.contains_key(&key)
    }

    /// Every operation in submission order.
    pub fn ops(&self) -> Vec<JobOp> {
        lock(&self.table).ops.clone()
    }

    /// Forget recorded operations (pending jobs are kept).
    pub fn clear_ops(&self) {
        lock(&self.table).ops.clear();
    }

    /// Reject submissions under `key`.
    pub fn fail_key(&self, key: JobKey) {
        lock(&self.table).failing.insert(key);
    }

    /// Reject every submission.
    pub fn set_fail_all(&self, fail: bool) {
        lock(&self.table).fail_all = fail;
    }

    fn submit(&self, job: MockJob) -> Result<()> {
        let mut table = lock(&self.table);
        if table.fail_all || table.failing.contains(&job.key) {
            return Err(Error::scheduling_failure(job.key, "mock platform rejected job"));
        }
        table.ops.push(JobOp::Scheduled(job.key));
        table.pending.insert(job.key, job);
        Ok(())
    }
}

#[async_trait]
impl JobScheduler for MockJobScheduler {
    async fn schedule(
        &self,
        key: JobKey,
        run_at: OffsetDateTime,
        payload: JobPayload,
        constraints: JobConstraints,
    ) -> Result<()> {
        self.submit(MockJob {
            key,
            trigger: JobTrigger::At(run_at),
            payload,
            constraints,
        })
    }

    async fn schedule_recurring(
        &self,
        key: JobKey,
        interval: Duration,
        payload: JobPayload,
        constraints: JobConstraints,
    ) -> Result<()> {
        self.submit(MockJob {
            key,
            trigger: JobTrigger::Every(interval),
            payload,
            constraints,
        })
    }

    async fn cancel(&self, key: JobKey) -> Result<()> {
        let mut table = lock(&self.table);
        table.pending.remove(&key);
        table.ops.push(JobOp::Cancelled(key));
        Ok(())
    }
}

/// A mock discovery collaborator returning a fixed set of bridges.
#[derive(Debug, Default)]
pub struct MockDiscovery {
    bridges: Mutex<Vec<Bridge>>,
    fail: AtomicBool,
    call_count: AtomicU32,
}

impl MockDiscovery {
    /// Create a discovery mock that finds `bridges`.
    pub fn with_bridges(bridges: Vec<Bridge>) -> Self {
        Self {
            bridges: Mutex::new(bridges),
            ..Self::default()
        }
    }

    /// Make discovery fail.
    pub fn set_should_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    /// Number of discovery runs so far.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BridgeDiscovery for MockDiscovery {
    async fn discover_bridges(&self) -> Result<Vec<Bridge>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::Relaxed) {
            return Err(Error::Discovery("mock discovery failure".into()));
        }
        Ok(lock(&self.bridges).clone())
    }

    fn discovery_status(&self) -> BoxStream<'static, DiscoveryStatus> {
        let found = lock(&self.bridges).len();
        Box::pin(stream::iter([
            DiscoveryStatus::new(DiscoveryStage::Starting, "Starting discovery", 0.0),
            DiscoveryStatus::new(DiscoveryStage::ServiceLookup, "Querying network service", 0.5),
            DiscoveryStatus::new(
                DiscoveryStage::Completed,
                format!("Found {} bridge(s)", found),
                1.0,
            ),
        ]))
    }
}

/// A wall clock that follows tokio's clock.
///
/// Under `#[tokio::test(start_paused = true)]`, `tokio::time::advance` moves
/// this clock too. [`MockClock::jump`] moves only the wall clock, like a user
/// changing the system time.
#[derive(Debug)]
pub struct MockClock {
    anchor: OffsetDateTime,
    anchor_instant: Instant,
    skew: Mutex<time::Duration>,
}

impl MockClock {
    /// Create a clock reading `start` now.
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            anchor: start,
            anchor_instant: Instant::now(),
            skew: Mutex::new(time::Duration::ZERO),
        }
    }

    /// Move the wall clock by `delta` without moving tokio's clock.
    pub fn jump(&self, delta: time::Duration) {
        *lock(&self.skew) += delta;
    }
}

impl Clock for MockClock {
    fn now(&self) -> OffsetDateTime {
        let elapsed = Instant::now().saturating_duration_since(self.anchor_instant);
        self.anchor + elapsed + *lock(&self.skew)
    }
}

/// An [`ErrorReporter`] that records every issue.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    issues: Mutex<Vec<RecoveryIssue>>,
}

impl RecordingReporter {
    /// Create an empty reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues reported so far.
    pub fn issues(&self) -> Vec<RecoveryIssue> {
        lock(&self.issues).clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, issue: &RecoveryIssue) {
        lock(&self.issues).push(issue.clone());
    }
}
