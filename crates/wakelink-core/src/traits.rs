//! Seams to the collaborators this subsystem drives but does not implement.
//!
//! Real applications plug in their device-control client, calendar-based
//! prediction, background-job platform and crash reporter; tests use the
//! implementations in [`crate::mock`].

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use time::OffsetDateTime;
use tracing::warn;

use wakelink_types::{Bridge, DiscoveryStatus, JobConstraints, JobKey, JobPayload};

use crate::error::Result;
use crate::events::RecoveryIssue;

/// Device-control client used to confirm that a bridge accepts a credential.
///
/// # Example
///
/// ```ignore
/// use wakelink_core::{BridgeClient, Result};
///
/// async fn check<C: BridgeClient>(client: &C) -> Result<()> {
///     if !client.validate("192.168.1.20", "token").await? {
///         println!("credential rejected");
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait BridgeClient: Send + Sync {
    /// Validate `credential` against the bridge at `bridge_ip`.
    ///
    /// Returns `Ok(false)` when the bridge answers and rejects the credential,
    /// and an error when the bridge cannot be reached.
    async fn validate(&self, bridge_ip: &str, credential: &str) -> Result<bool>;
}

/// Source of predicted wake-up times.
#[async_trait]
pub trait WakePredictor: Send + Sync {
    /// Up to `limit` upcoming wake times within `horizon_days`.
    ///
    /// The result may be unsorted and contain duplicates.
    async fn next_wake_times(&self, horizon_days: u32, limit: usize)
    -> Result<Vec<OffsetDateTime>>;
}

/// Durable background-job platform.
///
/// Jobs survive process death. Scheduling under a key that already has a
/// pending job replaces that job.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Schedule a one-shot job at `run_at`.
    async fn schedule(
        &self,
        key: JobKey,
        run_at: OffsetDateTime,
        payload: JobPayload,
        constraints: JobConstraints,
    ) -> Result<()>;

    /// Schedule a job repeating every `interval`.
    async fn schedule_recurring(
        &self,
        key: JobKey,
        interval: Duration,
        payload: JobPayload,
        constraints: JobConstraints,
    ) -> Result<()>;

    /// Cancel the job under `key`. Cancelling an unknown key is not an error.
    async fn cancel(&self, key: JobKey) -> Result<()>;
}

/// Bridge discovery (network-service lookup and local scan).
#[async_trait]
pub trait BridgeDiscovery: Send + Sync {
    /// Run discovery and return every bridge found.
    async fn discover_bridges(&self) -> Result<Vec<Bridge>>;

    /// Progress reports for discovery runs.
    fn discovery_status(&self) -> BoxStream<'static, DiscoveryStatus>;
}

/// Receives recovery problems worth surfacing (crash/analytics reporting).
pub trait ErrorReporter: Send + Sync {
    /// Report a recovery issue.
    fn report(&self, issue: &RecoveryIssue);
}

/// [`ErrorReporter`] that writes issues to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, issue: &RecoveryIssue) {
        warn!(
            kind = ?issue.kind,
            bridge_ip = %issue.bridge_ip,
            "Bridge recovery issue: {}",
            issue.message
        );
    }
}
