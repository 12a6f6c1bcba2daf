//! Diagnostic event stream.
//!
//! Connection *state* is published through the watch channel returned by
//! [`ConnectionStateMachine::subscribe`](crate::ConnectionStateMachine::subscribe),
//! which always replays the latest value. This module carries everything else
//! worth observing: checks, recovery issues, job submissions and discovery
//! results. Events never contain credentials.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::broadcast;

use wakelink_types::{Bridge, ConnectionStatus};

/// What caused a health check to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckTrigger {
    /// The periodic loop decided a check was due.
    Periodic,
    /// The app came to the foreground.
    Foreground,
    /// Explicit request (user refresh or scheduled pre-check).
    Forced,
}

/// Kind of recovery problem reported to the error-reporting collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryIssueKind {
    /// No answer within the recovery deadline (bridge likely powered off).
    Timeout,
    /// Network error talking to the bridge.
    Unreachable,
    /// The bridge answered and rejected the stored credential.
    Rejected,
}

/// A recoverable-but-noteworthy recovery failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryIssue {
    /// What went wrong.
    pub kind: RecoveryIssueKind,
    /// Bridge the recovery was aimed at.
    pub bridge_ip: String,
    /// Human-readable detail.
    pub message: String,
}

/// Events emitted by the connectivity subsystem.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum BridgeEvent {
    /// The connection state changed.
    StateChanged {
        status: ConnectionStatus,
        bridge_ip: Option<String>,
    },
    /// A bridge was found by discovery.
    Discovered { bridge: Bridge },
    /// A health check finished.
    CheckCompleted { trigger: CheckTrigger, success: bool },
    /// A detached revalidation of a stale cache failed.
    RevalidationFailed { bridge_ip: String, error: String },
    /// Recovery failed in a way worth reporting.
    RecoveryIssue { issue: RecoveryIssue },
    /// A durable job was submitted.
    JobScheduled {
        key: String,
        #[serde(with = "time::serde::rfc3339")]
        run_at: OffsetDateTime,
    },
    /// A recurring durable job was submitted.
    RecurringJobScheduled { key: String, interval_secs: u64 },
    /// A durable job was cancelled.
    JobCancelled { key: String },
    /// The job platform rejected a submission.
    SchedulingFailed { key: String, error: String },
    /// A scheduled pre-check ran (always reported as success to the platform).
    PreCheckRan {
        sequence_index: Option<u32>,
        success: bool,
    },
}

/// Sender for bridge events.
pub type EventSender = broadcast::Sender<BridgeEvent>;

/// Receiver for bridge events.
pub type EventReceiver = broadcast::Receiver<BridgeEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: BridgeEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the sender for direct use.
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}
