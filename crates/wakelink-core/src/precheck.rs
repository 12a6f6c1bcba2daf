//! Work unit run by the background-job platform for scheduled checks.

use tracing::{info, warn};

use wakelink_types::{JobOutcome, JobPayload};

use crate::events::{BridgeEvent, EventDispatcher};
use crate::health::HealthChecker;

/// Runs pre-checks and fallback checks on behalf of the job platform.
///
/// Always reports [`JobOutcome::Success`]. A failed check has already moved
/// the connection to `Error`, where the alarm path can see it; letting the
/// platform retry would only add checks on top of the scheduler's own plan.
#[derive(Debug, Clone)]
pub struct PreCheckJobHandler {
    checker: HealthChecker,
    events: EventDispatcher,
}

impl PreCheckJobHandler {
    /// Create a handler forcing checks through `checker`.
    pub fn new(checker: HealthChecker, events: EventDispatcher) -> Self {
        Self { checker, events }
    }

    /// Run the job described by `payload`.
    pub async fn handle(&self, payload: &JobPayload) -> JobOutcome {
        let sequence_index = match payload {
            JobPayload::PreCheck {
                wake_time,
                sequence_index,
            } => {
                info!(sequence_index, %wake_time, "Running scheduled pre-check");
                Some(*sequence_index)
            }
            JobPayload::FallbackCheck => {
                info!("Running fallback check");
                None
            }
            JobPayload::DailyReplan => {
                warn!("Daily replan payload sent to the pre-check handler, ignoring");
                return JobOutcome::Success;
            }
        };

        let success = match self.checker.force_check().await {
            Ok(()) => true,
            Err(e) => {
                warn!(?sequence_index, "Pre-check failed: {}", e);
                false
            }
        };
        self.events.send(BridgeEvent::PreCheckRan {
            sequence_index,
            success,
        });
        JobOutcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HealthConfig;
    use crate::connection::ConnectionStateMachine;
    use crate::mock::{MockBridgeClient, MockValidation};
    use std::sync::Arc;
    use time::macros::datetime;
    use wakelink_store::MemoryStore;
    use wakelink_types::{ConnectionRecord, ConnectionStatus, Credentials};

    fn handler() -> (PreCheckJobHandler, ConnectionStateMachine, Arc<MockBridgeClient>) {
        let store = Arc::new(MemoryStore::with_record(ConnectionRecord::validated(
            &Credentials::new("10.0.0.2", "secret"),
            datetime!(2026-10-19 05:00 UTC),
        )));
        let client = Arc::new(MockBridgeClient::new());
        let machine = ConnectionStateMachine::new(store, client.clone());
        machine.initialize();
        let checker = HealthChecker::new(machine.clone(), HealthConfig::default());
        let handler = PreCheckJobHandler::new(checker, machine.events().clone());
        (handler, machine, client)
    }

    #[tokio::test]
    async fn test_failed_pre_check_still_succeeds() {
        let (handler, machine, client) = handler();
        client.set_mode(MockValidation::Unreachable("bridge off".into()));
        let mut events = machine.events().subscribe();

        let outcome = handler
            .handle(&JobPayload::PreCheck {
                wake_time: datetime!(2026-10-19 06:00 UTC),
                sequence_index: 3,
            })
            .await;

        assert_eq!(outcome, JobOutcome::Success);
        assert_eq!(machine.state().status(), ConnectionStatus::Error);

        let mut ran = None;
        while let Ok(event) = events.try_recv() {
            if let BridgeEvent::PreCheckRan {
                sequence_index,
                success,
            } = event
            {
                ran = Some((sequence_index, success));
            }
        }
        assert_eq!(ran, Some((Some(3), false)));
    }

    #[tokio::test]
    async fn test_fallback_check_runs_forced_check() {
        let (handler, machine, client) = handler();

        let outcome = handler.handle(&JobPayload::FallbackCheck).await;
        assert_eq!(outcome, JobOutcome::Success);
        assert_eq!(client.validate_count(), 1);
        assert!(machine.state().is_connected());
    }

    #[tokio::test]
    async fn test_replan_payload_is_not_a_check() {
        let (handler, _, client) = handler();
        assert_eq!(
            handler.handle(&JobPayload::DailyReplan).await,
            JobOutcome::Success
        );
        assert_eq!(client.validate_count(), 0);
    }
}
