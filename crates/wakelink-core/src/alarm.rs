//! Bridge side effects on the time-critical alarm path.
//!
//! The alarm itself must fire whether or not the bridge is reachable, so
//! [`run_bridge_effect`] turns every bridge problem into an outcome value
//! instead of an error the caller could propagate by accident.

use std::future::Future;

use tracing::{info, warn};

use wakelink_types::Credentials;

use crate::connection::ConnectionStateMachine;
use crate::error::Result;

/// Result of a bridge side effect attempted on the alarm path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEffectOutcome<T> {
    /// The effect ran and returned a value.
    Applied(T),
    /// No usable connection; the effect was not attempted.
    Skipped {
        /// Why no connection was available.
        reason: String,
    },
    /// The effect ran and failed.
    Failed {
        /// The effect's error.
        error: String,
    },
}

impl<T> BridgeEffectOutcome<T> {
    /// Whether the effect ran successfully.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Run `effect` with validated credentials, if any can be had.
///
/// Uses [`ConnectionStateMachine::get_validated`], so a cached connection is
/// used without a network round trip. Never fails.
///
/// # Example
///
/// ```no_run
/// use wakelink_core::{BridgeEffectOutcome, ConnectionStateMachine, run_bridge_effect};
///
/// async fn on_alarm(machine: &ConnectionStateMachine) {
///     let outcome = run_bridge_effect(machine, |creds| async move {
///         // Turn the lights on via creds.bridge_ip ...
///         Ok(())
///     })
///     .await;
///     if !outcome.is_applied() {
///         // Sound the alarm anyway.
///     }
/// }
/// ```
pub async fn run_bridge_effect<T, F, Fut>(
    machine: &ConnectionStateMachine,
    effect: F,
) -> BridgeEffectOutcome<T>
where
    F: FnOnce(Credentials) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let credentials = match machine.get_validated().await {
        Ok(credentials) => credentials,
        Err(e) => {
            warn!("Skipping bridge effect: {}", e);
            return BridgeEffectOutcome::Skipped {
                reason: e.to_string(),
            };
        }
    };

    let bridge_ip = credentials.bridge_ip.clone();
    match effect(credentials).await {
        Ok(value) => {
            info!(%bridge_ip, "Bridge effect applied");
            BridgeEffectOutcome::Applied(value)
        }
        Err(e) => {
            warn!(%bridge_ip, "Bridge effect failed: {}", e);
            BridgeEffectOutcome::Failed {
                error: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::mock::MockBridgeClient;
    use std::sync::Arc;
    use wakelink_store::MemoryStore;

    #[tokio::test]
    async fn test_effect_applied_with_connection() {
        let machine =
            ConnectionStateMachine::new(Arc::new(MemoryStore::new()), Arc::new(MockBridgeClient::new()));
        machine.set_connection("10.0.0.2", "secret").await.unwrap();

        let outcome = run_bridge_effect(&machine, |creds| async move { Ok(creds.bridge_ip) }).await;
        assert_eq!(outcome, BridgeEffectOutcome::Applied("10.0.0.2".to_string()));
    }

    #[tokio::test]
    async fn test_effect_skipped_without_connection() {
        let machine =
            ConnectionStateMachine::new(Arc::new(MemoryStore::new()), Arc::new(MockBridgeClient::new()));
        machine.initialize();

        let mut ran = false;
        let outcome = run_bridge_effect(&machine, |_| {
            ran = true;
            async { Ok(()) }
        })
        .await;

        assert!(matches!(outcome, BridgeEffectOutcome::Skipped { .. }));
        assert!(!ran);
    }

    #[tokio::test]
    async fn test_effect_failure_is_contained() {
        let machine =
            ConnectionStateMachine::new(Arc::new(MemoryStore::new()), Arc::new(MockBridgeClient::new()));
        machine.set_connection("10.0.0.2", "secret").await.unwrap();

        let outcome: BridgeEffectOutcome<()> =
            run_bridge_effect(&machine, |_| async { Err(Error::network("lights offline")) }).await;
        assert!(matches!(outcome, BridgeEffectOutcome::Failed { .. }));
    }
}
