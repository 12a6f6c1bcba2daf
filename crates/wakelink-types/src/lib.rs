//! Shared types for wakelink bridge connectivity.
//!
//! This crate provides the data model shared by the connection store
//! (`wakelink-store`) and the state machine and schedulers (`wakelink-core`).
//!
//! # Features
//!
//! - Persisted connection record and in-memory connection state
//! - Durable job keys and payloads for pre-emptive health checks
//! - Bridge discovery results and progress reports
//!
//! # Example
//!
//! ```
//! use wakelink_types::{ConnectionState, Credentials, JobKey};
//! use time::OffsetDateTime;
//!
//! let creds = Credentials::new("192.168.1.20", "secret");
//! let state = ConnectionState::connected(&creds, OffsetDateTime::UNIX_EPOCH);
//! assert!(state.holds(&creds));
//! assert_eq!(JobKey::PreCheck(2).to_string(), "precheck_2");
//! ```

pub mod discovery;
pub mod error;
pub mod jobs;
pub mod types;

pub use discovery::{Bridge, DiscoveryStage, DiscoveryStatus};
pub use error::{ParseError, ParseResult};
pub use jobs::{
    JobConstraints, JobKey, JobOutcome, JobPayload, PRECHECK_KEY_PREFIX, ScheduledCheck,
};
pub use types::{ConnectionRecord, ConnectionState, ConnectionStatus, Credentials};

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use time::macros::datetime;

    fn creds() -> Credentials {
        Credentials::new("192.168.1.20", "s3cret-token")
    }

    // --- Credentials / state tests ---

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let debug = format!("{:?}", creds());
        assert!(debug.contains("192.168.1.20"));
        assert!(!debug.contains("s3cret-token"));
    }

    #[test]
    fn test_connected_state_debug_redacts_secret() {
        let state = ConnectionState::connected(&creds(), OffsetDateTime::UNIX_EPOCH);
        let debug = format!("{:?}", state);
        assert!(debug.contains("Connected"));
        assert!(!debug.contains("s3cret-token"));
    }

    #[test]
    fn test_state_accessors() {
        let at = datetime!(2026-10-19 06:00 UTC);
        let state = ConnectionState::connected(&creds(), at);

        assert!(state.is_connected());
        assert_eq!(state.credentials(), Some(creds()));
        assert_eq!(state.last_validated_at(), Some(at));
        assert_eq!(state.status(), ConnectionStatus::Connected);
        assert!(state.holds(&creds()));
        assert!(!state.holds(&Credentials::new("192.168.1.20", "other")));
    }

    #[test]
    fn test_non_connected_states_hold_nothing() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::error("bridge rejected credential"),
        ] {
            assert!(!state.is_connected());
            assert!(state.credentials().is_none());
            assert!(state.last_validated_at().is_none());
            assert!(!state.holds(&creds()));
        }
    }

    #[test]
    fn test_default_state_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_state_display() {
        let state = ConnectionState::connected(&creds(), OffsetDateTime::UNIX_EPOCH);
        assert_eq!(state.to_string(), "connected to 192.168.1.20");
        assert_eq!(
            ConnectionState::error("timed out").to_string(),
            "error: timed out"
        );
    }

    #[test]
    fn test_record_matches() {
        let record = ConnectionRecord::validated(&creds(), OffsetDateTime::UNIX_EPOCH);
        assert!(record.validated);
        assert!(record.matches(&creds()));
        assert!(!record.matches(&Credentials::new("10.0.0.2", "s3cret-token")));
        assert_eq!(record.credentials(), creds());
    }

    #[test]
    fn test_record_serde_uses_rfc3339() {
        let record = ConnectionRecord::validated(&creds(), datetime!(2026-10-19 06:00 UTC));
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("2026-10-19T06:00:00Z"));

        let back: ConnectionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    // --- Job key tests ---

    #[test]
    fn test_job_key_display() {
        assert_eq!(JobKey::PreCheck(0).to_string(), "precheck_0");
        assert_eq!(JobKey::Fallback.to_string(), "precheck_fallback");
        assert_eq!(JobKey::DailyReplan.to_string(), "precheck_daily_replan");
    }

    #[test]
    fn test_job_key_parse() {
        assert_eq!("precheck_7".parse::<JobKey>(), Ok(JobKey::PreCheck(7)));
        assert_eq!("precheck_fallback".parse::<JobKey>(), Ok(JobKey::Fallback));
        assert_eq!(
            "precheck_daily_replan".parse::<JobKey>(),
            Ok(JobKey::DailyReplan)
        );
    }

    #[test]
    fn test_job_key_parse_rejects_foreign_keys() {
        assert!(matches!(
            "sync_0".parse::<JobKey>(),
            Err(ParseError::UnknownJobKey(_))
        ));
        assert!(matches!(
            "precheck_".parse::<JobKey>(),
            Err(ParseError::InvalidSequenceIndex { .. })
        ));
        assert!(matches!(
            "precheck_-1".parse::<JobKey>(),
            Err(ParseError::InvalidSequenceIndex { .. })
        ));
        assert!(matches!(
            "precheck_99999999999".parse::<JobKey>(),
            Err(ParseError::InvalidSequenceIndex { .. })
        ));
    }

    #[test]
    fn test_scheduled_check_key_and_payload() {
        let wake = datetime!(2026-10-20 07:00 UTC);
        let check = ScheduledCheck {
            target_time: datetime!(2026-10-20 06:50 UTC),
            sequence_index: 3,
            wake_time: wake,
        };
        assert_eq!(check.key(), JobKey::PreCheck(3));
        assert_eq!(
            check.payload(),
            JobPayload::PreCheck {
                wake_time: wake,
                sequence_index: 3
            }
        );
    }

    #[test]
    fn test_job_payload_serde_tagged() {
        let json = serde_json::to_string(&JobPayload::FallbackCheck).unwrap();
        assert_eq!(json, r#"{"type":"fallback_check"}"#);

        let payload = JobPayload::PreCheck {
            wake_time: datetime!(2026-10-20 07:00 UTC),
            sequence_index: 1,
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains(r#""type":"pre_check""#));
        let back: JobPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_job_outcome_only_reports_success() {
        let json = serde_json::to_string(&JobOutcome::Success).unwrap();
        assert_eq!(json, r#""Success""#);
        assert!(serde_json::from_str::<JobOutcome>(r#""Retry""#).is_err());
    }

    #[test]
    fn test_default_constraints_require_network() {
        assert!(JobConstraints::default().requires_network);
    }

    // --- Discovery tests ---

    #[test]
    fn test_discovery_status_clamps_progress() {
        let status = DiscoveryStatus::new(DiscoveryStage::NetworkScan, "scanning", 1.7);
        assert_eq!(status.progress, 1.0);
        assert!(!status.is_terminal());

        let done = DiscoveryStatus::new(DiscoveryStage::Completed, "done", -0.5);
        assert_eq!(done.progress, 0.0);
        assert!(done.is_terminal());
    }

    // --- Property tests ---

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn precheck_key_parses_back(index in any::<u32>()) {
                let key = JobKey::PreCheck(index);
                prop_assert_eq!(key.to_string().parse::<JobKey>(), Ok(key));
            }

            #[test]
            fn parse_never_panics(s in ".*") {
                let _ = s.parse::<JobKey>();
            }
        }
    }
}
