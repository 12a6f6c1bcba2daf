//! Bridge connectivity and adaptive health-check scheduling.
//!
//! This crate keeps a local-network bridge connection ready for the moment it
//! is needed, typically right before a predicted wake-up, while staying quiet
//! on the network the rest of the time.
//!
//! # Features
//!
//! - **Credential caching**: validated credentials are served without a
//!   network round trip; stale ones are served optimistically and revalidated
//!   in the background
//! - **Bounded recovery**: a failed or missing connection is recovered from the
//!   stored record within a fixed deadline
//! - **Adaptive health checks**: check cadence follows app visibility
//! - **Predictive pre-checks**: durable jobs re-confirm the bridge shortly
//!   before each predicted wake time, with a fixed-interval fallback
//! - **Observable state**: a last-value `watch` channel for the connection
//!   state plus a broadcast stream of diagnostic events
//!
//! # Components
//!
//! | Component | Role |
//! |-----------|------|
//! | [`ConnectionStateMachine`] | owns the current [`ConnectionState`] |
//! | [`HealthChecker`] | decides when to revalidate |
//! | [`PredictiveScheduler`] | turns wake-time predictions into jobs |
//! | [`PreCheckJobHandler`] | runs scheduled checks for the job platform |
//! | [`BridgeRuntime`] | wires everything together |
//!
//! The bridge client, predictor, job platform and discovery are collaborators
//! behind the traits in [`traits`]; [`mock`] provides test doubles.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use wakelink_core::{ConnectionStateMachine, MockBridgeClient};
//! use wakelink_store::Store;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(Store::open_default()?);
//!     let machine = ConnectionStateMachine::new(store, Arc::new(MockBridgeClient::new()));
//!     machine.initialize();
//!
//!     machine.set_connection("192.168.1.20", "bridge-token").await?;
//!     let creds = machine.get_validated().await?;
//!     println!("Bridge at {}", creds.bridge_ip);
//!     Ok(())
//! }
//! ```

pub mod alarm;
pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
mod guard;
pub mod health;
pub mod metrics;
pub mod mock;
pub mod precheck;
pub mod runtime;
pub mod scheduler;
pub mod traits;

pub use alarm::{BridgeEffectOutcome, run_bridge_effect};
pub use clock::{Clock, SystemClock, is_fresh};
pub use config::{
    ConfigError, ConnectionConfig, EventsConfig, HealthConfig, MAX_PREDICTIONS_LIMIT,
    ScheduleConfig, StorageConfig, ValidationError, WakelinkConfig, default_config_path,
};
pub use connection::{ConnectionStateMachine, ConnectionStateMachineBuilder};
pub use error::{Error, Result, ValidationFailureReason};
pub use events::{
    BridgeEvent, CheckTrigger, EventDispatcher, EventReceiver, EventSender, RecoveryIssue,
    RecoveryIssueKind,
};
pub use health::{HealthChecker, HealthSnapshot};
pub use metrics::{CheckMetrics, CheckStats};
pub use mock::{
    JobOp, JobTrigger, MockBridgeClient, MockBridgeClientBuilder, MockClock, MockDiscovery,
    MockJob, MockJobScheduler, MockPredictor, MockValidation, RecordingReporter,
};
pub use precheck::PreCheckJobHandler;
pub use runtime::{BridgeRuntime, Collaborators};
pub use scheduler::{PredictiveScheduler, RecalculateSummary, plan_checks};
pub use traits::{
    BridgeClient, BridgeDiscovery, ErrorReporter, JobScheduler, TracingReporter, WakePredictor,
};

// Re-export from wakelink-types
pub use wakelink_types::{
    Bridge, ConnectionRecord, ConnectionState, ConnectionStatus, Credentials, DiscoveryStage,
    DiscoveryStatus, JobConstraints, JobKey, JobOutcome, JobPayload, ScheduledCheck,
};
