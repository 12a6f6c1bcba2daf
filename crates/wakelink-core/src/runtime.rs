//! Composition root for the connectivity subsystem.
//!
//! [`BridgeRuntime`] wires the store, state machine, health checker, scheduler
//! and job handler together and owns their background tasks. Applications
//! create one at startup and route lifecycle callbacks and job-platform
//! invocations through it.
//!
//! # Example
//!
//! ```ignore
//! use wakelink_core::{BridgeRuntime, Collaborators, WakelinkConfig};
//!
//! let runtime = BridgeRuntime::open(WakelinkConfig::load_default()?, collaborators)?;
//! runtime.initialize().await;
//!
//! // Platform callbacks
//! runtime.on_foreground().await;
//! let outcome = runtime.dispatch(&payload).await;
//!
//! // Shutdown
//! runtime.cleanup().await;
//! ```

use std::sync::{Arc, Mutex};

use futures::stream::BoxStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wakelink_store::{ConnectionStore, Store};
use wakelink_types::{Bridge, DiscoveryStatus, JobOutcome, JobPayload};

use crate::clock::{Clock, SystemClock};
use crate::config::WakelinkConfig;
use crate::connection::ConnectionStateMachine;
use crate::error::{Error, Result};
use crate::events::{BridgeEvent, EventDispatcher};
use crate::health::HealthChecker;
use crate::precheck::PreCheckJobHandler;
use crate::scheduler::{PredictiveScheduler, RecalculateSummary};
use crate::traits::{
    BridgeClient, BridgeDiscovery, ErrorReporter, JobScheduler, TracingReporter, WakePredictor,
};

/// External collaborators the runtime drives.
#[derive(Clone)]
pub struct Collaborators {
    /// Device-control client.
    pub client: Arc<dyn BridgeClient>,
    /// Wake-time prediction.
    pub predictor: Arc<dyn WakePredictor>,
    /// Durable job platform.
    pub jobs: Arc<dyn JobScheduler>,
    /// Bridge discovery.
    pub discovery: Arc<dyn BridgeDiscovery>,
    /// Crash/analytics reporting.
    pub reporter: Arc<dyn ErrorReporter>,
    /// Wall clock.
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Bundle collaborators, reporting to the log and using the system clock.
    pub fn new(
        client: Arc<dyn BridgeClient>,
        predictor: Arc<dyn WakePredictor>,
        jobs: Arc<dyn JobScheduler>,
        discovery: Arc<dyn BridgeDiscovery>,
    ) -> Self {
        Self {
            client,
            predictor,
            jobs,
            discovery,
            reporter: Arc::new(TracingReporter),
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a different error reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Use a different clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Owns the connectivity components and their background tasks.
pub struct BridgeRuntime {
    config: WakelinkConfig,
    events: EventDispatcher,
    machine: ConnectionStateMachine,
    health: HealthChecker,
    scheduler: PredictiveScheduler,
    handler: PreCheckJobHandler,
    discovery: Arc<dyn BridgeDiscovery>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for BridgeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeRuntime")
            .field("machine", &self.machine)
            .field("health", &self.health)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl BridgeRuntime {
    /// Validate `config`, open the SQLite store it names and build the runtime.
    pub fn open(config: WakelinkConfig, collaborators: Collaborators) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::invalid_config(e.to_string()))?;
        let store = Store::open(&config.storage.path)?;
        Ok(Self::new(config, Arc::new(store), collaborators))
    }

    /// Build the runtime on an existing store.
    ///
    /// Nothing runs until [`initialize`](Self::initialize).
    pub fn new(
        config: WakelinkConfig,
        store: Arc<dyn ConnectionStore>,
        collaborators: Collaborators,
    ) -> Self {
        let events = EventDispatcher::new(config.events.capacity);
        let machine = ConnectionStateMachine::builder(store, collaborators.client)
            .reporter(collaborators.reporter)
            .clock(collaborators.clock.clone())
            .config(config.connection.clone())
            .events(events.clone())
            .build();
        let health = HealthChecker::new(machine.clone(), config.health.clone());
        let scheduler = PredictiveScheduler::with_clock(
            collaborators.predictor,
            collaborators.jobs,
            collaborators.clock,
            config.schedule.clone(),
            events.clone(),
        );
        let handler = PreCheckJobHandler::new(health.clone(), events.clone());

        Self {
            config,
            events,
            machine,
            health,
            scheduler,
            handler,
            discovery: collaborators.discovery,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Load the stored connection, start the health loop and the connection
    /// listener, and plan the first batch of pre-checks.
    pub async fn initialize(&self) -> RecalculateSummary {
        info!("Initializing bridge runtime");
        self.machine.initialize();

        let health_task = self.health.start(self.cancel.child_token());
        let listener_task = self.spawn_connection_listener();
        self.tasks_mut().extend([health_task, listener_task]);

        self.scheduler.start().await
    }

    /// Run a job the platform handed back.
    pub async fn dispatch(&self, payload: &JobPayload) -> JobOutcome {
        match payload {
            JobPayload::DailyReplan => {
                self.scheduler.daily_replan().await;
                JobOutcome::Success
            }
            JobPayload::PreCheck { .. } | JobPayload::FallbackCheck => {
                self.handler.handle(payload).await
            }
        }
    }

    /// Run bridge discovery and publish each bridge found.
    pub async fn discover(&self) -> Result<Vec<Bridge>> {
        let bridges = self.discovery.discover_bridges().await.inspect_err(|e| {
            warn!("Bridge discovery failed: {}", e);
        })?;
        info!(count = bridges.len(), "Bridge discovery finished");
        for bridge in &bridges {
            self.events.send(BridgeEvent::Discovered {
                bridge: bridge.clone(),
            });
        }
        Ok(bridges)
    }

    /// Progress reports for discovery runs.
    pub fn discovery_status(&self) -> BoxStream<'static, DiscoveryStatus> {
        self.discovery.discovery_status()
    }

    /// The app came to the foreground.
    pub async fn on_foreground(&self) -> bool {
        self.health.on_foreground().await
    }

    /// The app went to the background.
    pub fn on_background(&self) {
        self.health.on_background();
    }

    /// The connection state machine.
    pub fn connection(&self) -> &ConnectionStateMachine {
        &self.machine
    }

    /// The health checker.
    pub fn health(&self) -> &HealthChecker {
        &self.health
    }

    /// The predictive scheduler.
    pub fn scheduler(&self) -> &PredictiveScheduler {
        &self.scheduler
    }

    /// The shared event dispatcher.
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// The configuration this runtime was built with.
    pub fn config(&self) -> &WakelinkConfig {
        &self.config
    }

    /// Stop background tasks. Durable jobs stay scheduled.
    pub async fn cleanup(&self) {
        debug!("Cleaning up bridge runtime");
        self.cancel.cancel();
        self.machine.cleanup();

        let tasks = std::mem::take(&mut *self.tasks_mut());
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }
        info!("Bridge runtime stopped");
    }

    /// Cancel every durable job, then stop background tasks.
    pub async fn teardown(&self) {
        self.scheduler.cancel_all().await;
        self.cleanup().await;
    }

    /// Replan whenever the connection becomes `Connected`.
    fn spawn_connection_listener(&self) -> JoinHandle<()> {
        let mut rx = self.machine.subscribe();
        let scheduler = self.scheduler.clone();
        let cancel = self.cancel.child_token();
        // Read before spawning so a connection made before the task first
        // runs still shows up as a change.
        let mut was_connected = rx.borrow_and_update().is_connected();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let connected = rx.borrow_and_update().is_connected();
                        if connected && !was_connected {
                            scheduler.on_connection_established().await;
                        }
                        was_connected = connected;
                    }
                }
            }
            debug!("Connection listener stopped");
        })
    }

    fn tasks_mut(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBridgeClient, MockDiscovery, MockJobScheduler, MockPredictor};
    use std::time::Duration;
    use wakelink_store::MemoryStore;
    use wakelink_types::JobKey;

    fn runtime() -> (BridgeRuntime, Arc<MockJobScheduler>, Arc<MockDiscovery>) {
        let jobs = Arc::new(MockJobScheduler::new());
        let discovery = Arc::new(MockDiscovery::with_bridges(vec![Bridge {
            id: "001788fffe".into(),
            ip: "10.0.0.2".into(),
            name: "Hallway".into(),
        }]));
        let collaborators = Collaborators::new(
            Arc::new(MockBridgeClient::new()),
            Arc::new(MockPredictor::new()),
            jobs.clone(),
            discovery.clone(),
        );
        let runtime =
            BridgeRuntime::new(WakelinkConfig::default(), Arc::new(MemoryStore::new()), collaborators);
        (runtime, jobs, discovery)
    }

    #[tokio::test]
    async fn test_initialize_registers_jobs() {
        let (runtime, jobs, _) = runtime();
        let summary = runtime.initialize().await;

        assert!(summary.used_fallback);
        assert!(jobs.is_pending(JobKey::DailyReplan));
        assert!(jobs.is_pending(JobKey::Fallback));
        runtime.cleanup().await;
    }

    #[tokio::test]
    async fn test_teardown_cancels_durable_jobs() {
        let (runtime, jobs, _) = runtime();
        runtime.initialize().await;
        runtime.teardown().await;
        assert!(jobs.pending().is_empty());
    }

    #[tokio::test]
    async fn test_discover_publishes_bridges() {
        let (runtime, _, discovery) = runtime();
        let mut events = runtime.events().subscribe();

        let bridges = runtime.discover().await.unwrap();
        assert_eq!(bridges.len(), 1);
        assert!(matches!(
            events.recv().await.unwrap(),
            BridgeEvent::Discovered { .. }
        ));

        discovery.set_should_fail(true);
        assert!(matches!(runtime.discover().await, Err(Error::Discovery(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_established_triggers_replan() {
        let (runtime, jobs, _) = runtime();
        runtime.initialize().await;
        jobs.clear_ops();

        runtime
            .connection()
            .set_connection("10.0.0.2", "secret")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!jobs.ops().is_empty());
        runtime.cleanup().await;
    }

    #[tokio::test]
    async fn test_dispatch_routes_replan() {
        let (runtime, jobs, _) = runtime();
        let outcome = runtime.dispatch(&JobPayload::DailyReplan).await;
        assert_eq!(outcome, JobOutcome::Success);
        assert!(jobs.is_pending(JobKey::Fallback));
    }
}
