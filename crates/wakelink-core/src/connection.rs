//! Connection state machine with credential caching.
//!
//! [`ConnectionStateMachine`] owns the single current [`ConnectionState`] and
//! is its only writer. Every transition goes through a `watch` channel, so
//! observers see a total order of states and a new subscriber immediately sees
//! the latest one.
//!
//! # Serving credentials
//!
//! [`get_validated`](ConnectionStateMachine::get_validated) never blocks a
//! `Connected` caller on the network:
//!
//! 1. fresh cache (younger than the cache TTL): return it
//! 2. stale cache: return it and start a detached revalidation (at most one
//!    in flight)
//! 3. anything else: run a bounded recovery from the stored record
//!
//! # Superseded work
//!
//! Each explicit reset of the connection (`set_connection`, recovery,
//! `forget_connection`, `initialize`) starts a new *epoch*. Validation results
//! from an older epoch are dropped instead of overwriting newer state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::{Mutex, watch};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use wakelink_store::ConnectionStore;
use wakelink_types::{ConnectionRecord, ConnectionState, Credentials};

use crate::clock::{Clock, SystemClock, is_fresh};
use crate::config::ConnectionConfig;
use crate::error::{Error, Result, ValidationFailureReason};
use crate::events::{BridgeEvent, EventDispatcher, RecoveryIssue, RecoveryIssueKind};
use crate::guard::{AttemptGuard, InFlight};
use crate::traits::{BridgeClient, ErrorReporter, TracingReporter};

const ABANDONED_MESSAGE: &str = "connection attempt cancelled";

struct Inner {
    store: Arc<dyn ConnectionStore>,
    client: Arc<dyn BridgeClient>,
    reporter: Arc<dyn ErrorReporter>,
    clock: Arc<dyn Clock>,
    config: ConnectionConfig,
    events: EventDispatcher,
    state: watch::Sender<ConnectionState>,
    /// Only modified while the state lock is held.
    epoch: AtomicU64,
    revalidating: Arc<AtomicBool>,
    recovery_gate: Mutex<()>,
    shutdown: CancellationToken,
}

/// Holds the current bridge connection and serves validated credentials.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct ConnectionStateMachine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionStateMachine")
            .field("state", &*self.inner.state.borrow())
            .field("epoch", &self.inner.epoch.load(Ordering::Relaxed))
            .field("config", &self.inner.config)
            .finish()
    }
}

impl ConnectionStateMachine {
    /// Create a state machine with default collaborators and settings.
    ///
    /// The initial state is `Disconnected` until [`initialize`](Self::initialize)
    /// loads the stored record.
    pub fn new(store: Arc<dyn ConnectionStore>, client: Arc<dyn BridgeClient>) -> Self {
        Self::builder(store, client).build()
    }

    /// Start building a state machine.
    pub fn builder(
        store: Arc<dyn ConnectionStore>,
        client: Arc<dyn BridgeClient>,
    ) -> ConnectionStateMachineBuilder {
        ConnectionStateMachineBuilder {
            store,
            client,
            reporter: Arc::new(TracingReporter),
            clock: Arc::new(SystemClock),
            config: ConnectionConfig::default(),
            events: EventDispatcher::default(),
        }
    }

    /// Load the stored record and publish the resulting state.
    ///
    /// A validated record becomes `Connected` with its stored success time, so
    /// the first `get_validated()` after a restart decides freshness from
    /// persisted data. A missing or unreadable record becomes `Disconnected`.
    pub fn initialize(&self) {
        let record = match self.inner.store.load() {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to load stored bridge connection: {}", e);
                None
            }
        };

        let next = match record {
            Some(record) if record.validated => {
                info!(bridge_ip = %record.bridge_ip, "Restored bridge connection");
                ConnectionState::connected(&record.credentials(), record.last_success_at)
            }
            Some(_) => {
                debug!("Stored bridge connection was never validated");
                ConnectionState::Disconnected
            }
            None => ConnectionState::Disconnected,
        };
        self.reset(next);
    }

    /// The current state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to state changes.
    ///
    /// The receiver starts out holding the current state.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// The diagnostic event dispatcher.
    pub fn events(&self) -> &EventDispatcher {
        &self.inner.events
    }

    /// Connection settings in use.
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Credentials for the bridge, validated recently or recoverable now.
    ///
    /// Fails with [`Error::ConnectionUnavailable`] only when there is no
    /// cached connection and recovery did not succeed.
    pub async fn get_validated(&self) -> Result<Credentials> {
        let current = self.state();
        if let ConnectionState::Connected {
            last_validated_at, ..
        } = &current
            && let Some(credentials) = current.credentials()
        {
            let now = self.inner.clock.now();
            if is_fresh(*last_validated_at, now, self.inner.config.cache_ttl()) {
                trace!("Serving fresh cached bridge connection");
            } else {
                debug!(
                    bridge_ip = %credentials.bridge_ip,
                    "Cached bridge connection is stale, revalidating in background"
                );
                self.spawn_revalidation();
            }
            return Ok(credentials);
        }

        if matches!(current, ConnectionState::Connecting)
            && let Some(credentials) = self.wait_settled().await
        {
            return Ok(credentials);
        }

        let _gate = self.inner.recovery_gate.lock().await;
        // A recovery that finished while we waited may already have connected.
        if let Some(credentials) = self.state().credentials() {
            return Ok(credentials);
        }

        self.recover_locked().await.map_err(|e| {
            warn!("No usable bridge connection: {}", e);
            Error::ConnectionUnavailable(e.to_string())
        })
    }

    /// Validate and persist a new bridge connection.
    ///
    /// The state is `Connecting` for the duration of the call. On success the
    /// record is written and the state becomes `Connected`; on failure the
    /// state becomes `Error` and nothing is persisted.
    pub async fn set_connection(
        &self,
        bridge_ip: impl Into<String>,
        credential: impl Into<String>,
    ) -> Result<Credentials> {
        let credentials = Credentials::new(bridge_ip, credential);
        info!(bridge_ip = %credentials.bridge_ip, "Setting bridge connection");

        let epoch = self.reset(ConnectionState::Connecting);
        let guard = AttemptGuard::new(|| self.abandon(epoch));
        let verdict = self
            .validate_bounded(&credentials, self.inner.config.validation_timeout())
            .await;
        guard.disarm();

        if let Err(e) = verdict {
            warn!(bridge_ip = %credentials.bridge_ip, "Bridge connection rejected: {}", e);
            self.commit(epoch, ConnectionState::error(e.to_string()));
            return Err(e);
        }

        let now = self.inner.clock.now();
        let mut outcome = Err(Error::Cancelled);
        let store = &self.inner.store;
        self.inner.state.send_if_modified(|current| {
            if self.inner.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            // Checks that started while connecting may hold the old record.
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
            // Persist under the state lock so a concurrent forget_connection
            // cannot be overwritten by this attempt.
            let next = match store.save(&ConnectionRecord::validated(&credentials, now)) {
                Ok(()) => {
                    outcome = Ok(credentials.clone());
                    ConnectionState::connected(&credentials, now)
                }
                Err(e) => {
                    warn!("Failed to persist bridge connection: {}", e);
                    let next = ConnectionState::error(format!("failed to persist connection: {e}"));
                    outcome = Err(e.into());
                    next
                }
            };
            self.publish(current, next)
        });

        match &outcome {
            Ok(_) => info!(bridge_ip = %credentials.bridge_ip, "Bridge connection established"),
            Err(Error::Cancelled) => debug!("Bridge connection superseded before it was stored"),
            Err(_) => {}
        }
        outcome
    }

    /// Recover the connection from the stored record.
    ///
    /// Validates the stored credential within the recovery timeout. Timeouts,
    /// network errors and rejections are reported to the [`ErrorReporter`] as
    /// distinct issue kinds and leave the state in `Error`. With no stored
    /// record the state is left unchanged.
    pub async fn recover(&self) -> Result<Credentials> {
        let _gate = self.inner.recovery_gate.lock().await;
        self.recover_locked().await
    }

    /// Re-confirm the current connection with the bridge.
    ///
    /// Uses the in-memory credential when connected and the stored record
    /// otherwise. Success refreshes the validation time (monotonically) and the
    /// stored success time; failure moves the state to `Error`. The result is
    /// dropped if the connection was reset while validating, and it never
    /// replaces a `Connected` state holding other credentials.
    pub async fn revalidate(&self) -> Result<()> {
        let (cached, epoch) = {
            let state = self.inner.state.borrow();
            (state.credentials(), self.inner.epoch.load(Ordering::SeqCst))
        };
        let credentials = match cached {
            Some(credentials) => credentials,
            None => self
                .inner
                .store
                .load()?
                .map(|record| record.credentials())
                .ok_or(Error::NoStoredConnection)?,
        };

        let verdict = self
            .validate_bounded(&credentials, self.inner.config.validation_timeout())
            .await;

        match verdict {
            Ok(()) => {
                let now = self.inner.clock.now();
                if let Err(e) = self.inner.store.touch_success(&credentials, now) {
                    warn!("Failed to record bridge success time: {}", e);
                }
                self.apply(epoch, |current| match current {
                    ConnectionState::Connecting => None,
                    ConnectionState::Connected {
                        last_validated_at, ..
                    } => current.holds(&credentials).then(|| {
                        ConnectionState::connected(&credentials, (*last_validated_at).max(now))
                    }),
                    ConnectionState::Disconnected | ConnectionState::Error { .. } => {
                        Some(ConnectionState::connected(&credentials, now))
                    }
                });
                trace!(bridge_ip = %credentials.bridge_ip, "Bridge connection revalidated");
                Ok(())
            }
            Err(e) => {
                warn!(bridge_ip = %credentials.bridge_ip, "Bridge revalidation failed: {}", e);
                self.apply(epoch, |current| match current {
                    ConnectionState::Connecting => None,
                    ConnectionState::Connected { .. } if !current.holds(&credentials) => None,
                    _ => Some(ConnectionState::error(e.to_string())),
                });
                Err(e)
            }
        }
    }

    /// Forget the bridge: clear the stored record and become `Disconnected`.
    ///
    /// In-flight validations for the forgotten connection are discarded.
    pub fn forget_connection(&self) -> Result<()> {
        let mut outcome = Ok(());
        let store = &self.inner.store;
        self.inner.state.send_if_modified(|current| {
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
            outcome = store.clear();
            self.publish(current, ConnectionState::Disconnected)
        });
        info!("Forgot bridge connection");
        outcome.map_err(Error::from)
    }

    /// Stop background work started by this state machine.
    ///
    /// A detached revalidation in flight is cancelled; `get_validated()` keeps
    /// serving the cache afterwards but no longer revalidates it.
    pub fn cleanup(&self) {
        debug!("Cleaning up connection state machine");
        self.inner.shutdown.cancel();
    }

    fn spawn_revalidation(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        let Some(in_flight) = InFlight::try_claim(&self.inner.revalidating) else {
            trace!("Revalidation already in flight");
            return;
        };

        let machine = self.clone();
        tokio::spawn(async move {
            let _in_flight = in_flight;
            tokio::select! {
                _ = machine.inner.shutdown.cancelled() => {
                    debug!("Background revalidation cancelled");
                }
                result = machine.revalidate() => {
                    if let Err(e) = result {
                        let bridge_ip = machine.stored_bridge_ip().unwrap_or_default();
                        machine.inner.events.send(BridgeEvent::RevalidationFailed {
                            bridge_ip,
                            error: e.to_string(),
                        });
                    }
                }
            }
        });
    }

    async fn wait_settled(&self) -> Option<Credentials> {
        let mut rx = self.subscribe();
        let settled = timeout(
            self.inner.config.validation_timeout(),
            rx.wait_for(|state| !matches!(state, ConnectionState::Connecting)),
        )
        .await;
        match settled {
            Ok(Ok(state)) => state.credentials(),
            _ => None,
        }
    }

    /// Recovery body; the caller holds the recovery gate.
    async fn recover_locked(&self) -> Result<Credentials> {
        let Some(record) = self.inner.store.load()? else {
            debug!("No stored bridge connection to recover");
            return Err(Error::NoStoredConnection);
        };
        let credentials = record.credentials();
        let recovery_timeout = self.inner.config.recovery_timeout();
        info!(bridge_ip = %credentials.bridge_ip, "Recovering bridge connection");

        let epoch = self.reset(ConnectionState::Connecting);
        let guard = AttemptGuard::new(|| self.abandon(epoch));
        let verdict = self.validate_bounded(&credentials, recovery_timeout).await;
        guard.disarm();

        match verdict {
            Ok(()) => {
                let now = self.inner.clock.now();
                if let Err(e) = self.inner.store.touch_success(&credentials, now) {
                    warn!("Failed to record bridge success time: {}", e);
                }
                if self.commit(epoch, ConnectionState::connected(&credentials, now)) {
                    info!(bridge_ip = %credentials.bridge_ip, "Bridge connection recovered");
                    Ok(credentials)
                } else {
                    Err(Error::Cancelled)
                }
            }
            Err(e) => {
                let kind = match &e {
                    Error::ValidationFailed {
                        reason: ValidationFailureReason::TimedOut(_),
                    } => RecoveryIssueKind::Timeout,
                    Error::ValidationFailed {
                        reason: ValidationFailureReason::Rejected,
                    } => RecoveryIssueKind::Rejected,
                    _ => RecoveryIssueKind::Unreachable,
                };
                let issue = RecoveryIssue {
                    kind,
                    bridge_ip: credentials.bridge_ip.clone(),
                    message: e.to_string(),
                };
                warn!(kind = ?kind, bridge_ip = %issue.bridge_ip, "Bridge recovery failed: {}", e);
                self.inner.reporter.report(&issue);
                self.inner.events.send(BridgeEvent::RecoveryIssue { issue });
                self.commit(epoch, ConnectionState::error(e.to_string()));

                Err(match kind {
                    RecoveryIssueKind::Timeout => Error::RecoveryTimeout {
                        timeout: recovery_timeout,
                    },
                    _ => e,
                })
            }
        }
    }

    async fn validate_bounded(
        &self,
        credentials: &Credentials,
        limit: std::time::Duration,
    ) -> Result<()> {
        let call = self
            .inner
            .client
            .validate(&credentials.bridge_ip, &credentials.credential);
        match timeout(limit, call).await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(Error::validation_rejected()),
            Ok(Err(e)) => Err(Error::validation_failed(
                ValidationFailureReason::Unreachable(e.to_string()),
            )),
            Err(_) => Err(Error::validation_failed(ValidationFailureReason::TimedOut(
                limit,
            ))),
        }
    }

    fn stored_bridge_ip(&self) -> Option<String> {
        self.inner
            .store
            .load()
            .ok()
            .flatten()
            .map(|record| record.bridge_ip)
    }

    /// Unconditionally replace the state, starting a new epoch.
    fn reset(&self, next: ConnectionState) -> u64 {
        let mut epoch = 0;
        self.inner.state.send_if_modified(|current| {
            epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            self.publish(current, next)
        });
        epoch
    }

    /// Apply the transition chosen by `decide` if `epoch` is still current.
    fn apply(
        &self,
        epoch: u64,
        decide: impl FnOnce(&ConnectionState) -> Option<ConnectionState>,
    ) -> bool {
        let mut applied = false;
        self.inner.state.send_if_modified(|current| {
            if self.inner.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            match decide(current) {
                Some(next) => {
                    applied = true;
                    self.publish(current, next)
                }
                None => false,
            }
        });
        applied
    }

    /// Finish the attempt that started `epoch`, if it is still current.
    ///
    /// Starts a new epoch, so checks begun while the attempt was pending are
    /// dropped.
    fn commit(&self, epoch: u64, next: ConnectionState) -> bool {
        let mut committed = false;
        self.inner.state.send_if_modified(|current| {
            if self.inner.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
            committed = true;
            self.publish(current, next)
        });
        committed
    }

    fn abandon(&self, epoch: u64) {
        let resolved = self.apply(epoch, |current| {
            matches!(current, ConnectionState::Connecting)
                .then(|| ConnectionState::error(ABANDONED_MESSAGE))
        });
        if resolved {
            warn!("Connection attempt dropped before completing");
        }
    }

    /// Write `next` into the locked state; returns whether it changed.
    fn publish(&self, current: &mut ConnectionState, next: ConnectionState) -> bool {
        if *current == next {
            return false;
        }
        debug!(from = %current, to = %next, "Connection state changed");
        let bridge_ip = next.credentials().map(|c| c.bridge_ip);
        self.inner.events.send(BridgeEvent::StateChanged {
            status: next.status(),
            bridge_ip,
        });
        *current = next;
        true
    }
}

/// Builder for [`ConnectionStateMachine`].
pub struct ConnectionStateMachineBuilder {
    store: Arc<dyn ConnectionStore>,
    client: Arc<dyn BridgeClient>,
    reporter: Arc<dyn ErrorReporter>,
    clock: Arc<dyn Clock>,
    config: ConnectionConfig,
    events: EventDispatcher,
}

impl ConnectionStateMachineBuilder {
    /// Set the error reporter (default: [`TracingReporter`]).
    #[must_use]
    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Set the wall clock (default: [`SystemClock`]).
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the connection settings.
    #[must_use]
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an event dispatcher with other components.
    #[must_use]
    pub fn events(mut self, events: EventDispatcher) -> Self {
        self.events = events;
        self
    }

    /// Build the state machine in the `Disconnected` state.
    pub fn build(self) -> ConnectionStateMachine {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        ConnectionStateMachine {
            inner: Arc::new(Inner {
                store: self.store,
                client: self.client,
                reporter: self.reporter,
                clock: self.clock,
                config: self.config,
                events: self.events,
                state,
                epoch: AtomicU64::new(0),
                revalidating: Arc::new(AtomicBool::new(false)),
                recovery_gate: Mutex::new(()),
                shutdown: CancellationToken::new(),
            }),
        }
    }
}
