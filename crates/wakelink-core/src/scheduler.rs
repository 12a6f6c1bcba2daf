//! Predictive pre-check scheduling.
//!
//! Predicted wake times become durable one-shot jobs that fire `lookahead`
//! before each wake-up. Job keys are ordinal slots (`precheck_0`,
//! `precheck_1`, ...), so a recalculation cancels the whole namespace and
//! re-submits; nothing accumulates across replans or process restarts.
//!
//! When there is nothing to plan (no predictions, a failing predictor, or
//! only past check times) a single recurring fallback job keeps the bridge
//! checked at a fixed interval instead.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use wakelink_types::{JobKey, JobPayload, ScheduledCheck};

use crate::clock::{Clock, SystemClock};
use crate::config::{MAX_PREDICTIONS_LIMIT, ScheduleConfig};
use crate::error::Error;
use crate::events::{BridgeEvent, EventDispatcher};
use crate::traits::{JobScheduler, WakePredictor};

/// Turn predicted wake times into pre-checks.
///
/// Wake times are de-duplicated and sorted, and those past the horizon are
/// ignored; each gets a check `lookahead` earlier. Checks not strictly after
/// `now` are dropped, and at most
/// `max_predictions` remain. Two wake times inside one lookahead window still
/// get one check each.
///
/// # Example
///
/// ```
/// use time::macros::datetime;
/// use wakelink_core::{ScheduleConfig, plan_checks};
///
/// let now = datetime!(2026-10-19 05:00 UTC);
/// let checks = plan_checks(now, &[datetime!(2026-10-19 06:00 UTC)], &ScheduleConfig::default());
/// assert_eq!(checks[0].target_time, datetime!(2026-10-19 05:50 UTC));
/// ```
pub fn plan_checks(
    now: OffsetDateTime,
    predictions: &[OffsetDateTime],
    config: &ScheduleConfig,
) -> Vec<ScheduledCheck> {
    let mut wake_times = predictions.to_vec();
    wake_times.sort();
    wake_times.dedup();

    let Ok(lookahead) = time::Duration::try_from(config.lookahead()) else {
        return Vec::new();
    };
    // None when the horizon reaches past the representable range.
    let horizon_end = time::Duration::try_from(config.horizon())
        .ok()
        .and_then(|horizon| now.checked_add(horizon));
    wake_times
        .into_iter()
        .filter(|wake_time| horizon_end.is_none_or(|end| *wake_time <= end))
        .filter_map(|wake_time| Some((wake_time, wake_time.checked_sub(lookahead)?)))
        .filter(|(_, target_time)| *target_time > now)
        .take(config.max_predictions as usize)
        .zip(0..)
        .map(|((wake_time, target_time), sequence_index)| ScheduledCheck {
            target_time,
            sequence_index,
            wake_time,
        })
        .collect()
}

/// What a recalculation submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecalculateSummary {
    /// Pre-checks the job platform accepted.
    pub scheduled: Vec<ScheduledCheck>,
    /// Keys the job platform rejected.
    pub failed: Vec<JobKey>,
    /// Whether the fixed-interval fallback was submitted instead of pre-checks.
    pub used_fallback: bool,
}

impl RecalculateSummary {
    /// Whether every submission succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

struct Inner {
    predictor: Arc<dyn WakePredictor>,
    jobs: Arc<dyn JobScheduler>,
    clock: Arc<dyn Clock>,
    config: ScheduleConfig,
    events: EventDispatcher,
    /// Serializes recalculations so batches never interleave.
    replan: Mutex<()>,
}

/// Converts predicted wake times into durable pre-check jobs.
///
/// Cloning is cheap; clones share the same collaborators.
#[derive(Clone)]
pub struct PredictiveScheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PredictiveScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictiveScheduler")
            .field("config", &self.inner.config)
            .finish()
    }
}

impl PredictiveScheduler {
    /// Create a scheduler using the system clock.
    pub fn new(
        predictor: Arc<dyn WakePredictor>,
        jobs: Arc<dyn JobScheduler>,
        config: ScheduleConfig,
        events: EventDispatcher,
    ) -> Self {
        Self::with_clock(predictor, jobs, Arc::new(SystemClock), config, events)
    }

    /// Create a scheduler with an explicit clock.
    pub fn with_clock(
        predictor: Arc<dyn WakePredictor>,
        jobs: Arc<dyn JobScheduler>,
        clock: Arc<dyn Clock>,
        config: ScheduleConfig,
        events: EventDispatcher,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                predictor,
                jobs,
                clock,
                config,
                events,
                replan: Mutex::new(()),
            }),
        }
    }

    /// Scheduling settings in use.
    pub fn config(&self) -> &ScheduleConfig {
        &self.inner.config
    }

    /// Register the daily replan job and plan the first batch.
    pub async fn start(&self) -> RecalculateSummary {
        let interval = self.inner.config.replan_interval();
        let submitted = self
            .inner
            .jobs
            .schedule_recurring(
                JobKey::DailyReplan,
                interval,
                JobPayload::DailyReplan,
                self.inner.config.constraints(),
            )
            .await;
        match &submitted {
            Ok(()) => {
                debug!(interval_secs = interval.as_secs(), "Registered daily replan");
                self.inner.events.send(BridgeEvent::RecurringJobScheduled {
                    key: JobKey::DailyReplan.to_string(),
                    interval_secs: interval.as_secs(),
                });
            }
            Err(e) => self.scheduling_failed(JobKey::DailyReplan, e),
        }

        let mut summary = self.recalculate().await;
        if submitted.is_err() {
            summary.failed.push(JobKey::DailyReplan);
        }
        summary
    }

    /// Replace the pending pre-checks with a fresh batch.
    ///
    /// Never fails: predictor errors fall back to the fixed interval, and
    /// rejected submissions are logged, published and skipped.
    pub async fn recalculate(&self) -> RecalculateSummary {
        let _replan = self.inner.replan.lock().await;
        let config = &self.inner.config;

        let predictions = match self
            .inner
            .predictor
            .next_wake_times(config.horizon_days, config.max_predictions as usize)
            .await
        {
            Ok(predictions) => predictions,
            Err(e) => {
                warn!("Wake-time prediction failed, using fallback schedule: {}", e);
                Vec::new()
            }
        };

        let now = self.inner.clock.now();
        let plan = plan_checks(now, &predictions, config);
        debug!(
            predictions = predictions.len(),
            planned = plan.len(),
            "Recalculating pre-checks"
        );

        self.cancel_prechecks().await;

        let mut summary = RecalculateSummary::default();
        if plan.is_empty() {
            summary.used_fallback = true;
            if let Err(key) = self.schedule_fallback().await {
                summary.failed.push(key);
            }
            return summary;
        }

        for check in plan {
            let key = check.key();
            let submitted = self
                .inner
                .jobs
                .schedule(key, check.target_time, check.payload(), config.constraints())
                .await;
            match submitted {
                Ok(()) => {
                    debug!(%key, run_at = %check.target_time, "Scheduled pre-check");
                    self.inner.events.send(BridgeEvent::JobScheduled {
                        key: key.to_string(),
                        run_at: check.target_time,
                    });
                    summary.scheduled.push(check);
                }
                Err(e) => {
                    self.scheduling_failed(key, &e);
                    summary.failed.push(key);
                }
            }
        }

        info!(
            scheduled = summary.scheduled.len(),
            failed = summary.failed.len(),
            "Pre-checks scheduled"
        );
        summary
    }

    /// Body of the daily replan job.
    pub async fn daily_replan(&self) -> RecalculateSummary {
        info!("Running daily pre-check replan");
        self.recalculate().await
    }

    /// A connection was just established; predictions may now be actionable.
    pub async fn on_connection_established(&self) -> RecalculateSummary {
        debug!("Connection established, replanning pre-checks");
        self.recalculate().await
    }

    /// Cancel every job this scheduler owns, including the daily replan.
    pub async fn cancel_all(&self) {
        let _replan = self.inner.replan.lock().await;
        self.cancel_prechecks().await;
        self.cancel(JobKey::DailyReplan).await;
        info!("Cancelled all pre-check jobs");
    }

    async fn schedule_fallback(&self) -> Result<(), JobKey> {
        let interval = self.inner.config.fallback_interval();
        let submitted = self
            .inner
            .jobs
            .schedule_recurring(
                JobKey::Fallback,
                interval,
                JobPayload::FallbackCheck,
                self.inner.config.constraints(),
            )
            .await;
        match submitted {
            Ok(()) => {
                info!(
                    interval_secs = interval.as_secs(),
                    "No upcoming wake times, scheduled fallback check"
                );
                self.inner.events.send(BridgeEvent::RecurringJobScheduled {
                    key: JobKey::Fallback.to_string(),
                    interval_secs: interval.as_secs(),
                });
                Ok(())
            }
            Err(e) => {
                self.scheduling_failed(JobKey::Fallback, &e);
                Err(JobKey::Fallback)
            }
        }
    }

    /// Cancel every per-prediction slot and the fallback.
    ///
    /// Slots past the configured batch size are cleared quietly; they only
    /// hold jobs planned under an earlier, larger limit.
    async fn cancel_prechecks(&self) {
        for index in 0..MAX_PREDICTIONS_LIMIT {
            let key = JobKey::PreCheck(index);
            if index < self.inner.config.max_predictions {
                self.cancel(key).await;
            } else if let Err(e) = self.inner.jobs.cancel(key).await {
                debug!(%key, "Failed to clear unused pre-check slot: {}", e);
            }
        }
        self.cancel(JobKey::Fallback).await;
    }

    async fn cancel(&self, key: JobKey) {
        match self.inner.jobs.cancel(key).await {
            Ok(()) => self.inner.events.send(BridgeEvent::JobCancelled {
                key: key.to_string(),
            }),
            Err(e) => warn!(%key, "Failed to cancel job: {}", e),
        }
    }

    fn scheduling_failed(&self, key: JobKey, error: &Error) {
        warn!(%key, "Job submission rejected: {}", error);
        self.inner.events.send(BridgeEvent::SchedulingFailed {
            key: key.to_string(),
            error: error.to_string(),
        });
    }
}
