//! Durable job descriptors for pre-emptive health checks.
//!
//! Every job the scheduler submits lives in the `precheck_` key namespace so
//! that a whole batch can be cancelled without remembering what was submitted
//! by an earlier process.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{ParseError, ParseResult};

/// Prefix shared by every pre-check job key.
pub const PRECHECK_KEY_PREFIX: &str = "precheck_";

const FALLBACK_SUFFIX: &str = "fallback";
const DAILY_REPLAN_SUFFIX: &str = "daily_replan";

/// Stable key of a durable job slot.
///
/// Submitting a job under an existing key replaces the pending job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobKey {
    /// Per-prediction pre-check, keyed by ordinal (`precheck_<n>`).
    PreCheck(u32),
    /// Fixed-interval recurring check used when no predictions exist.
    Fallback,
    /// Recurring daily re-planning job.
    DailyReplan,
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreCheck(index) => write!(f, "{}{}", PRECHECK_KEY_PREFIX, index),
            Self::Fallback => write!(f, "{}{}", PRECHECK_KEY_PREFIX, FALLBACK_SUFFIX),
            Self::DailyReplan => write!(f, "{}{}", PRECHECK_KEY_PREFIX, DAILY_REPLAN_SUFFIX),
        }
    }
}

impl FromStr for JobKey {
    type Err = ParseError;

    fn from_str(s: &str) -> ParseResult<Self> {
        let rest = s
            .strip_prefix(PRECHECK_KEY_PREFIX)
            .ok_or_else(|| ParseError::UnknownJobKey(s.to_string()))?;

        match rest {
            FALLBACK_SUFFIX => Ok(Self::Fallback),
            DAILY_REPLAN_SUFFIX => Ok(Self::DailyReplan),
            digits if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => digits
                .parse()
                .map(Self::PreCheck)
                .map_err(|_| ParseError::InvalidSequenceIndex { key: s.to_string() }),
            _ => Err(ParseError::InvalidSequenceIndex { key: s.to_string() }),
        }
    }
}

/// A pre-check derived from one predicted wake time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledCheck {
    /// When the check should run (`wake_time - lookahead`).
    pub target_time: OffsetDateTime,
    /// Ordinal of this check within its batch.
    pub sequence_index: u32,
    /// The predicted wake time this check prepares for.
    pub wake_time: OffsetDateTime,
}

impl ScheduledCheck {
    /// The durable job key for this check.
    pub fn key(&self) -> JobKey {
        JobKey::PreCheck(self.sequence_index)
    }

    /// The payload handed back to the job handler when the check runs.
    pub fn payload(&self) -> JobPayload {
        JobPayload::PreCheck {
            wake_time: self.wake_time,
            sequence_index: self.sequence_index,
        }
    }
}

/// Payload stored with a durable job.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum JobPayload {
    /// Pre-check ahead of a predicted wake time.
    PreCheck {
        /// The predicted wake time.
        #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
        wake_time: OffsetDateTime,
        /// Ordinal within the batch.
        sequence_index: u32,
    },
    /// Fixed-interval check used when no predictions exist.
    FallbackCheck,
    /// Daily re-planning of the pre-check batch.
    DailyReplan,
}

/// Execution constraints passed to the job platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JobConstraints {
    /// Only run while a network is available.
    pub requires_network: bool,
}

impl Default for JobConstraints {
    fn default() -> Self {
        Self {
            requires_network: true,
        }
    }
}

/// Result reported back to the job platform.
///
/// Check failures are recorded in the connection state, never surfaced as
/// platform retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum JobOutcome {
    /// The job is finished; the platform must not retry it.
    Success,
}
