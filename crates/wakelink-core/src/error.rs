//! Error types for wakelink-core.
//!
//! # Failure Taxonomy
//!
//! | Error | Raised by | Effect on state | Surfaced to caller |
//! |-------|-----------|-----------------|--------------------|
//! | [`Error::ValidationFailed`] | validation during setup, recovery or health checks | `Error` | only by `set_connection` |
//! | [`Error::RecoveryTimeout`] | bounded `recover()` | `Error` | via `ConnectionUnavailable` |
//! | [`Error::ConnectionUnavailable`] | `get_validated()` | unchanged | yes |
//! | [`Error::SchedulingFailure`] | job platform submissions | none | logged only |
//!
//! Background revalidation failures update the shared state but are never
//! returned to an unrelated caller. Pre-check job failures are swallowed so
//! the job platform never retries them.
//!
//! ## Transient vs. configuration failures
//!
//! [`Error::is_transient`] separates failures that usually resolve on their
//! own (bridge powered off, Wi-Fi flapping) from failures that need the user to
//! run setup again (credential rejected, nothing stored):
//!
//! ```
//! use wakelink_core::{Error, ValidationFailureReason};
//!
//! let offline = Error::validation_failed(ValidationFailureReason::Unreachable("no route".into()));
//! assert!(offline.is_transient());
//!
//! let rejected = Error::validation_failed(ValidationFailureReason::Rejected);
//! assert!(!rejected.is_transient());
//! ```

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in the bridge connectivity subsystem.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The bridge rejected the credential or could not be reached.
    #[error("Validation failed: {reason}")]
    ValidationFailed {
        /// Why validation failed.
        reason: ValidationFailureReason,
    },

    /// A bounded recovery attempt exceeded its deadline.
    #[error("Recovery timed out after {timeout:?}")]
    RecoveryTimeout {
        /// The recovery deadline.
        timeout: Duration,
    },

    /// Neither the cache nor recovery produced a usable connection.
    #[error("Bridge connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// The background-job platform rejected a submission.
    #[error("Scheduling '{key}' failed: {message}")]
    SchedulingFailure {
        /// The job key.
        key: String,
        /// Platform-provided reason.
        message: String,
    },

    /// Network failure while talking to the bridge.
    #[error("Network error: {0}")]
    Network(String),

    /// There is no stored connection to recover from.
    #[error("No stored bridge connection")]
    NoStoredConnection,

    /// Persistence error.
    #[error("Storage error: {0}")]
    Storage(#[from] wakelink_store::Error),

    /// The prediction collaborator failed.
    #[error("Prediction failed: {0}")]
    Prediction(String),

    /// The discovery collaborator failed.
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Structured reasons for validation failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationFailureReason {
    /// The bridge answered and rejected the credential.
    Rejected,
    /// The bridge could not be reached.
    Unreachable(String),
    /// Validation did not finish in time.
    TimedOut(Duration),
}

impl std::fmt::Display for ValidationFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected => write!(f, "bridge rejected credential"),
            Self::Unreachable(msg) => write!(f, "bridge unreachable: {}", msg),
            Self::TimedOut(after) => write!(f, "no answer from bridge after {:?}", after),
        }
    }
}

impl Error {
    /// Create a validation failure.
    pub fn validation_failed(reason: ValidationFailureReason) -> Self {
        Self::ValidationFailed { reason }
    }

    /// Create a rejected-credential validation failure.
    pub fn validation_rejected() -> Self {
        Self::validation_failed(ValidationFailureReason::Rejected)
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Create a scheduling failure for a job key.
    pub fn scheduling_failure(key: impl ToString, message: impl Into<String>) -> Self {
        Self::SchedulingFailure {
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether the failure is expected to clear without user action.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ValidationFailed { reason } => {
                !matches!(reason, ValidationFailureReason::Rejected)
            }
            Self::RecoveryTimeout { .. } | Self::Network(_) | Self::SchedulingFailure { .. } => {
                true
            }
            Self::ConnectionUnavailable(_)
            | Self::NoStoredConnection
            | Self::Storage(_)
            | Self::Prediction(_)
            | Self::Discovery(_)
            | Self::InvalidConfig(_)
            | Self::Cancelled => false,
        }
    }
}

/// Result type alias using wakelink-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
