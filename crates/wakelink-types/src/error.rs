//! Error types for parsing in wakelink-types.

use thiserror::Error;

/// Errors that can occur when parsing wakelink identifiers.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// The job key does not belong to the pre-check namespace.
    #[error("Unknown job key: {0}")]
    UnknownJobKey(String),

    /// The job key has the pre-check prefix but an invalid sequence index.
    #[error("Invalid sequence index in job key '{key}'")]
    InvalidSequenceIndex {
        /// The offending key.
        key: String,
    },
}

/// Result type alias using wakelink-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
