//! Connection types shared between the store and the core state machine.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Address and secret needed to talk to a bridge.
///
/// The `Debug` implementation redacts the credential so that values can be
/// logged freely.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credentials {
    /// Bridge IP address on the local network.
    pub bridge_ip: String,
    /// Long-lived credential (opaque).
    pub credential: String,
}

impl Credentials {
    /// Create a new credential pair.
    pub fn new(bridge_ip: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            bridge_ip: bridge_ip.into(),
            credential: credential.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("bridge_ip", &self.bridge_ip)
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// The single persisted connection record.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConnectionRecord {
    /// Bridge IP address.
    pub bridge_ip: String,
    /// Bridge credential.
    pub credential: String,
    /// Last time the bridge accepted this credential.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub last_success_at: OffsetDateTime,
    /// Whether the record was validated before it was written.
    pub validated: bool,
}

impl ConnectionRecord {
    /// Create a validated record for `credentials`, successful at `at`.
    pub fn validated(credentials: &Credentials, at: OffsetDateTime) -> Self {
        Self {
            bridge_ip: credentials.bridge_ip.clone(),
            credential: credentials.credential.clone(),
            last_success_at: at,
            validated: true,
        }
    }

    /// The ip/credential pair held by this record.
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.bridge_ip, &self.credential)
    }

    /// Whether this record holds exactly `credentials`.
    pub fn matches(&self, credentials: &Credentials) -> bool {
        self.bridge_ip == credentials.bridge_ip && self.credential == credentials.credential
    }
}

impl fmt::Debug for ConnectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRecord")
            .field("bridge_ip", &self.bridge_ip)
            .field("credential", &"<redacted>")
            .field("last_success_at", &self.last_success_at)
            .field("validated", &self.validated)
            .finish()
    }
}

/// Current in-memory connection state.
///
/// Exactly one value is current at any instant; the core state machine is the
/// only writer.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No usable connection record.
    #[default]
    Disconnected,
    /// A connection is being established or recovered.
    Connecting,
    /// The bridge is usable.
    Connected {
        /// Bridge IP address.
        bridge_ip: String,
        /// Bridge credential.
        credential: String,
        /// When the credential was last confirmed by the bridge.
        last_validated_at: OffsetDateTime,
    },
    /// The last validation attempt failed.
    Error {
        /// Human-readable failure description.
        message: String,
    },
}

impl ConnectionState {
    /// Build a `Connected` state.
    pub fn connected(credentials: &Credentials, last_validated_at: OffsetDateTime) -> Self {
        Self::Connected {
            bridge_ip: credentials.bridge_ip.clone(),
            credential: credentials.credential.clone(),
            last_validated_at,
        }
    }

    /// Build an `Error` state.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Check if the state is `Connected`.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Credentials held by a `Connected` state.
    pub fn credentials(&self) -> Option<Credentials> {
        match self {
            Self::Connected {
                bridge_ip,
                credential,
                ..
            } => Some(Credentials::new(bridge_ip, credential)),
            _ => None,
        }
    }

    /// Last validation time of a `Connected` state.
    pub fn last_validated_at(&self) -> Option<OffsetDateTime> {
        match self {
            Self::Connected {
                last_validated_at, ..
            } => Some(*last_validated_at),
            _ => None,
        }
    }

    /// Whether this is a `Connected` state holding exactly `credentials`.
    pub fn holds(&self, credentials: &Credentials) -> bool {
        match self {
            Self::Connected {
                bridge_ip,
                credential,
                ..
            } => *bridge_ip == credentials.bridge_ip && *credential == credentials.credential,
            _ => false,
        }
    }

    /// Credential-free summary of this state.
    pub fn status(&self) -> ConnectionStatus {
        match self {
            Self::Disconnected => ConnectionStatus::Disconnected,
            Self::Connecting => ConnectionStatus::Connecting,
            Self::Connected { .. } => ConnectionStatus::Connected,
            Self::Error { .. } => ConnectionStatus::Error,
        }
    }
}

impl fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected {
                bridge_ip,
                last_validated_at,
                ..
            } => f
                .debug_struct("Connected")
                .field("bridge_ip", bridge_ip)
                .field("credential", &"<redacted>")
                .field("last_validated_at", last_validated_at)
                .finish(),
            Self::Error { message } => f.debug_struct("Error").field("message", message).finish(),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected { bridge_ip, .. } => write!(f, "connected to {}", bridge_ip),
            Self::Error { message } => write!(f, "error: {}", message),
        }
    }
}

/// Credential-free summary of a [`ConnectionState`], suitable for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ConnectionStatus {
    /// See [`ConnectionState::Disconnected`].
    Disconnected,
    /// See [`ConnectionState::Connecting`].
    Connecting,
    /// See [`ConnectionState::Connected`].
    Connected,
    /// See [`ConnectionState::Error`].
    Error,
}
