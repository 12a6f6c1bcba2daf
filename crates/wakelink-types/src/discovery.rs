//! Bridge discovery results and progress reports.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A bridge found on the local network.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bridge {
    /// Vendor-assigned bridge identifier.
    pub id: String,
    /// IP address on the local network.
    pub ip: String,
    /// Display name.
    pub name: String,
}

/// Stage of an ongoing discovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum DiscoveryStage {
    /// Discovery has not produced results yet.
    Starting,
    /// Network-service lookup in progress.
    ServiceLookup,
    /// Local subnet scan in progress.
    NetworkScan,
    /// Discovery finished.
    Completed,
    /// Discovery failed.
    Failed,
}

/// Progress report emitted during discovery.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiscoveryStatus {
    /// Current stage.
    pub stage: DiscoveryStage,
    /// Human-readable message.
    pub message: String,
    /// Progress in the range `0.0..=1.0`.
    pub progress: f32,
}

impl DiscoveryStatus {
    /// Create a status report, clamping `progress` into `0.0..=1.0`.
    pub fn new(stage: DiscoveryStage, message: impl Into<String>, progress: f32) -> Self {
        Self {
            stage,
            message: message.into(),
            progress: progress.clamp(0.0, 1.0),
        }
    }

    /// Whether discovery has stopped.
    pub fn is_terminal(&self) -> bool {
        matches!(self.stage, DiscoveryStage::Completed | DiscoveryStage::Failed)
    }
}
