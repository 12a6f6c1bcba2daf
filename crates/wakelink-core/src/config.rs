//! Subsystem configuration.
//!
//! Every field has a default, so an empty file (or no file at all) yields the
//! standard timings:
//!
//! ```toml
//! [connection]
//! cache_ttl_secs = 1800
//! recovery_timeout_secs = 10
//! validation_timeout_secs = 10
//!
//! [health]
//! foreground_interval_secs = 300
//! foreground_poll_secs = 60
//! background_interval_secs = 1800
//! background_poll_secs = 600
//!
//! [schedule]
//! lookahead_secs = 600
//! horizon_days = 7
//! max_predictions = 10
//! fallback_interval_secs = 21600
//! replan_interval_secs = 86400
//! requires_network = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use wakelink_types::JobConstraints;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WakelinkConfig {
    /// Connection cache and validation timings.
    pub connection: ConnectionConfig,
    /// Health-check loop timings.
    pub health: HealthConfig,
    /// Predictive scheduling.
    pub schedule: ScheduleConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Event channel settings.
    pub events: EventsConfig,
}

impl WakelinkConfig {
    /// Load configuration from the default path, or defaults if it doesn't exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.connection.validate());
        errors.extend(self.health.validate());
        errors.extend(self.schedule.validate());
        errors.extend(self.storage.validate());

        if self.events.capacity == 0 {
            errors.push(ValidationError::new(
                "events.capacity",
                "capacity must be at least 1",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Connection cache and validation timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// How long a validated credential is served without revalidation.
    pub cache_ttl_secs: u64,
    /// Deadline for a `recover()` validation.
    pub recovery_timeout_secs: u64,
    /// Deadline for the validation performed by `set_connection()` and health checks.
    pub validation_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 30 * 60,
            recovery_timeout_secs: 10,
            validation_timeout_secs: 10,
        }
    }
}

impl ConnectionConfig {
    /// How long a validated credential is served without a network check.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Deadline for recovering from the stored record.
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }

    /// Deadline for a single validation call.
    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs)
    }

    /// Validate connection configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for (field, value) in [
            ("connection.cache_ttl_secs", self.cache_ttl_secs),
            ("connection.recovery_timeout_secs", self.recovery_timeout_secs),
            ("connection.validation_timeout_secs", self.validation_timeout_secs),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(field, "must be greater than 0"));
            }
        }
        errors
    }
}

/// Health-check loop timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Minimum spacing of checks while the app is visible.
    pub foreground_interval_secs: u64,
    /// Loop sleep while the app is visible.
    pub foreground_poll_secs: u64,
    /// Minimum spacing of checks while the app is hidden.
    pub background_interval_secs: u64,
    /// Loop sleep while the app is hidden.
    pub background_poll_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            foreground_interval_secs: 5 * 60,
            foreground_poll_secs: 60,
            background_interval_secs: 30 * 60,
            background_poll_secs: 10 * 60,
        }
    }
}

impl HealthConfig {
    /// Minimum spacing of checks while visible.
    pub fn foreground_interval(&self) -> Duration {
        Duration::from_secs(self.foreground_interval_secs)
    }

    /// Loop sleep while visible.
    pub fn foreground_poll(&self) -> Duration {
        Duration::from_secs(self.foreground_poll_secs)
    }

    /// Minimum spacing of checks while hidden.
    pub fn background_interval(&self) -> Duration {
        Duration::from_secs(self.background_interval_secs)
    }

    /// Loop sleep while hidden.
    pub fn background_poll(&self) -> Duration {
        Duration::from_secs(self.background_poll_secs)
    }

    /// Validate health-check configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for (field, value) in [
            ("health.foreground_interval_secs", self.foreground_interval_secs),
            ("health.foreground_poll_secs", self.foreground_poll_secs),
            ("health.background_interval_secs", self.background_interval_secs),
            ("health.background_poll_secs", self.background_poll_secs),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(field, "must be greater than 0"));
            }
        }
        if self.foreground_poll_secs > self.foreground_interval_secs {
            errors.push(ValidationError::new(
                "health.foreground_poll_secs",
                format!(
                    "poll ({}s) must not exceed the check interval ({}s)",
                    self.foreground_poll_secs, self.foreground_interval_secs
                ),
            ));
        }
        if self.background_poll_secs > self.background_interval_secs {
            errors.push(ValidationError::new(
                "health.background_poll_secs",
                format!(
                    "poll ({}s) must not exceed the check interval ({}s)",
                    self.background_poll_secs, self.background_interval_secs
                ),
            ));
        }
        errors
    }
}

/// Upper bound for `schedule.max_predictions`.
///
/// Also the number of `precheck_N` slots cleared on every recalculation, so
/// a batch planned under a larger limit is never left behind.
pub const MAX_PREDICTIONS_LIMIT: u32 = 100;

/// Predictive scheduling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// How long before a predicted wake time the pre-check runs.
    pub lookahead_secs: u64,
    /// How far ahead predictions are requested.
    pub horizon_days: u32,
    /// Maximum number of per-prediction jobs.
    pub max_predictions: u32,
    /// Interval of the fallback check used when nothing is predicted.
    pub fallback_interval_secs: u64,
    /// Interval of the re-planning job.
    pub replan_interval_secs: u64,
    /// Whether submitted jobs require network connectivity.
    pub requires_network: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            lookahead_secs: 10 * 60,
            horizon_days: 7,
            max_predictions: 10,
            fallback_interval_secs: 6 * 60 * 60,
            replan_interval_secs: 24 * 60 * 60,
            requires_network: true,
        }
    }
}

impl ScheduleConfig {
    /// How long before a wake time its pre-check runs.
    pub fn lookahead(&self) -> Duration {
        Duration::from_secs(self.lookahead_secs)
    }

    /// How far ahead wake times are considered.
    pub fn horizon(&self) -> Duration {
        Duration::from_secs(u64::from(self.horizon_days) * 24 * 60 * 60)
    }

    /// Interval of the fallback check.
    pub fn fallback_interval(&self) -> Duration {
        Duration::from_secs(self.fallback_interval_secs)
    }

    /// Interval of the re-planning job.
    pub fn replan_interval(&self) -> Duration {
        Duration::from_secs(self.replan_interval_secs)
    }

    /// Constraints attached to every submitted job.
    pub fn constraints(&self) -> JobConstraints {
        JobConstraints {
            requires_network: self.requires_network,
        }
    }

    /// Validate scheduling configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !(1..=30).contains(&self.horizon_days) {
            errors.push(ValidationError::new(
                "schedule.horizon_days",
                format!("{} is out of range (1-30)", self.horizon_days),
            ));
        }
        if !(1..=MAX_PREDICTIONS_LIMIT).contains(&self.max_predictions) {
            errors.push(ValidationError::new(
                "schedule.max_predictions",
                format!(
                    "{} is out of range (1-{})",
                    self.max_predictions, MAX_PREDICTIONS_LIMIT
                ),
            ));
        }
        if self.lookahead() >= self.horizon() {
            errors.push(ValidationError::new(
                "schedule.lookahead_secs",
                "lookahead must be shorter than the prediction horizon",
            ));
        }
        if self.fallback_interval_secs < 60 {
            errors.push(ValidationError::new(
                "schedule.fallback_interval_secs",
                "must be at least 60 seconds",
            ));
        }
        if self.replan_interval_secs < 60 {
            errors.push(ValidationError::new(
                "schedule.replan_interval_secs",
                "must be at least 60 seconds",
            ));
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: wakelink_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            ));
        }
        errors
    }
}

/// Event channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast buffer size; slow subscribers lose the oldest events.
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `health.foreground_poll_secs`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wakelink")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = WakelinkConfig::default();
        assert_eq!(config.connection.cache_ttl(), Duration::from_secs(1800));
        assert_eq!(config.connection.recovery_timeout(), Duration::from_secs(10));
        assert_eq!(config.health.foreground_interval(), Duration::from_secs(300));
        assert_eq!(config.health.foreground_poll(), Duration::from_secs(60));
        assert_eq!(config.health.background_interval(), Duration::from_secs(1800));
        assert_eq!(config.health.background_poll(), Duration::from_secs(600));
        assert_eq!(config.schedule.lookahead(), Duration::from_secs(600));
        assert_eq!(config.schedule.horizon(), Duration::from_secs(7 * 86400));
        assert_eq!(config.schedule.max_predictions, 10);
        assert_eq!(config.schedule.fallback_interval(), Duration::from_secs(6 * 3600));
        assert_eq!(config.schedule.replan_interval(), Duration::from_secs(86400));
        assert!(config.schedule.constraints().requires_network);
    }

    #[test]
    fn test_default_config_validates() {
        WakelinkConfig::default()
            .validate()
            .expect("default config should be valid");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: WakelinkConfig = toml::from_str(
            r#"
            [connection]
            cache_ttl_secs = 600

            [schedule]
            requires_network = false
            "#,
        )
        .unwrap();

        assert_eq!(config.connection.cache_ttl_secs, 600);
        assert_eq!(config.connection.recovery_timeout_secs, 10);
        assert!(!config.schedule.requires_network);
        assert_eq!(config.health, HealthConfig::default());
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");

        let mut config = WakelinkConfig::default();
        config.health.foreground_interval_secs = 120;
        config.storage.path = dir.path().join("connection.db");
        config.save(&path).unwrap();

        let loaded = WakelinkConfig::load_validated(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = WakelinkConfig::load("/nonexistent/wakelink/config.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[connection\ncache_ttl_secs = ").unwrap();

        let result = WakelinkConfig::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_zero_timings_rejected() {
        let mut config = WakelinkConfig::default();
        config.connection.recovery_timeout_secs = 0;
        config.health.foreground_interval_secs = 0;

        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation errors");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"connection.recovery_timeout_secs"));
        assert!(fields.contains(&"health.foreground_interval_secs"));
        // poll (60s) now exceeds the zero interval as well
        assert!(fields.contains(&"health.foreground_poll_secs"));
    }

    #[test]
    fn test_schedule_validation() {
        let mut config = WakelinkConfig::default();
        config.schedule.horizon_days = 0;
        config.schedule.max_predictions = 0;
        config.schedule.fallback_interval_secs = 5;

        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation errors");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"schedule.horizon_days"));
        assert!(fields.contains(&"schedule.max_predictions"));
        assert!(fields.contains(&"schedule.fallback_interval_secs"));
        assert!(fields.contains(&"schedule.lookahead_secs"));
    }

    #[test]
    fn test_empty_storage_path_rejected() {
        let mut config = WakelinkConfig::default();
        config.storage.path = PathBuf::new();
        config.events.capacity = 0;

        let err = config.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("storage.path"));
        assert!(msg.contains("events.capacity"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("wakelink/config.toml"));
    }
}
