use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub staleness: StalenessPolicy,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl AppConfig {
    /// Load and validate a TOML config. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path.as_ref()) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tracker.validate()?;
        self.sweeper.validate()?;
        self.staleness.validate()
    }
}

/// Longest accepted flush or sweep interval.
const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Longest accepted idle threshold or activity window.
const MAX_STALENESS_SECS: u64 = 365 * 24 * 60 * 60;

fn ensure(cond: bool, message: &str) -> Result<(), ConfigError> {
    if cond {
        Ok(())
    } else {
        Err(ConfigError::Invalid(message.to_string()))
    }
}

// ============================================================================
// Tracker
// ============================================================================

/// Which instant is written to `last_active` after a successful flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessPolicy {
    /// The time the flush ran.
    #[default]
    FlushTime,
    /// The newest event timestamp in the batch.
    LatestEventTimestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default)]
    pub liveness: LivenessPolicy,
    /// Flush whatever is already queued when the worker is stopped.
    #[serde(default = "default_true")]
    pub drain_on_shutdown: bool,
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(self.queue_capacity > 0, "tracker.queue_capacity must be > 0")?;
        ensure(self.max_batch_size > 0, "tracker.max_batch_size must be > 0")?;
        ensure(
            self.max_batch_size <= self.queue_capacity,
            "tracker.max_batch_size must not exceed tracker.queue_capacity",
        )?;
        ensure(
            self.flush_interval_ms > 0,
            "tracker.flush_interval_ms must be > 0",
        )?;
        ensure(
            self.flush_interval_ms <= MAX_INTERVAL_SECS * 1000,
            "tracker.flush_interval_ms must not exceed one day",
        )
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_batch_size: default_max_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            liveness: LivenessPolicy::default(),
            drain_on_shutdown: true,
        }
    }
}

// ============================================================================
// Sweeper
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweeperConfig {
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
}

impl SweeperConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(self.interval_secs > 0, "sweeper.interval_secs must be > 0")?;
        ensure(
            self.interval_secs <= MAX_INTERVAL_SECS,
            "sweeper.interval_secs must not exceed one day",
        )?;
        ensure(self.fetch_limit > 0, "sweeper.fetch_limit must be > 0")
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval_secs(),
            fetch_limit: default_fetch_limit(),
        }
    }
}

// ============================================================================
// Staleness
// ============================================================================

/// When an active session counts as abandoned.
///
/// A session is stale when its `last_active` is older than `idle_threshold`
/// and none of its events happened within `recent_activity_window`. The
/// second check covers liveness updates still waiting in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StalenessPolicy {
    #[serde(default = "default_idle_threshold_secs")]
    pub idle_threshold_secs: u64,
    #[serde(default = "default_recent_activity_window_secs")]
    pub recent_activity_window_secs: u64,
}

impl StalenessPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(
            self.idle_threshold_secs > 0,
            "staleness.idle_threshold_secs must be > 0",
        )?;
        ensure(
            self.idle_threshold_secs <= MAX_STALENESS_SECS,
            "staleness.idle_threshold_secs must not exceed one year",
        )?;
        ensure(
            self.recent_activity_window_secs > 0,
            "staleness.recent_activity_window_secs must be > 0",
        )?;
        ensure(
            self.recent_activity_window_secs <= MAX_STALENESS_SECS,
            "staleness.recent_activity_window_secs must not exceed one year",
        )
    }

    /// Saturates at `TimeDelta::MAX` for values chrono cannot represent.
    pub fn idle_threshold(&self) -> chrono::Duration {
        seconds_saturating(self.idle_threshold_secs)
    }

    pub fn recent_activity_window(&self) -> chrono::Duration {
        seconds_saturating(self.recent_activity_window_secs)
    }
}

fn seconds_saturating(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::TimeDelta::MAX)
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            idle_threshold_secs: default_idle_threshold_secs(),
            recent_activity_window_secs: default_recent_activity_window_secs(),
        }
    }
}

// ============================================================================
// Private Helpers (Serde Defaults)
// ============================================================================

fn default_queue_capacity() -> usize {
    1024
}

fn default_max_batch_size() -> usize {
    100
}

fn default_flush_interval_ms() -> u64 {
    5_000
}

fn default_sweep_interval_secs() -> u64 {
    15
}

fn default_fetch_limit() -> usize {
    1000
}

fn default_idle_threshold_secs() -> u64 {
    25 * 60
}

fn default_recent_activity_window_secs() -> u64 {
    30 * 60
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Tests
// ============================================================================
