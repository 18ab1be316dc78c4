//! Engine-wide tunables, layered in by `infrastructure::config::loader`.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the orchestrator process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Seconds a pause request waits for workers to checkpoint before the
    /// pausing task is force-cancelled.
    #[serde(default = "default_pause_timeout_seconds")]
    pub pause_timeout_seconds: u64,

    /// How often the stats sampler snapshots per-pair counters into
    /// `last_progress_at`.
    #[serde(default = "default_stats_sample_interval_seconds")]
    pub stats_sample_interval_seconds: u64,

    /// Minutes of no progress before the stall detector force-fails a task.
    #[serde(default = "default_stall_threshold_minutes")]
    pub stall_threshold_minutes: u64,

    /// Cap on rows returned by the list-tasks control operation.
    #[serde(default = "default_max_tasks_listed")]
    pub max_tasks_listed: u32,

    /// Seconds between scheduler ticks.
    #[serde(default = "default_scheduler_tick_seconds")]
    pub scheduler_tick_seconds: u64,
}

const fn default_pause_timeout_seconds() -> u64 {
    1800
}

const fn default_stats_sample_interval_seconds() -> u64 {
    2
}

const fn default_stall_threshold_minutes() -> u64 {
    30
}

const fn default_max_tasks_listed() -> u32 {
    100
}

const fn default_scheduler_tick_seconds() -> u64 {
    15
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            pause_timeout_seconds: default_pause_timeout_seconds(),
            stats_sample_interval_seconds: default_stats_sample_interval_seconds(),
            stall_threshold_minutes: default_stall_threshold_minutes(),
            max_tasks_listed: default_max_tasks_listed(),
            scheduler_tick_seconds: default_scheduler_tick_seconds(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".chintai/chintai.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration. Format and rotation knobs mirror
/// `infrastructure::logging::config::LogConfig`; this struct is the
/// figment-facing surface, the logging layer's own type is built from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    #[serde(default)]
    pub log_dir: Option<String>,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            retention_days: default_retention_days(),
        }
    }
}
