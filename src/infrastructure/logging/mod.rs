//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON log formatting
//! - Log rotation
//! - Secret scrubbing
//! - Audit trail

pub mod audit;
pub mod config;
pub mod logger;
pub mod rotation;
pub mod secret_scrubbing;

pub use audit::{AuditEvent, AuditEventType, AuditLogger, AuditOutcome};
pub use config::{LogConfig, LogFormat, RotationPolicy};
pub use logger::LoggerImpl;
pub use rotation::LogRotator;
pub use secret_scrubbing::SecretScrubbingLayer;

use crate::domain::models::config::LoggingConfig;

impl From<&LoggingConfig> for LogConfig {
    /// Bridges the figment-facing `EngineConfig::logging` onto this layer's
    /// own type; `enable_stdout` has no `EngineConfig` knob (always on) since
    /// the control plane has no daemon mode that would want it off.
    fn from(cfg: &LoggingConfig) -> Self {
        Self {
            level: cfg.level.clone(),
            format: if cfg.format.eq_ignore_ascii_case("pretty") { LogFormat::Pretty } else { LogFormat::Json },
            log_dir: cfg.log_dir.as_ref().map(std::path::PathBuf::from),
            enable_stdout: true,
            rotation: RotationPolicy::Daily,
            retention_days: i64::from(cfg.retention_days),
        }
    }
}
