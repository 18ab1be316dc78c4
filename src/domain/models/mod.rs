//! Domain models
//!
//! Pure domain entities with business logic and validation rules.
//! These models are framework-agnostic and contain no infrastructure concerns.

pub mod area;
pub mod config;
pub mod log_entry;
pub mod progress;
pub mod schedule;
pub mod task;

pub use area::{is_valid_code, name_ja_for_code, resolve_code, romaji_for_code, WardEntry, TOKYO_WARDS};
pub use config::{DatabaseConfig, EngineConfig, LoggingConfig};
pub use log_entry::{LogEntry, LogKind, NewLogEntry};
pub use progress::{ProgressPatch, ProgressRecord, ProgressStatus};
pub use schedule::{Schedule, ScheduleHistory, ScheduleHistoryStatus, ScheduleStatus, ScheduleType};
pub use task::{Task, TaskKind, TaskOptions, TaskStatus};
