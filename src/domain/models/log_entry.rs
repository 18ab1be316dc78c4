//! Append-only log entries recorded against a task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The kind of event a log entry records. Mirrors the `log_type` column the
/// scrapers wrote directly; kept narrow and closed rather than a free string
/// so `log_buffer` can template messages consistently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    PropertyUpdate,
    Error,
    Warning,
}

impl LogKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PropertyUpdate => "property_update",
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "property_update" => Some(Self::PropertyUpdate),
            "error" => Some(Self::Error),
            "warning" => Some(Self::Warning),
            _ => None,
        }
    }
}

/// One append-only record in a task's log. `id` is assigned by the store on
/// insert and is what `ReadLogsSince` diffs against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub task_id: Uuid,
    pub kind: LogKind,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub details: Option<Value>,
}

/// A not-yet-persisted log entry, built by the services that append to the
/// buffer; the store assigns `id` and `timestamp` at insert time.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub task_id: Uuid,
    pub kind: LogKind,
    pub message: String,
    pub details: Option<Value>,
}

impl NewLogEntry {
    pub fn property_update(task_id: Uuid, message: impl Into<String>) -> Self {
        Self { task_id, kind: LogKind::PropertyUpdate, message: message.into(), details: None }
    }

    pub fn error(task_id: Uuid, message: impl Into<String>, details: Option<Value>) -> Self {
        Self { task_id, kind: LogKind::Error, message: message.into(), details }
    }

    pub fn warning(task_id: Uuid, message: impl Into<String>, details: Option<Value>) -> Self {
        Self { task_id, kind: LogKind::Warning, message: message.into(), details }
    }
}
