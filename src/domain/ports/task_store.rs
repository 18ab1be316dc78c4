//! Durable, concurrency-safe storage of Tasks, ProgressRecords, and LogEntries.
//!
//! Grounded on the teacher's `TaskRepository` trait shape (`async_trait`,
//! filter struct, `DomainResult<T>` returns) but reworked around the control
//! plane's actual primitives: a finalisation-aware, exclusively-transacted
//! progress merge and an append-only log stream.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::log_entry::{LogEntry, NewLogEntry};
use crate::domain::models::progress::ProgressPatch;
use crate::domain::models::task::{Task, TaskKind, TaskOptions, TaskStatus};

/// Everything `CreateTask` needs; the caller supplies `task_id` since the
/// store does not guarantee idempotency on its own (§4.1).
#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_id: Uuid,
    pub kind: TaskKind,
    pub scrapers: Vec<String>,
    pub areas: Vec<String>,
    pub options: TaskOptions,
}

/// One of the two booleans that are the source of truth workers consult at
/// every checkpoint, per the task/status invariant in §3.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlag {
    Paused,
    Cancelled,
}

/// Filter criteria for `ListTasks`.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// When set, restricts to `status ∈ {pending, running, paused}` (§4.8).
    pub active_only: bool,
}

/// Repository interface for Task, ProgressRecord, and LogEntry persistence.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Validates `scrapers` non-empty and every area code recognised, then
    /// inserts a `pending` task row. Fails `InvalidArgument` otherwise, and
    /// `Conflict` if `task_id` already exists.
    async fn create_task(&self, draft: NewTask) -> DomainResult<Task>;

    async fn load_task(&self, task_id: Uuid) -> DomainResult<Task>;

    /// Atomic, validated status transition plus whatever timestamps the
    /// transition implies (see `Task::apply_transition`).
    async fn update_task_status(&self, task_id: Uuid, status: TaskStatus, at: DateTime<Utc>) -> DomainResult<()>;

    async fn set_control_flag(&self, task_id: Uuid, flag: ControlFlag, value: bool, at: DateTime<Utc>) -> DomainResult<()>;

    /// The sole read-modify-write path onto `progress_detail` (§4.1, §11):
    /// implementations must hold the task's row under an exclusive
    /// transaction for the whole read-apply-write cycle so two concurrent
    /// patches against the same pair can never interleave into a torn
    /// record. Applies the finalisation-aware merge rules in
    /// `services::progress_aggregator`.
    async fn merge_progress(&self, task_id: Uuid, pair_key: &str, patch: ProgressPatch) -> DomainResult<()>;

    /// Append-only; the store assigns `id` and `timestamp`.
    async fn append_log(&self, entry: NewLogEntry) -> DomainResult<LogEntry>;

    /// Returns entries with `timestamp > since`, ordered by timestamp.
    async fn read_logs_since(&self, task_id: Uuid, since: DateTime<Utc>) -> DomainResult<Vec<LogEntry>>;

    /// Up to `limit` most recently created tasks, optionally filtered to
    /// active statuses.
    async fn list_tasks(&self, filter: TaskFilter, limit: u32) -> DomainResult<Vec<Task>>;

    /// Allowed only from terminal states (or `pending` that never started);
    /// cascades ProgressRecords and LogEntries.
    async fn delete_task(&self, task_id: Uuid) -> DomainResult<()>;
}
