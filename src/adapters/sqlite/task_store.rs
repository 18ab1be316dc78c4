//! SQLite-backed `TaskStore`.
//!
//! Grounded on the teacher's `SqliteTaskRepository`: the `FromRow` + `TryFrom`
//! row-mapping convention, the oversized-JSON-blob warning, and above all the
//! `claim_task_atomic` idiom — a conditional `UPDATE ... WHERE ...` whose
//! `rows_affected() == 0` signals a lost race rather than a retried success.
//! Every status/flag write here uses that same guard so a stale caller can
//! never resurrect or un-finalise a task already moved on by someone else.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::area;
use crate::domain::models::log_entry::{LogEntry, LogKind, NewLogEntry};
use crate::domain::models::progress::ProgressPatch;
use crate::domain::models::progress::ProgressRecord;
use crate::domain::models::task::{Task, TaskKind, TaskOptions, TaskStatus};
use crate::domain::ports::task_store::{ControlFlag, NewTask, TaskFilter, TaskStore};

use super::{parse_datetime, parse_json_or_default, parse_uuid};

/// Payloads above this size get a `tracing::warn!` rather than silently
/// bloating the row — `progress_detail` is the usual culprit on a task with
/// many pairs and a chatty `errors_list`.
const JSON_SIZE_WARN_BYTES: usize = 64 * 1024;

fn warn_if_oversized(task_id: Uuid, column: &str, json: &str) {
    if json.len() > JSON_SIZE_WARN_BYTES {
        tracing::warn!(task_id = %task_id, column, bytes = json.len(), "oversized JSON column");
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: String,
    kind: String,
    scrapers: String,
    areas: String,
    options: String,
    status: String,
    is_paused: bool,
    is_cancelled: bool,
    pause_requested_at: Option<String>,
    cancel_requested_at: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
    last_progress_at: Option<String>,
    created_at: String,
    progress_detail: String,
    total_processed: i64,
    total_new: i64,
    total_updated: i64,
    total_errors: i64,
    properties_found: i64,
    detail_fetched: i64,
    detail_skipped: i64,
    price_missing: i64,
    building_info_missing: i64,
}

impl TryFrom<TaskRow> for Task {
    type Error = OrchestratorError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let mut task = Task {
            id: parse_uuid(&row.id)?,
            kind: TaskKind::from_str(&row.kind)
                .ok_or_else(|| OrchestratorError::Serialization(format!("unknown task kind {}", row.kind)))?,
            scrapers: parse_json_or_default(&row.scrapers)?,
            areas: parse_json_or_default(&row.areas)?,
            options: serde_json::from_str(&row.options)?,
            status: TaskStatus::from_str(&row.status)
                .ok_or_else(|| OrchestratorError::Serialization(format!("unknown task status {}", row.status)))?,
            is_paused: row.is_paused,
            is_cancelled: row.is_cancelled,
            pause_requested_at: row.pause_requested_at.map(|s| parse_datetime(&s)).transpose()?,
            cancel_requested_at: row.cancel_requested_at.map(|s| parse_datetime(&s)).transpose()?,
            started_at: row.started_at.map(|s| parse_datetime(&s)).transpose()?,
            completed_at: row.completed_at.map(|s| parse_datetime(&s)).transpose()?,
            last_progress_at: row.last_progress_at.map(|s| parse_datetime(&s)).transpose()?,
            created_at: parse_datetime(&row.created_at)?,
            progress_detail: parse_json_or_default::<HashMap<String, ProgressRecord>>(&row.progress_detail)?,
            total_processed: row.total_processed,
            total_new: row.total_new,
            total_updated: row.total_updated,
            total_errors: row.total_errors,
            properties_found: row.properties_found,
            detail_fetched: row.detail_fetched,
            detail_skipped: row.detail_skipped,
            price_missing: row.price_missing,
            building_info_missing: row.building_info_missing,
            elapsed_seconds: 0,
        };
        // The stored total_*/properties_*/detail_* columns are never updated
        // after insert; the rollup is always recomputed from progress_detail
        // so it can never drift from the per-pair records it summarises.
        task.recompute_rollups();
        Ok(task)
    }
}

pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_row(&self, task_id: Uuid) -> DomainResult<TaskRow> {
        sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = ?")
            .bind(task_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create_task(&self, draft: NewTask) -> DomainResult<Task> {
        if draft.scrapers.is_empty() {
            return Err(OrchestratorError::InvalidArgument("scrapers must not be empty".into()));
        }
        if draft.areas.is_empty() {
            return Err(OrchestratorError::InvalidArgument("areas must not be empty".into()));
        }
        for code in &draft.areas {
            if !area::is_valid_code(code) {
                return Err(OrchestratorError::InvalidArgument(format!("unknown area code: {code}")));
            }
        }

        let mut task = Task::new(draft.kind, draft.scrapers, draft.areas, draft.options);
        task.id = draft.task_id;
        for key in task.all_pair_keys() {
            let (scraper, area_code) = key
                .rsplit_once('_')
                .ok_or_else(|| OrchestratorError::InvalidArgument(format!("malformed pair key: {key}")))?;
            let area_name = area::name_ja_for_code(area_code).unwrap_or(area_code);
            task.progress_detail.insert(key, ProgressRecord::new_pending(scraper, area_code, area_name));
        }

        let scrapers_json = serde_json::to_string(&task.scrapers)?;
        let areas_json = serde_json::to_string(&task.areas)?;
        let options_json = serde_json::to_string(&task.options)?;
        let progress_json = serde_json::to_string(&task.progress_detail)?;
        warn_if_oversized(task.id, "progress_detail", &progress_json);

        let result = sqlx::query(
            "INSERT INTO tasks (id, kind, scrapers, areas, options, status, is_paused, is_cancelled, created_at, progress_detail)
             VALUES (?, ?, ?, ?, ?, ?, 0, 0, ?, ?)",
        )
        .bind(task.id.to_string())
        .bind(task.kind.as_str())
        .bind(&scrapers_json)
        .bind(&areas_json)
        .bind(&options_json)
        .bind(task.status.as_str())
        .bind(task.created_at.to_rfc3339())
        .bind(&progress_json)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(task),
            Err(sqlx::Error::Database(ref e)) if e.message().contains("UNIQUE constraint failed") => {
                Err(OrchestratorError::DuplicateTaskId(task.id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn load_task(&self, task_id: Uuid) -> DomainResult<Task> {
        self.load_row(task_id).await?.try_into()
    }

    async fn update_task_status(&self, task_id: Uuid, status: TaskStatus, at: DateTime<Utc>) -> DomainResult<()> {
        let row = self.load_row(task_id).await?;
        let mut task: Task = row.try_into()?;
        let previous_status = task.status;
        task.transition_to(status)?;

        let result = sqlx::query(
            "UPDATE tasks SET status = ?, started_at = ?, completed_at = ? WHERE id = ? AND status = ?",
        )
        .bind(task.status.as_str())
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(task_id.to_string())
        .bind(previous_status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::Conflict(format!(
                "task {task_id} status changed concurrently, expected {previous_status:?} at {at}"
            )));
        }
        Ok(())
    }

    async fn set_control_flag(&self, task_id: Uuid, flag: ControlFlag, value: bool, at: DateTime<Utc>) -> DomainResult<()> {
        let (flag_column, timestamp_column) = match flag {
            ControlFlag::Paused => ("is_paused", "pause_requested_at"),
            ControlFlag::Cancelled => ("is_cancelled", "cancel_requested_at"),
        };
        let sql = format!(
            "UPDATE tasks SET {flag_column} = ?, {timestamp_column} = ? \
             WHERE id = ? AND status NOT IN ('completed', 'failed', 'cancelled')"
        );
        let result = sqlx::query(&sql)
            .bind(value)
            .bind(value.then(|| at.to_rfc3339()))
            .bind(task_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            // Either the task doesn't exist or it's already terminal; tell them apart.
            self.load_row(task_id).await?;
            return Err(OrchestratorError::InvalidState(format!(
                "task {task_id} is already in a terminal state"
            )));
        }
        Ok(())
    }

    async fn merge_progress(&self, task_id: Uuid, pair_key: &str, patch: ProgressPatch) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        let row: (String,) = sqlx::query_as("SELECT progress_detail FROM tasks WHERE id = ?")
            .bind(task_id.to_string())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))?;

        let mut detail: HashMap<String, ProgressRecord> = parse_json_or_default(&row.0)?;
        let record = detail
            .get_mut(pair_key)
            .ok_or_else(|| OrchestratorError::InvalidArgument(format!("unknown pair key: {pair_key}")))?;
        record.apply_patch(&patch);

        let progress_json = serde_json::to_string(&detail)?;
        warn_if_oversized(task_id, "progress_detail", &progress_json);

        let now = Utc::now();
        sqlx::query("UPDATE tasks SET progress_detail = ?, last_progress_at = ? WHERE id = ?")
            .bind(&progress_json)
            .bind(now.to_rfc3339())
            .bind(task_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn append_log(&self, entry: NewLogEntry) -> DomainResult<LogEntry> {
        let now = Utc::now();
        let details_json = entry.details.as_ref().map(serde_json::to_string).transpose()?;
        let id = sqlx::query(
            "INSERT INTO logs (task_id, kind, timestamp, message, details) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.task_id.to_string())
        .bind(entry.kind.as_str())
        .bind(now.to_rfc3339())
        .bind(&entry.message)
        .bind(&details_json)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(LogEntry {
            id,
            task_id: entry.task_id,
            kind: entry.kind,
            timestamp: now,
            message: entry.message,
            details: entry.details,
        })
    }

    async fn read_logs_since(&self, task_id: Uuid, since: DateTime<Utc>) -> DomainResult<Vec<LogEntry>> {
        let rows = sqlx::query(
            "SELECT id, task_id, kind, timestamp, message, details FROM logs \
             WHERE task_id = ? AND timestamp > ? ORDER BY timestamp ASC, id ASC",
        )
        .bind(task_id.to_string())
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let kind_str: String = row.try_get("kind")?;
                let timestamp_str: String = row.try_get("timestamp")?;
                let details_str: Option<String> = row.try_get("details")?;
                Ok(LogEntry {
                    id: row.try_get("id")?,
                    task_id,
                    kind: LogKind::from_str(&kind_str)
                        .ok_or_else(|| OrchestratorError::Serialization(format!("unknown log kind {kind_str}")))?,
                    timestamp: parse_datetime(&timestamp_str)?,
                    message: row.try_get("message")?,
                    details: details_str.map(|s| serde_json::from_str(&s)).transpose()?,
                })
            })
            .collect()
    }

    async fn list_tasks(&self, filter: TaskFilter, limit: u32) -> DomainResult<Vec<Task>> {
        let rows = if filter.active_only {
            sqlx::query_as::<_, TaskRow>(
                "SELECT * FROM tasks WHERE status IN ('pending', 'running', 'paused') \
                 ORDER BY created_at DESC LIMIT ?",
            )
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks ORDER BY created_at DESC LIMIT ?")
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
        };

        rows.into_iter().map(Task::try_from).collect()
    }

    async fn delete_task(&self, task_id: Uuid) -> DomainResult<()> {
        let task = self.load_task(task_id).await?;
        if !task.status.is_terminal() && task.status != TaskStatus::Pending {
            return Err(OrchestratorError::InvalidState(format!(
                "cannot delete task {task_id} while it is {:?}",
                task.status
            )));
        }
        sqlx::query("DELETE FROM tasks WHERE id = ?").bind(task_id.to_string()).execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn setup() -> SqliteTaskStore {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteTaskStore::new(pool)
    }

    fn draft() -> NewTask {
        NewTask {
            task_id: Uuid::new_v4(),
            kind: TaskKind::Serial,
            scrapers: vec!["suumo".into()],
            areas: vec!["13103".into()],
            options: TaskOptions::default(),
        }
    }

    #[tokio::test]
    async fn create_and_load_round_trips() {
        let store = setup().await;
        let draft = draft();
        let task_id = draft.task_id;
        let created = store.create_task(draft).await.unwrap();
        assert_eq!(created.id, task_id);
        assert_eq!(created.progress_detail.len(), 1);

        let loaded = store.load_task(task_id).await.unwrap();
        assert_eq!(loaded.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn duplicate_task_id_is_a_conflict() {
        let store = setup().await;
        let draft = draft();
        let task_id = draft.task_id;
        store.create_task(draft).await.unwrap();

        let mut dup = draft();
        dup.task_id = task_id;
        let err = store.create_task(dup).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateTaskId(_)));
    }

    #[tokio::test]
    async fn unknown_area_code_is_rejected() {
        let store = setup().await;
        let mut draft = draft();
        draft.areas = vec!["99999".into()];
        let err = store.create_task(draft).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn status_transition_persists_and_rejects_illegal_targets() {
        let store = setup().await;
        let task_id = draft().task_id;
        let mut draft = draft();
        draft.task_id = task_id;
        store.create_task(draft).await.unwrap();

        let now = Utc::now();
        store.update_task_status(task_id, TaskStatus::Running, now).await.unwrap();
        let task = store.load_task(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert!(task.started_at.is_some());

        let err = store.update_task_status(task_id, TaskStatus::Pending, now).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn set_control_flag_is_rejected_once_terminal() {
        let store = setup().await;
        let draft = draft();
        let task_id = draft.task_id;
        store.create_task(draft).await.unwrap();
        let now = Utc::now();
        store.update_task_status(task_id, TaskStatus::Running, now).await.unwrap();
        store.update_task_status(task_id, TaskStatus::Completed, now).await.unwrap();

        let err = store.set_control_flag(task_id, ControlFlag::Cancelled, true, now).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidState(_)));
    }

    #[tokio::test]
    async fn merge_progress_accumulates_and_then_finalises() {
        let store = setup().await;
        let draft = draft();
        let task_id = draft.task_id;
        store.create_task(draft).await.unwrap();
        let pair_key = Task::pair_key("suumo", "13103");

        store
            .merge_progress(task_id, &pair_key, ProgressPatch { new_listings: Some(2), ..Default::default() })
            .await
            .unwrap();
        store
            .merge_progress(
                task_id,
                &pair_key,
                crate::domain::models::progress::ProgressPatch::terminal(
                    crate::domain::models::progress::ProgressStatus::Completed,
                    Utc::now(),
                ),
            )
            .await
            .unwrap();

        let task = store.load_task(task_id).await.unwrap();
        let record = &task.progress_detail[&pair_key];
        assert_eq!(record.new_listings, 2);
        assert!(record.is_final);

        // A later patch against a finalised record is silently absorbed.
        store
            .merge_progress(task_id, &pair_key, ProgressPatch { new_listings: Some(100), ..Default::default() })
            .await
            .unwrap();
        let task = store.load_task(task_id).await.unwrap();
        assert_eq!(task.progress_detail[&pair_key].new_listings, 2);
    }

    #[tokio::test]
    async fn list_tasks_filters_to_active_statuses() {
        let store = setup().await;
        let active = draft();
        let active_id = active.task_id;
        store.create_task(active).await.unwrap();

        let mut done = draft();
        done.task_id = Uuid::new_v4();
        let done_id = done.task_id;
        store.create_task(done).await.unwrap();
        store.update_task_status(done_id, TaskStatus::Running, Utc::now()).await.unwrap();
        store.update_task_status(done_id, TaskStatus::Completed, Utc::now()).await.unwrap();

        let active_tasks = store.list_tasks(TaskFilter { active_only: true }, 100).await.unwrap();
        assert_eq!(active_tasks.len(), 1);
        assert_eq!(active_tasks[0].id, active_id);

        let all_tasks = store.list_tasks(TaskFilter::default(), 100).await.unwrap();
        assert_eq!(all_tasks.len(), 2);
    }

    #[tokio::test]
    async fn delete_rejects_running_task() {
        let store = setup().await;
        let draft = draft();
        let task_id = draft.task_id;
        store.create_task(draft).await.unwrap();
        store.update_task_status(task_id, TaskStatus::Running, Utc::now()).await.unwrap();

        let err = store.delete_task(task_id).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidState(_)));
    }
}
