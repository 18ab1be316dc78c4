//! SQLite-backed `ScheduleStore`.
//!
//! Shares the row-mapping and JSON-encoding conventions from `task_store`;
//! grounded on the same teacher repository shape, narrowed to the schedule
//! and schedule-history tables the scheduler's conflict-check and
//! reconciliation passes (spec §4.6) consult.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::schedule::{Schedule, ScheduleHistory, ScheduleHistoryStatus, ScheduleStatus, ScheduleType};
use crate::domain::ports::schedule_store::{NewScheduleHistory, ScheduleStore};

use super::{parse_datetime, parse_json_or_default, parse_optional_uuid, parse_uuid};

#[derive(Debug, sqlx::FromRow)]
struct ScheduleRow {
    id: String,
    name: String,
    description: Option<String>,
    scrapers: String,
    areas: String,
    max_properties_per_pair: Option<i64>,
    schedule_type: String,
    status: String,
    last_run_at: Option<String>,
    next_run_at: String,
    last_task_id: Option<String>,
    created_at: String,
    updated_at: String,
    created_by: Option<String>,
}

impl TryFrom<ScheduleRow> for Schedule {
    type Error = OrchestratorError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        Ok(Schedule {
            id: parse_uuid(&row.id)?,
            name: row.name,
            description: row.description.unwrap_or_default(),
            scrapers: parse_json_or_default(&row.scrapers)?,
            areas: parse_json_or_default(&row.areas)?,
            max_properties_per_pair: row.max_properties_per_pair.unwrap_or(100) as u32,
            schedule_type: serde_json::from_str::<ScheduleType>(&row.schedule_type)?,
            status: ScheduleStatus::from_str(&row.status)
                .ok_or_else(|| OrchestratorError::Serialization(format!("unknown schedule status {}", row.status)))?,
            last_run_at: row.last_run_at.map(|s| parse_datetime(&s)).transpose()?,
            next_run_at: parse_datetime(&row.next_run_at)?,
            last_task_id: parse_optional_uuid(row.last_task_id)?,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            created_by: row.created_by,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ScheduleHistoryRow {
    id: i64,
    schedule_id: String,
    task_id: Option<String>,
    started_at: String,
    completed_at: Option<String>,
    status: String,
    error_message: Option<String>,
}

impl TryFrom<ScheduleHistoryRow> for ScheduleHistory {
    type Error = OrchestratorError;

    fn try_from(row: ScheduleHistoryRow) -> Result<Self, Self::Error> {
        Ok(ScheduleHistory {
            id: row.id,
            schedule_id: parse_uuid(&row.schedule_id)?,
            task_id: parse_optional_uuid(row.task_id)?,
            started_at: parse_datetime(&row.started_at)?,
            completed_at: row.completed_at.map(|s| parse_datetime(&s)).transpose()?,
            status: ScheduleHistoryStatus::from_str(&row.status)
                .ok_or_else(|| OrchestratorError::Serialization(format!("unknown history status {}", row.status)))?,
            error_message: row.error_message,
        })
    }
}

pub struct SqliteScheduleStore {
    pool: SqlitePool,
}

impl SqliteScheduleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleStore for SqliteScheduleStore {
    async fn create_schedule(&self, schedule: Schedule) -> DomainResult<Schedule> {
        let scrapers_json = serde_json::to_string(&schedule.scrapers)?;
        let areas_json = serde_json::to_string(&schedule.areas)?;
        let schedule_type_json = serde_json::to_string(&schedule.schedule_type)?;

        sqlx::query(
            "INSERT INTO schedules (id, name, description, scrapers, areas, max_properties_per_pair, \
             schedule_type, status, last_run_at, next_run_at, last_task_id, created_at, updated_at, created_by) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(schedule.id.to_string())
        .bind(&schedule.name)
        .bind(&schedule.description)
        .bind(&scrapers_json)
        .bind(&areas_json)
        .bind(i64::from(schedule.max_properties_per_pair))
        .bind(&schedule_type_json)
        .bind(schedule.status.as_str())
        .bind(schedule.last_run_at.map(|t| t.to_rfc3339()))
        .bind(schedule.next_run_at.to_rfc3339())
        .bind(schedule.last_task_id.map(|id| id.to_string()))
        .bind(schedule.created_at.to_rfc3339())
        .bind(schedule.updated_at.to_rfc3339())
        .bind(&schedule.created_by)
        .execute(&self.pool)
        .await?;

        Ok(schedule)
    }

    async fn load_schedule(&self, id: Uuid) -> DomainResult<Schedule> {
        sqlx::query_as::<_, ScheduleRow>("SELECT * FROM schedules WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| OrchestratorError::ScheduleNotFound(id.to_string()))?
            .try_into()
    }

    async fn update_schedule(&self, schedule: &Schedule) -> DomainResult<()> {
        let schedule_type_json = serde_json::to_string(&schedule.schedule_type)?;
        let result = sqlx::query(
            "UPDATE schedules SET name = ?, description = ?, status = ?, last_run_at = ?, next_run_at = ?, \
             last_task_id = ?, schedule_type = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&schedule.name)
        .bind(&schedule.description)
        .bind(schedule.status.as_str())
        .bind(schedule.last_run_at.map(|t| t.to_rfc3339()))
        .bind(schedule.next_run_at.to_rfc3339())
        .bind(schedule.last_task_id.map(|id| id.to_string()))
        .bind(&schedule_type_json)
        .bind(schedule.updated_at.to_rfc3339())
        .bind(schedule.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::ScheduleNotFound(schedule.id.to_string()));
        }
        Ok(())
    }

    async fn list_schedules(&self, active_only: bool) -> DomainResult<Vec<Schedule>> {
        let rows = if active_only {
            sqlx::query_as::<_, ScheduleRow>("SELECT * FROM schedules WHERE status = 'active' ORDER BY next_run_at ASC")
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query_as::<_, ScheduleRow>("SELECT * FROM schedules ORDER BY next_run_at ASC")
                .fetch_all(&self.pool)
                .await?
        };
        rows.into_iter().map(Schedule::try_from).collect()
    }

    async fn list_due_schedules(&self, now: DateTime<Utc>) -> DomainResult<Vec<Schedule>> {
        let rows = sqlx::query_as::<_, ScheduleRow>(
            "SELECT * FROM schedules WHERE status = 'active' AND next_run_at <= ? ORDER BY next_run_at ASC",
        )
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Schedule::try_from).collect()
    }

    async fn delete_schedule(&self, id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = ?").bind(id.to_string()).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::ScheduleNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn create_history(&self, history: NewScheduleHistory) -> DomainResult<ScheduleHistory> {
        let id = sqlx::query(
            "INSERT INTO schedule_history (schedule_id, task_id, started_at, status, error_message) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(history.schedule_id.to_string())
        .bind(history.task_id.map(|id| id.to_string()))
        .bind(history.started_at.to_rfc3339())
        .bind(history.status.as_str())
        .bind(&history.error_message)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(ScheduleHistory {
            id,
            schedule_id: history.schedule_id,
            task_id: history.task_id,
            started_at: history.started_at,
            completed_at: None,
            status: history.status,
            error_message: history.error_message,
        })
    }

    async fn attach_task_id(&self, history_id: i64, task_id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("UPDATE schedule_history SET task_id = ? WHERE id = ?")
            .bind(task_id.to_string())
            .bind(history_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::Unexpected(format!("schedule history {history_id} not found")));
        }
        Ok(())
    }

    async fn update_history_status(
        &self,
        history_id: i64,
        status: ScheduleHistoryStatus,
        completed_at: Option<DateTime<Utc>>,
        error_message: Option<String>,
    ) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE schedule_history SET status = ?, completed_at = ?, error_message = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(completed_at.map(|t| t.to_rfc3339()))
        .bind(&error_message)
        .bind(history_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::Unexpected(format!("schedule history {history_id} not found")));
        }
        Ok(())
    }

    async fn list_running_histories(&self) -> DomainResult<Vec<ScheduleHistory>> {
        let rows = sqlx::query_as::<_, ScheduleHistoryRow>(
            "SELECT * FROM schedule_history WHERE status = 'running' ORDER BY started_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ScheduleHistory::try_from).collect()
    }
}
