//! Persistence for `Schedule` templates and their `ScheduleHistory` fire log.
//!
//! Grounded on the teacher's `TaskScheduleRepository` CRUD shape, extended
//! with the history bookkeeping the scheduler's conflict-check and
//! reconciliation passes need (§4.6).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::schedule::{Schedule, ScheduleHistory, ScheduleHistoryStatus};

/// A not-yet-persisted fire attempt; the store assigns `id`.
#[derive(Debug, Clone)]
pub struct NewScheduleHistory {
    pub schedule_id: Uuid,
    pub task_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub status: ScheduleHistoryStatus,
    pub error_message: Option<String>,
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn create_schedule(&self, schedule: Schedule) -> DomainResult<Schedule>;

    async fn load_schedule(&self, id: Uuid) -> DomainResult<Schedule>;

    /// Persists the whole row; used after `record_fire` and for activate/
    /// deactivate edits.
    async fn update_schedule(&self, schedule: &Schedule) -> DomainResult<()>;

    async fn list_schedules(&self, active_only: bool) -> DomainResult<Vec<Schedule>>;

    /// Schedules with `next_run_at <= now` and `status = active`.
    async fn list_due_schedules(&self, now: DateTime<Utc>) -> DomainResult<Vec<Schedule>>;

    async fn delete_schedule(&self, id: Uuid) -> DomainResult<()>;

    async fn create_history(&self, history: NewScheduleHistory) -> DomainResult<ScheduleHistory>;

    /// Records the task a history row spawned, once one exists. Needed
    /// because a fire opens its history row (§4.6) before the conflict/area
    /// checks that decide whether a task gets created at all.
    async fn attach_task_id(&self, history_id: i64, task_id: Uuid) -> DomainResult<()>;

    async fn update_history_status(
        &self,
        history_id: i64,
        status: ScheduleHistoryStatus,
        completed_at: Option<DateTime<Utc>>,
        error_message: Option<String>,
    ) -> DomainResult<()>;

    /// Every `ScheduleHistory` still `status = running`, for the
    /// reconciliation pass in §4.6.
    async fn list_running_histories(&self) -> DomainResult<Vec<ScheduleHistory>>;
}
