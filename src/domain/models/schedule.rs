//! Recurring schedule definitions and their fire history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// When a schedule fires. Narrower than the teacher's generic scheduler:
/// this control plane only ever needs a fixed interval or a daily time-of-day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleType {
    Interval { interval_minutes: u32 },
    Daily { hour: u8, minute: u8 },
}

impl ScheduleType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interval { .. } => "interval",
            Self::Daily { .. } => "daily",
        }
    }

    /// Computes the next fire time strictly after `from`.
    pub fn next_run_after(self, from: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Interval { interval_minutes } => {
                from + chrono::Duration::minutes(i64::from(interval_minutes.max(1)))
            }
            Self::Daily { hour, minute } => {
                let today = from
                    .date_naive()
                    .and_hms_opt(u32::from(hour), u32::from(minute), 0)
                    .expect("hour/minute validated at construction")
                    .and_utc();
                if today > from {
                    today
                } else {
                    today + chrono::Duration::days(1)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    Paused,
}

impl ScheduleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }
}

/// A persistent recurring schedule: the template used to spawn tasks and the
/// timing rule that decides when. Schedules always materialise into
/// `TaskKind::Parallel` tasks (spec §4.6 step 5) — there is no per-schedule
/// topology choice, since the point of a schedule firing unattended is to
/// finish as fast as its scraper set allows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub scrapers: Vec<String>,
    pub areas: Vec<String>,
    pub max_properties_per_pair: u32,
    pub schedule_type: ScheduleType,
    pub status: ScheduleStatus,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: DateTime<Utc>,
    pub last_task_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

impl Schedule {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        scrapers: Vec<String>,
        areas: Vec<String>,
        max_properties_per_pair: u32,
        schedule_type: ScheduleType,
        created_by: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            scrapers,
            areas,
            max_properties_per_pair,
            schedule_type,
            status: ScheduleStatus::Active,
            last_run_at: None,
            next_run_at: schedule_type.next_run_after(now),
            last_task_id: None,
            created_at: now,
            updated_at: now,
            created_by,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ScheduleStatus::Active && self.next_run_at <= now
    }

    /// Advances bookkeeping after a fire: records the task it spawned and
    /// computes the following `next_run_at`.
    pub fn record_fire(&mut self, task_id: Uuid, fired_at: DateTime<Utc>) {
        self.last_run_at = Some(fired_at);
        self.last_task_id = Some(task_id);
        self.next_run_at = self.schedule_type.next_run_after(fired_at);
        self.updated_at = fired_at;
    }

    /// Advances bookkeeping after a fire that never created a task (conflict
    /// skip or area-validation error): `next_run_at` still moves forward so
    /// the schedule doesn't refire immediately, but `last_task_id` is untouched.
    pub fn skip_fire(&mut self, fired_at: DateTime<Utc>) {
        self.last_run_at = Some(fired_at);
        self.next_run_at = self.schedule_type.next_run_after(fired_at);
        self.updated_at = fired_at;
    }
}

/// Outcome recorded for one firing of a `Schedule`, independent of whether
/// the spawned task itself later succeeded or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleHistoryStatus {
    Running,
    Completed,
    Cancelled,
    Error,
    /// Fire was skipped, e.g. because the previous task was still active.
    Skipped,
}

impl ScheduleHistoryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "error" => Some(Self::Error),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// One row of a schedule's fire history, used to reconcile what actually ran
/// against what the scheduler intended to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleHistory {
    pub id: i64,
    pub schedule_id: Uuid,
    pub task_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ScheduleHistoryStatus,
    pub error_message: Option<String>,
}
