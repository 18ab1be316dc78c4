//! The Task entity: one scraping run across a set of (scraper, area) pairs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::progress::ProgressRecord;

/// Worker topology for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Scrapers run in order, one at a time; within a scraper, areas run in order.
    Serial,
    /// One worker per scraper, running concurrently; areas run serially within a worker.
    Parallel,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::Parallel => "parallel",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "serial" => Some(Self::Serial),
            "parallel" => Some(Self::Parallel),
            _ => None,
        }
    }
}

/// Task lifecycle status. `Paused` is the only non-terminal status besides
/// `Pending` and `Running` — a resume returns the task to `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running | Self::Paused)
    }

    /// Transitions the engine and control operations are allowed to make.
    /// Admin overrides (`force_status`) bypass this table; every other
    /// write path must consult it.
    pub fn valid_transitions(self) -> &'static [TaskStatus] {
        match self {
            Self::Pending => &[Self::Running, Self::Cancelled],
            Self::Running => &[Self::Paused, Self::Completed, Self::Failed, Self::Cancelled],
            Self::Paused => &[Self::Running, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, target: TaskStatus) -> bool {
        self.valid_transitions().contains(&target)
    }
}

/// Per-task scrape options, applied uniformly to every (scraper, area) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOptions {
    pub max_properties_per_pair: u32,
    #[serde(default)]
    pub force_detail_fetch: bool,
    #[serde(default)]
    pub detail_refetch_hours: Option<u32>,
    #[serde(default)]
    pub ignore_error_history: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            max_properties_per_pair: 100,
            force_detail_fetch: false,
            detail_refetch_hours: None,
            ignore_error_history: false,
        }
    }
}

/// One scraping run across a set of (scraper, area) pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub kind: TaskKind,
    pub scrapers: Vec<String>,
    pub areas: Vec<String>,
    pub options: TaskOptions,
    pub status: TaskStatus,
    pub is_paused: bool,
    pub is_cancelled: bool,
    pub pause_requested_at: Option<DateTime<Utc>>,
    pub cancel_requested_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_progress_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub progress_detail: HashMap<String, ProgressRecord>,
    /// Rolled up from `progress_detail` by `recompute_rollups`, never written
    /// to directly — there is no separate mutable copy of these counters to
    /// fall out of sync with the per-pair records they summarise.
    pub total_processed: i64,
    pub total_new: i64,
    pub total_updated: i64,
    pub total_errors: i64,
    pub properties_found: i64,
    pub detail_fetched: i64,
    pub detail_skipped: i64,
    pub price_missing: i64,
    pub building_info_missing: i64,
    /// Wall-clock seconds between `started_at` and `completed_at` (or now,
    /// for a still-running task). Zero until the task has started.
    pub elapsed_seconds: i64,
}

impl Task {
    pub fn new(kind: TaskKind, scrapers: Vec<String>, areas: Vec<String>, options: TaskOptions) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            scrapers,
            areas,
            options,
            status: TaskStatus::Pending,
            is_paused: false,
            is_cancelled: false,
            pause_requested_at: None,
            cancel_requested_at: None,
            started_at: None,
            completed_at: None,
            last_progress_at: None,
            created_at: now,
            progress_detail: HashMap::new(),
            total_processed: 0,
            total_new: 0,
            total_updated: 0,
            total_errors: 0,
            properties_found: 0,
            detail_fetched: 0,
            detail_skipped: 0,
            price_missing: 0,
            building_info_missing: 0,
            elapsed_seconds: 0,
        }
    }

    /// Pair key `"{scraper}_{area}"` naming a ProgressRecord within this task.
    pub fn pair_key(scraper: &str, area: &str) -> String {
        format!("{scraper}_{area}")
    }

    pub fn all_pair_keys(&self) -> Vec<String> {
        self.scrapers
            .iter()
            .flat_map(|scraper| self.areas.iter().map(move |area| Self::pair_key(scraper, area)))
            .collect()
    }

    /// Validated transition. Updates timestamps as a side effect. Returns
    /// `Err` without mutating the task if the transition is illegal.
    pub fn transition_to(&mut self, target: TaskStatus) -> Result<(), crate::domain::errors::OrchestratorError> {
        if self.status == target {
            return Err(crate::domain::errors::OrchestratorError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: target.as_str().to_string(),
            });
        }
        if !self.status.can_transition_to(target) {
            return Err(crate::domain::errors::OrchestratorError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: target.as_str().to_string(),
            });
        }
        self.apply_transition(target);
        Ok(())
    }

    /// Bypasses the transition table. Used only by the stall detector and
    /// force-cleanup, which must be allowed to fail a task regardless of
    /// its current status. Every call is logged.
    pub fn force_status(&mut self, target: TaskStatus, reason: &str) {
        tracing::warn!(
            task_id = %self.id,
            from = self.status.as_str(),
            to = target.as_str(),
            reason,
            "forcing task status outside the validated transition table"
        );
        self.apply_transition(target);
    }

    fn apply_transition(&mut self, target: TaskStatus) {
        let now = Utc::now();
        match target {
            TaskStatus::Running => {
                if self.started_at.is_none() {
                    self.started_at = Some(now);
                }
            }
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => {
                self.completed_at = Some(now);
            }
            _ => {}
        }
        self.status = target;
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Recomputes the task-level aggregated counters (§3.1) and
    /// `elapsed_seconds` by summing `progress_detail`. Called by the store
    /// after every load so callers never see a rollup that drifted from the
    /// per-pair records it summarises.
    pub fn recompute_rollups(&mut self) {
        let mut total_processed = 0;
        let mut total_new = 0;
        let mut total_updated = 0;
        let mut total_errors = 0;
        let mut properties_found = 0;
        let mut detail_fetched = 0;
        let mut detail_skipped = 0;
        let mut price_missing = 0;
        let mut building_info_missing = 0;

        for record in self.progress_detail.values() {
            total_processed += record.properties_processed;
            total_new += record.new_listings;
            total_updated += record.price_updated + record.other_updates;
            total_errors += record.errors;
            properties_found += record.properties_found;
            detail_fetched += record.detail_fetched;
            detail_skipped += record.detail_skipped;
            price_missing += record.price_missing;
            building_info_missing += record.building_info_missing;
        }

        self.total_processed = total_processed;
        self.total_new = total_new;
        self.total_updated = total_updated;
        self.total_errors = total_errors;
        self.properties_found = properties_found;
        self.detail_fetched = detail_fetched;
        self.detail_skipped = detail_skipped;
        self.price_missing = price_missing;
        self.building_info_missing = building_info_missing;

        self.elapsed_seconds = match self.started_at {
            Some(started_at) => (self.completed_at.unwrap_or_else(Utc::now) - started_at).num_seconds().max(0),
            None => 0,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_task() -> Task {
        Task::new(
            TaskKind::Serial,
            vec!["suumo".to_string()],
            vec!["13103".to_string()],
            TaskOptions::default(),
        )
    }

    #[test]
    fn pending_to_running_sets_started_at() {
        let mut task = new_task();
        assert!(task.started_at.is_none());
        task.transition_to(TaskStatus::Running).unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert!(task.started_at.is_some());
    }

    #[test]
    fn terminal_statuses_reject_further_transitions() {
        let mut task = new_task();
        task.transition_to(TaskStatus::Running).unwrap();
        task.transition_to(TaskStatus::Completed).unwrap();
        assert!(task.transition_to(TaskStatus::Running).is_err());
        assert!(task.transition_to(TaskStatus::Failed).is_err());
    }

    #[test]
    fn self_transition_is_rejected() {
        let mut task = new_task();
        assert!(task.transition_to(TaskStatus::Pending).is_err());
    }

    #[test]
    fn paused_is_not_terminal_and_can_resume() {
        let mut task = new_task();
        task.transition_to(TaskStatus::Running).unwrap();
        task.transition_to(TaskStatus::Paused).unwrap();
        assert!(!task.status.is_terminal());
        task.transition_to(TaskStatus::Running).unwrap();
        assert_eq!(task.status, TaskStatus::Running);
    }

    #[test]
    fn force_status_bypasses_the_transition_table() {
        let mut task = new_task();
        // Pending -> Completed is not a valid transition, but force_status allows it.
        task.force_status(TaskStatus::Completed, "test override");
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn pair_key_format() {
        assert_eq!(Task::pair_key("suumo", "13103"), "suumo_13103");
    }

    #[test]
    fn recompute_rollups_sums_across_pairs() {
        use super::super::progress::ProgressRecord;

        let mut task = Task::new(
            TaskKind::Parallel,
            vec!["suumo".into(), "homes".into()],
            vec!["13103".into()],
            TaskOptions::default(),
        );
        task.transition_to(TaskStatus::Running).unwrap();

        let mut suumo = ProgressRecord::new_pending("suumo", "13103", "港区");
        suumo.properties_processed = 5;
        suumo.new_listings = 2;
        suumo.price_updated = 1;
        let mut homes = ProgressRecord::new_pending("homes", "13103", "港区");
        homes.properties_processed = 3;
        homes.other_updates = 1;
        homes.errors = 1;
        task.progress_detail.insert(Task::pair_key("suumo", "13103"), suumo);
        task.progress_detail.insert(Task::pair_key("homes", "13103"), homes);

        task.recompute_rollups();

        assert_eq!(task.total_processed, 8);
        assert_eq!(task.total_new, 2);
        assert_eq!(task.total_updated, 2);
        assert_eq!(task.total_errors, 1);
        assert!(task.elapsed_seconds >= 0);
    }

    #[test]
    fn all_pair_keys_is_cross_product() {
        let task = Task::new(
            TaskKind::Parallel,
            vec!["suumo".into(), "homes".into()],
            vec!["13103".into(), "13104".into()],
            TaskOptions::default(),
        );
        let keys = task.all_pair_keys();
        assert_eq!(keys.len(), 4);
        assert!(keys.contains(&"suumo_13103".to_string()));
        assert!(keys.contains(&"homes_13104".to_string()));
    }
}
