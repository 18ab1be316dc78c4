//! Periodic sweep that fails tasks gone silent for longer than the
//! configured stall threshold (§4.7, §9's liveness design note). Runs
//! independently of the engine: a worker whose adapter hung without ever
//! reaching a checkpoint (and so never got cancelled) is exactly the case
//! the stats sampler's heartbeat can't fix on its own.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;

use crate::domain::errors::{DomainResult, ErrorCategory};
use crate::domain::models::progress::ProgressPatch;
use crate::domain::models::task::TaskStatus;
use crate::domain::ports::clock::Clock;
use crate::domain::ports::site_adapter::IssueInfo;
use crate::domain::ports::task_store::{TaskFilter, TaskStore};
use crate::services::log_buffer::LogBuffer;

pub struct StallDetector<Store: TaskStore> {
    store: Arc<Store>,
    log_buffer: LogBuffer<Store>,
    clock: Arc<dyn Clock>,
    stall_threshold: ChronoDuration,
}

impl<Store: TaskStore + 'static> StallDetector<Store> {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>, stall_threshold_minutes: u64) -> Self {
        let log_buffer = LogBuffer::new(store.clone());
        Self { store, log_buffer, clock, stall_threshold: ChronoDuration::minutes(stall_threshold_minutes as i64) }
    }

    /// Scans every `running` task for `max(last_progress_at, started_at) <
    /// now - STALL_THRESHOLD` (§4.7's exact policy) and fails it when it
    /// finds one: the task's status moves to `failed`, every non-final
    /// `ProgressRecord` is promoted to `failed, is_final=true`, and an
    /// `error` log entry with `reason=stalled` is appended naming the idle
    /// duration. `update_task_status` reporting a conflict (a concurrent
    /// finalisation already moved it) is logged and skipped rather than
    /// retried.
    pub async fn sweep(&self) -> DomainResult<usize> {
        let now = self.clock.now();
        let tasks = self.store.list_tasks(TaskFilter { active_only: true }, u32::MAX).await?;

        let mut failed = 0;
        for task in tasks {
            if task.status != TaskStatus::Running {
                continue;
            }

            let last_activity = match (task.last_progress_at, task.started_at) {
                (Some(progress), Some(started)) => progress.max(started),
                (Some(progress), None) => progress,
                (None, Some(started)) => started,
                (None, None) => continue,
            };
            if now - last_activity <= self.stall_threshold {
                continue;
            }

            let idle_minutes = (now - last_activity).num_minutes();
            tracing::warn!(task_id = %task.id, idle_minutes, "stall detected, failing task");

            match self.store.update_task_status(task.id, TaskStatus::Failed, now).await {
                Ok(()) => {
                    failed += 1;
                    for (pair_key, record) in &task.progress_detail {
                        if record.is_final {
                            continue;
                        }
                        if let Err(error) = self
                            .store
                            .merge_progress(task.id, pair_key, ProgressPatch::terminal(crate::domain::models::progress::ProgressStatus::Failed, now))
                            .await
                        {
                            tracing::warn!(task_id = %task.id, pair_key, %error, "could not promote a stalled pair to failed");
                        }
                    }
                    if let Err(error) = self
                        .log_buffer
                        .log_error(
                            task.id,
                            &IssueInfo {
                                scraper: String::new(),
                                area: String::new(),
                                url: None,
                                building_name: None,
                                price_man_yen: None,
                                reason: ErrorCategory::Stalled.as_str().to_string(),
                                error_detail: format!("タスクが異常終了しました ({idle_minutes} 分間進捗なし)"),
                            },
                        )
                        .await
                    {
                        tracing::warn!(task_id = %task.id, %error, "failed to append stall log entry");
                    }
                }
                Err(error) => {
                    tracing::warn!(task_id = %task.id, %error, "could not fail a stalled task, it may have just finished");
                }
            }
        }

        Ok(failed)
    }
}
