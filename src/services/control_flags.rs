//! Per-checkpoint consultation of a task's pause/cancel flags (§4.4).
//!
//! `TaskController` is the concrete `Controller` handed to an adapter: it
//! reloads the task row at every checkpoint rather than caching flags across
//! calls, since `SetControlFlag` must take effect at the next checkpoint
//! regardless of which worker observes it. Pause is absorbed inside the loop
//! rather than treated as exceptional (SPEC_FULL.md §9's design note).

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::ports::clock::Clock;
use crate::domain::ports::site_adapter::{Cancelled, Controller};
use crate::domain::ports::task_store::{ControlFlag, TaskStore};

/// How long a checkpoint sleeps between polls while paused.
const POLL_INTERVAL: StdDuration = StdDuration::from_secs(1);

/// The `Controller` a worker hands its adapter for one (task, pair) run.
/// Reloads `is_paused` / `is_cancelled` / `pause_requested_at` from the store
/// on every poll rather than trusting a cached copy.
pub struct TaskController<Store: TaskStore> {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    task_id: Uuid,
    pause_timeout: chrono::Duration,
}

impl<Store: TaskStore> TaskController<Store> {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>, task_id: Uuid, pause_timeout: chrono::Duration) -> Self {
        Self { store, clock, task_id, pause_timeout }
    }

    /// Flips both control flags and the task's own status to cancelled,
    /// under the store's usual transition guard, so a racing resume can't
    /// resurrect a pause the checkpoint loop has already decided to kill.
    async fn promote_to_cancelled(&self) -> Result<(), Cancelled> {
        let now = self.clock.now();
        let _ = self.store.set_control_flag(self.task_id, ControlFlag::Cancelled, true, now).await;
        let _ = self
            .store
            .update_task_status(self.task_id, crate::domain::models::task::TaskStatus::Cancelled, now)
            .await;
        tracing::warn!(task_id = %self.task_id, "pause timeout exceeded, promoting task to cancelled");
        Err(Cancelled)
    }
}

#[async_trait]
impl<Store: TaskStore> Controller for TaskController<Store> {
    async fn checkpoint_or_abort(&self) -> Result<(), Cancelled> {
        loop {
            let task = self.store.load_task(self.task_id).await.map_err(|_| Cancelled)?;
            if task.is_cancelled {
                return Err(Cancelled);
            }
            if task.is_paused {
                if let Some(requested_at) = task.pause_requested_at {
                    if self.clock.now() - requested_at > self.pause_timeout {
                        return self.promote_to_cancelled().await;
                    }
                }
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
            return Ok(());
        }
    }
}
