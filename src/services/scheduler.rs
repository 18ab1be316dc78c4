//! Recurring schedule firing and reconciliation (§4.6).
//!
//! The tick loop itself is grounded on the tick-interval/`AtomicBool` pattern
//! the teacher's event scheduler uses (`sleep` then re-check `running`,
//! `stop()` flips the flag rather than aborting the task), rewired onto
//! `ScheduleStore`/`TaskEngine` instead of an in-memory event bus. A
//! `ScheduleReconciliationHook`, obtained via `reconciliation_hook()` and
//! registered on the shared `HookRegistry` once at startup, closes out the
//! matching `ScheduleHistory` row whenever the task it spawned reaches a
//! terminal status, rather than the caller tracking that link itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::models::schedule::ScheduleHistoryStatus;
use crate::domain::models::task::TaskStatus;
use crate::domain::ports::clock::Clock;
use crate::domain::ports::schedule_store::{NewScheduleHistory, ScheduleStore};
use crate::domain::ports::task_store::{NewTask, TaskFilter, TaskStore};
use crate::services::hooks::{CompletionHook, HookRegistry};
use crate::services::task_engine::TaskEngine;

/// Maps a task's terminal `TaskStatus` onto the `ScheduleHistoryStatus` its
/// fire record should settle into.
fn history_status_for(task_status: TaskStatus) -> ScheduleHistoryStatus {
    match task_status {
        TaskStatus::Completed => ScheduleHistoryStatus::Completed,
        TaskStatus::Cancelled => ScheduleHistoryStatus::Cancelled,
        _ => ScheduleHistoryStatus::Error,
    }
}

struct ScheduleReconciliationHook<Sched: ScheduleStore> {
    schedule_store: Arc<Sched>,
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl<Sched: ScheduleStore + 'static> CompletionHook for ScheduleReconciliationHook<Sched> {
    async fn on_completion(&self, task_id: Uuid, final_status: TaskStatus) -> Result<(), String> {
        let running = self.schedule_store.list_running_histories().await.map_err(|e| e.to_string())?;
        let Some(history) = running.into_iter().find(|h| h.task_id == Some(task_id)) else {
            return Ok(());
        };
        let status = history_status_for(final_status);
        // §4.6 step 6: a failed task's history gets the stock Japanese
        // message when the task itself left nothing more specific behind.
        let error_message = matches!(status, ScheduleHistoryStatus::Error)
            .then(|| "スクレイピングタスクが失敗しました".to_string());
        self.schedule_store
            .update_history_status(history.id, status, Some(self.clock.now()), error_message)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Fires due schedules and keeps their history rows in sync with the tasks
/// they spawn. Cheaply `Clone`; every field is an `Arc`.
pub struct Scheduler<Store: TaskStore, Sched: ScheduleStore> {
    schedule_store: Arc<Sched>,
    task_store: Arc<Store>,
    engine: TaskEngine<Store>,
    clock: Arc<dyn Clock>,
    tick_interval: StdDuration,
    running: Arc<AtomicBool>,
}

impl<Store: TaskStore + 'static, Sched: ScheduleStore + 'static> Clone for Scheduler<Store, Sched> {
    fn clone(&self) -> Self {
        Self {
            schedule_store: self.schedule_store.clone(),
            task_store: self.task_store.clone(),
            engine: self.engine.clone(),
            clock: self.clock.clone(),
            tick_interval: self.tick_interval,
            running: self.running.clone(),
        }
    }
}

impl<Store: TaskStore + 'static, Sched: ScheduleStore + 'static> Scheduler<Store, Sched> {
    pub fn new(
        schedule_store: Arc<Sched>,
        task_store: Arc<Store>,
        engine: TaskEngine<Store>,
        clock: Arc<dyn Clock>,
        tick_seconds: u64,
    ) -> Self {
        Self {
            schedule_store,
            task_store,
            engine,
            clock,
            tick_interval: StdDuration::from_secs(tick_seconds.max(1)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The hook `main` must register on the shared `HookRegistry` once,
    /// before the engine starts running tasks, so a task that finishes after
    /// a process restart still closes out its `ScheduleHistory` row.
    pub fn reconciliation_hook(&self) -> Arc<dyn CompletionHook> {
        Arc::new(ScheduleReconciliationHook { schedule_store: self.schedule_store.clone(), clock: self.clock.clone() })
    }

    /// Starts the tick loop in the background. Mirrors the teacher's
    /// sleep-then-check-flag shape; `stop()` flips `running` rather than
    /// aborting the task, so an in-flight tick always finishes cleanly.
    pub fn spawn(&self) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let scheduler = self.clone();
        tokio::spawn(async move {
            if let Err(error) = scheduler.reconcile().await {
                tracing::error!(%error, "startup schedule-history reconciliation failed");
            }
            while scheduler.running.load(Ordering::SeqCst) {
                tokio::time::sleep(scheduler.tick_interval).await;
                if !scheduler.running.load(Ordering::SeqCst) {
                    return;
                }
                if let Err(error) = scheduler.tick().await {
                    tracing::error!(%error, "scheduler tick failed");
                }
            }
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Fires every due schedule once, after first reconciling any stale
    /// `running` history rows. Exposed directly so tests (and a
    /// `force-cleanup`-style manual trigger) don't need the tick loop.
    pub async fn tick(&self) -> crate::domain::errors::DomainResult<()> {
        self.reconcile().await?;

        let now = self.clock.now();
        let due = self.schedule_store.list_due_schedules(now).await?;
        for schedule in due {
            if let Err(error) = self.fire(schedule.id, now).await {
                tracing::error!(schedule_id = %schedule.id, %error, "failed to fire schedule");
            }
        }
        Ok(())
    }

    /// §4.6's history reconciliation pass: for every `ScheduleHistory` still
    /// `running`, find the task it spawned — by `task_id` if attached, else
    /// by matching a task created within ±60s of `history.started_at` — and,
    /// if that task has already reached a terminal status, promote the
    /// history to the matching outcome. A history whose task can't be found
    /// is left `running` and logged, never guessed at. Run once at scheduler
    /// start (via `spawn`) and again at the top of every `tick`, which
    /// stands in for "before every listing of schedules" (§4.6) since this
    /// crate exposes no schedule-listing control operation of its own.
    pub async fn reconcile(&self) -> crate::domain::errors::DomainResult<()> {
        const PROXIMITY_WINDOW: chrono::Duration = chrono::Duration::seconds(60);

        let running = self.schedule_store.list_running_histories().await?;
        if running.is_empty() {
            return Ok(());
        }

        // Only fetched if some history never got a `task_id` attached (the
        // narrow crash window in `fire` between creating the history and
        // calling `attach_task_id`); loaded once up front rather than
        // per-history to keep this an O(1)-query pass in the common case.
        let candidate_tasks = if running.iter().any(|h| h.task_id.is_none()) {
            self.task_store.list_tasks(TaskFilter::default(), u32::MAX).await?
        } else {
            Vec::new()
        };

        for history in running {
            let task = match history.task_id {
                Some(task_id) => self.task_store.load_task(task_id).await.ok(),
                None => candidate_tasks
                    .iter()
                    .filter(|t| (t.created_at - history.started_at).abs() <= PROXIMITY_WINDOW)
                    .min_by_key(|t| (t.created_at - history.started_at).num_milliseconds().abs())
                    .cloned(),
            };

            match task {
                Some(task) if task.status.is_terminal() => {
                    let status = history_status_for(task.status);
                    let error_message = matches!(status, ScheduleHistoryStatus::Error)
                        .then(|| "スクレイピングタスクが失敗しました".to_string());
                    self.schedule_store
                        .update_history_status(history.id, status, Some(self.clock.now()), error_message)
                        .await?;
                }
                Some(_) => {}
                None => {
                    tracing::warn!(
                        history_id = history.id,
                        schedule_id = %history.schedule_id,
                        "could not reconcile running schedule history to any task"
                    );
                }
            }
        }
        Ok(())
    }

    /// Fires one schedule: skips (without creating a task) if any task
    /// currently `pending`/`running` shares a scraper with this schedule,
    /// per §4.6 step 3's conflict rule, otherwise creates the task, submits
    /// it to the engine, and records the fire.
    async fn fire(&self, schedule_id: Uuid, now: chrono::DateTime<chrono::Utc>) -> crate::domain::errors::DomainResult<()> {
        let mut schedule = self.schedule_store.load_schedule(schedule_id).await?;
        if !schedule.is_due(now) {
            return Ok(());
        }

        if let Some(conflicting) = self.conflicting_scrapers(&schedule.scrapers).await? {
            tracing::info!(schedule_id = %schedule_id, scrapers = %conflicting.join(","), "skipping fire, scraper already in flight");
            self.schedule_store
                .create_history(NewScheduleHistory {
                    schedule_id,
                    task_id: None,
                    started_at: now,
                    status: ScheduleHistoryStatus::Skipped,
                    error_message: Some(format!("conflicting scrapers already running: {}", conflicting.join(", "))),
                })
                .await?;
            schedule.skip_fire(now);
            return self.schedule_store.update_schedule(&schedule).await;
        }

        let history = self
            .schedule_store
            .create_history(NewScheduleHistory {
                schedule_id,
                task_id: None,
                started_at: now,
                status: ScheduleHistoryStatus::Running,
                error_message: None,
            })
            .await?;

        let task_id = Uuid::new_v4();
        let created = self
            .task_store
            .create_task(NewTask {
                task_id,
                // §4.6 step 5: a schedule always materialises into a parallel task.
                kind: crate::domain::models::task::TaskKind::Parallel,
                scrapers: schedule.scrapers.clone(),
                areas: schedule.areas.clone(),
                options: crate::domain::models::task::TaskOptions {
                    max_properties_per_pair: schedule.max_properties_per_pair,
                    ..Default::default()
                },
            })
            .await;

        let created = match created {
            Ok(task) => task,
            Err(error) => {
                self.schedule_store
                    .update_history_status(history.id, ScheduleHistoryStatus::Error, Some(now), Some(error.to_string()))
                    .await?;
                schedule.skip_fire(now);
                self.schedule_store.update_schedule(&schedule).await?;
                return Err(error);
            }
        };

        self.schedule_store.attach_task_id(history.id, created.id).await?;
        self.engine.submit(created.id);

        schedule.record_fire(created.id, now);
        self.schedule_store.update_schedule(&schedule).await
    }

    /// §4.6 step 3: collects the scrapers of every `pending`/`running` task
    /// and returns the subset that overlaps `wanted`, or `None` if there is
    /// no conflict. `paused` tasks don't count — their scrapers aren't
    /// actively in flight.
    async fn conflicting_scrapers(&self, wanted: &[String]) -> crate::domain::errors::DomainResult<Option<Vec<String>>> {
        let in_flight = self.task_store.list_tasks(TaskFilter { active_only: true }, u32::MAX).await?;
        let busy: std::collections::HashSet<&str> = in_flight
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Running))
            .flat_map(|t| t.scrapers.iter().map(String::as_str))
            .collect();
        let conflicting: Vec<String> = wanted.iter().filter(|s| busy.contains(s.as_str())).cloned().collect();
        Ok(if conflicting.is_empty() { None } else { Some(conflicting) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock_site_adapter::MockSiteAdapter;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::adapters::sqlite::schedule_store::SqliteScheduleStore;
    use crate::adapters::sqlite::task_store::SqliteTaskStore;
    use crate::domain::models::schedule::{Schedule, ScheduleType};
    use crate::domain::models::task::TaskKind;
    use crate::domain::ports::clock::SystemClock;
    use crate::domain::ports::site_adapter::SiteAdapter;
    use std::collections::HashMap;

    async fn setup() -> (Scheduler<SqliteTaskStore, SqliteScheduleStore>, Arc<SqliteTaskStore>, Arc<SqliteScheduleStore>) {
        let pool = create_migrated_test_pool().await.unwrap();
        let task_store = Arc::new(SqliteTaskStore::new(pool.clone()));
        let schedule_store = Arc::new(SqliteScheduleStore::new(pool));
        let mut adapters: HashMap<String, Arc<dyn SiteAdapter>> = HashMap::new();
        adapters.insert("suumo".into(), Arc::new(MockSiteAdapter::new()));
        let engine = TaskEngine::new(task_store.clone(), Arc::new(SystemClock), Arc::new(HookRegistry::new()), adapters, 1800, 2);
        let scheduler = Scheduler::new(schedule_store.clone(), task_store.clone(), engine, Arc::new(SystemClock), 15);
        (scheduler, task_store, schedule_store)
    }

    fn due_schedule() -> Schedule {
        let mut schedule = Schedule::new(
            "nightly-suumo",
            "",
            vec!["suumo".into()],
            vec!["13103".into()],
            100,
            ScheduleType::Interval { interval_minutes: 30 },
            None,
        );
        schedule.next_run_at = chrono::Utc::now() - chrono::Duration::minutes(1);
        schedule
    }

    #[tokio::test]
    async fn fire_creates_a_task_and_records_the_history() {
        let (scheduler, task_store, schedule_store) = setup().await;
        let schedule = due_schedule();
        let schedule_id = schedule.id;
        schedule_store.create_schedule(schedule).await.unwrap();

        scheduler.tick().await.unwrap();

        let reloaded = schedule_store.load_schedule(schedule_id).await.unwrap();
        assert!(reloaded.last_task_id.is_some());
        let task = task_store.load_task(reloaded.last_task_id.unwrap()).await.unwrap();
        assert_eq!(task.scrapers, vec!["suumo".to_string()]);
    }

    #[tokio::test]
    async fn fire_is_skipped_while_the_previous_task_is_still_active() {
        let (scheduler, task_store, schedule_store) = setup().await;
        let mut schedule = due_schedule();
        let schedule_id = schedule.id;

        let stuck_task_id = Uuid::new_v4();
        task_store
            .create_task(crate::domain::ports::task_store::NewTask {
                task_id: stuck_task_id,
                kind: TaskKind::Serial,
                scrapers: vec!["suumo".into()],
                areas: vec!["13103".into()],
                options: crate::domain::models::task::TaskOptions::default(),
            })
            .await
            .unwrap();
        task_store.update_task_status(stuck_task_id, TaskStatus::Running, chrono::Utc::now()).await.unwrap();
        schedule.last_task_id = Some(stuck_task_id);
        schedule_store.create_schedule(schedule).await.unwrap();

        scheduler.tick().await.unwrap();

        let reloaded = schedule_store.load_schedule(schedule_id).await.unwrap();
        assert_eq!(reloaded.last_task_id, Some(stuck_task_id));

        let running = schedule_store.list_running_histories().await.unwrap();
        assert!(running.is_empty());
    }

    #[tokio::test]
    async fn not_yet_due_schedules_are_left_alone() {
        let (scheduler, _task_store, schedule_store) = setup().await;
        let mut schedule = due_schedule();
        schedule.next_run_at = chrono::Utc::now() + chrono::Duration::hours(1);
        let schedule_id = schedule.id;
        schedule_store.create_schedule(schedule).await.unwrap();

        scheduler.tick().await.unwrap();

        let reloaded = schedule_store.load_schedule(schedule_id).await.unwrap();
        assert!(reloaded.last_task_id.is_none());
    }

    #[tokio::test]
    async fn reconcile_promotes_a_running_history_whose_task_already_finished() {
        let (scheduler, task_store, schedule_store) = setup().await;
        let schedule = due_schedule();
        let schedule_id = schedule.id;
        schedule_store.create_schedule(schedule).await.unwrap();

        let task_id = Uuid::new_v4();
        task_store
            .create_task(crate::domain::ports::task_store::NewTask {
                task_id,
                kind: TaskKind::Serial,
                scrapers: vec!["suumo".into()],
                areas: vec!["13103".into()],
                options: crate::domain::models::task::TaskOptions::default(),
            })
            .await
            .unwrap();
        task_store.update_task_status(task_id, TaskStatus::Running, chrono::Utc::now()).await.unwrap();
        task_store.update_task_status(task_id, TaskStatus::Completed, chrono::Utc::now()).await.unwrap();

        let history = schedule_store
            .create_history(NewScheduleHistory {
                schedule_id,
                task_id: Some(task_id),
                started_at: chrono::Utc::now(),
                status: ScheduleHistoryStatus::Running,
                error_message: None,
            })
            .await
            .unwrap();

        scheduler.reconcile().await.unwrap();

        let running = schedule_store.list_running_histories().await.unwrap();
        assert!(running.iter().all(|h| h.id != history.id));
    }

    #[tokio::test]
    async fn reconcile_leaves_an_unmatched_history_running() {
        let (scheduler, _task_store, schedule_store) = setup().await;
        let schedule = due_schedule();
        let schedule_id = schedule.id;
        schedule_store.create_schedule(schedule).await.unwrap();

        let history = schedule_store
            .create_history(NewScheduleHistory {
                schedule_id,
                task_id: None,
                started_at: chrono::Utc::now() - chrono::Duration::hours(2),
                status: ScheduleHistoryStatus::Running,
                error_message: None,
            })
            .await
            .unwrap();

        scheduler.reconcile().await.unwrap();

        let running = schedule_store.list_running_histories().await.unwrap();
        assert!(running.iter().any(|h| h.id == history.id));
    }
}
