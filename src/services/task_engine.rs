//! Runs a `Task` to completion across its (scraper, area) pairs (§4.1, §9).
//!
//! Replaces the teacher's mutable-global-dictionary-keyed-by-task-id pattern
//! with an explicit, cloneable `TaskEngine` whose per-run state lives entirely
//! in the store (no in-memory task registry to fall out of sync with it).
//! Serial tasks run one worker over the full scraper×area cross product in
//! order; parallel tasks run one worker per scraper concurrently, each
//! working its areas in order.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::progress::{ProgressPatch, ProgressRecord, ProgressStatus};
use crate::domain::models::task::{Task, TaskKind, TaskStatus};
use crate::domain::ports::clock::Clock;
use crate::domain::ports::site_adapter::{
    IssueInfo, ListingChange, Reporter, SiteAdapter, SiteAdapterError, Stats, StatsUpdate,
};
use crate::domain::ports::task_store::TaskStore;
use crate::services::control_flags::TaskController;
use crate::services::hooks::HookRegistry;
use crate::services::log_buffer::LogBuffer;
use crate::services::progress_aggregator::ProgressAggregator;

/// Builds the counter-only portion of a patch from a `Stats`/`StatsUpdate`
/// value, treating every field as a delta. Shared by the mid-run reporter
/// (where the adapter already reports a delta) and by finalisation (where the
/// delta is computed against the currently recorded baseline).
fn stats_as_patch(stats: &Stats) -> ProgressPatch {
    ProgressPatch {
        properties_found: Some(stats.properties_found),
        properties_processed: Some(stats.properties_processed),
        properties_attempted: Some(stats.properties_attempted),
        detail_fetched: Some(stats.detail_fetched),
        detail_skipped: Some(stats.detail_skipped),
        detail_fetch_failed: Some(stats.detail_fetch_failed),
        new_listings: Some(stats.new_listings),
        price_updated: Some(stats.price_updated),
        other_updates: Some(stats.other_updates),
        refetched_unchanged: Some(stats.refetched_unchanged),
        save_failed: Some(stats.save_failed),
        price_missing: Some(stats.price_missing),
        building_info_missing: Some(stats.building_info_missing),
        other_errors: Some(stats.other_errors),
        validation_failed: Some(stats.validation_failed),
        errors: Some(stats.errors),
        ..Default::default()
    }
}

/// The terminal `Stats` an adapter returns is a total, not a delta; diffing
/// against the record's current counters keeps `finalize_pair`'s patch
/// idempotent with whatever `update_stats` calls already landed mid-run, so an
/// adapter that forgot a final flush still ends up with the right totals.
fn diff_against_baseline(total: &Stats, baseline: Option<&ProgressRecord>) -> ProgressPatch {
    macro_rules! delta {
        ($field:ident) => {
            Some(total.$field - baseline.map_or(0, |b| b.$field))
        };
    }
    ProgressPatch {
        properties_found: delta!(properties_found),
        properties_processed: delta!(properties_processed),
        properties_attempted: delta!(properties_attempted),
        detail_fetched: delta!(detail_fetched),
        detail_skipped: delta!(detail_skipped),
        detail_fetch_failed: delta!(detail_fetch_failed),
        new_listings: delta!(new_listings),
        price_updated: delta!(price_updated),
        other_updates: delta!(other_updates),
        refetched_unchanged: delta!(refetched_unchanged),
        save_failed: delta!(save_failed),
        price_missing: delta!(price_missing),
        building_info_missing: delta!(building_info_missing),
        other_errors: delta!(other_errors),
        validation_failed: delta!(validation_failed),
        errors: delta!(errors),
        ..Default::default()
    }
}

/// The `Reporter` a worker hands its adapter for one (task, pair) run.
struct EngineReporter<Store: TaskStore> {
    aggregator: Arc<ProgressAggregator<Store>>,
    log_buffer: Arc<LogBuffer<Store>>,
    task_id: Uuid,
    pair_key: String,
}

#[async_trait]
impl<Store: TaskStore + 'static> Reporter for EngineReporter<Store> {
    async fn update_stats(&self, partial: StatsUpdate) {
        let patch = stats_as_patch(&partial);
        if let Err(error) = self.aggregator.apply_patch(self.task_id, &self.pair_key, patch).await {
            tracing::warn!(task_id = %self.task_id, pair_key = %self.pair_key, %error, "failed to merge stats update");
        }
    }

    async fn log_listing_change(&self, change: ListingChange) {
        if let Err(error) = self.log_buffer.log_listing_change(self.task_id, &change).await {
            tracing::warn!(task_id = %self.task_id, %error, "failed to append listing-change log entry");
        }
    }

    async fn log_error(&self, info: IssueInfo) {
        if let Err(error) = self.log_buffer.log_error(self.task_id, &info).await {
            tracing::warn!(task_id = %self.task_id, %error, "failed to append error log entry");
        }
    }

    async fn log_warning(&self, info: IssueInfo) {
        if let Err(error) = self.log_buffer.log_warning(self.task_id, &info).await {
            tracing::warn!(task_id = %self.task_id, %error, "failed to append warning log entry");
        }
    }
}

struct Inner<Store: TaskStore> {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    aggregator: Arc<ProgressAggregator<Store>>,
    log_buffer: Arc<LogBuffer<Store>>,
    hooks: Arc<HookRegistry>,
    adapters: HashMap<String, Arc<dyn SiteAdapter>>,
    pause_timeout: chrono::Duration,
}

/// Runs tasks to completion. Cheaply `Clone`, since every field is an `Arc`;
/// cloning is how a worker hands itself to `tokio::spawn`.
pub struct TaskEngine<Store: TaskStore>(Arc<Inner<Store>>);

impl<Store: TaskStore> Clone for TaskEngine<Store> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<Store: TaskStore + 'static> TaskEngine<Store> {
    pub fn new(
        store: Arc<Store>,
        clock: Arc<dyn Clock>,
        hooks: Arc<HookRegistry>,
        adapters: HashMap<String, Arc<dyn SiteAdapter>>,
        pause_timeout_seconds: u64,
        stats_sample_interval_seconds: u64,
    ) -> Self {
        let aggregator =
            Arc::new(ProgressAggregator::new(store.clone(), std::time::Duration::from_secs(stats_sample_interval_seconds)));
        let log_buffer = Arc::new(LogBuffer::new(store.clone()));
        Self(Arc::new(Inner {
            store,
            clock,
            aggregator,
            log_buffer,
            hooks,
            adapters,
            pause_timeout: chrono::Duration::seconds(pause_timeout_seconds as i64),
        }))
    }

    fn adapter_for(&self, scraper: &str) -> Option<Arc<dyn SiteAdapter>> {
        self.0.adapters.get(scraper).cloned()
    }

    /// Flips the task to `running` and spawns the worker topology in the
    /// background. Returns immediately; callers observe progress through
    /// `GetStatus`/`ReadLogDiff`, not this handle.
    pub fn submit(&self, task_id: Uuid) -> tokio::task::JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move { engine.run_task(task_id).await })
    }

    async fn run_task(&self, task_id: Uuid) {
        let task = match self.0.store.load_task(task_id).await {
            Ok(task) => task,
            Err(error) => {
                tracing::error!(task_id = %task_id, %error, "could not load task to run it");
                return;
            }
        };

        let now = self.0.clock.now();
        if let Err(error) = self.0.store.update_task_status(task_id, TaskStatus::Running, now).await {
            tracing::error!(task_id = %task_id, %error, "could not flip task to running");
            return;
        }

        let outcomes = match task.kind {
            TaskKind::Serial => self.run_serial(&task).await,
            TaskKind::Parallel => self.run_parallel(&task).await,
        };

        let final_status = aggregate_status(&outcomes);
        self.finalize_task(task_id, final_status).await;

        self.0.hooks.fire_completion(task_id, final_status).await;
        if final_status == TaskStatus::Failed {
            self.0.hooks.fire_error(task_id, final_status, "one or more (scraper, area) pairs failed").await;
        }
    }

    /// Writes the task's terminal status, tolerating the case where a control
    /// operation (e.g. `Cancel`) already moved it to a terminal state while
    /// workers were still unwinding.
    async fn finalize_task(&self, task_id: Uuid, final_status: TaskStatus) {
        let Ok(current) = self.0.store.load_task(task_id).await else {
            return;
        };
        if current.status == final_status {
            return;
        }
        if current.status.is_terminal() {
            tracing::warn!(
                task_id = %task_id,
                engine_status = final_status.as_str(),
                store_status = current.status.as_str(),
                "task was already moved to a different terminal status by a concurrent control operation"
            );
            return;
        }
        let now = self.0.clock.now();
        if let Err(error) = self.0.store.update_task_status(task_id, final_status, now).await {
            tracing::warn!(task_id = %task_id, %error, "failed to write the task's terminal status");
        }
    }

    async fn run_serial(&self, task: &Task) -> Vec<ProgressStatus> {
        let mut outcomes = Vec::with_capacity(task.scrapers.len() * task.areas.len());
        for scraper in &task.scrapers {
            match self.adapter_for(scraper) {
                Some(adapter) => {
                    for area in &task.areas {
                        outcomes.push(self.run_pair(task, scraper, area, adapter.clone()).await);
                    }
                }
                None => {
                    for area in &task.areas {
                        outcomes.push(self.fail_missing_adapter(task, scraper, area).await);
                    }
                }
            }
        }
        outcomes
    }

    async fn run_parallel(&self, task: &Task) -> Vec<ProgressStatus> {
        let mut handles = Vec::with_capacity(task.scrapers.len());
        for scraper in task.scrapers.clone() {
            let engine = self.clone();
            let task = task.clone();
            handles.push(tokio::spawn(async move {
                let adapter = engine.adapter_for(&scraper);
                let mut outcomes = Vec::with_capacity(task.areas.len());
                for area in &task.areas {
                    let outcome = match &adapter {
                        Some(adapter) => engine.run_pair(&task, &scraper, area, adapter.clone()).await,
                        None => engine.fail_missing_adapter(&task, &scraper, area).await,
                    };
                    outcomes.push(outcome);
                }
                outcomes
            }));
        }

        let mut outcomes = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(worker_outcomes) => outcomes.extend(worker_outcomes),
                Err(error) => tracing::error!(task_id = %task.id, %error, "a parallel scraper worker panicked"),
            }
        }
        outcomes
    }

    async fn run_pair(&self, task: &Task, scraper: &str, area_code: &str, adapter: Arc<dyn SiteAdapter>) -> ProgressStatus {
        let pair_key = Task::pair_key(scraper, area_code);

        let controller = TaskController::new(self.0.store.clone(), self.0.clock.clone(), task.id, self.0.pause_timeout);
        if controller.checkpoint_or_abort().await.is_err() {
            return self.finalize_pair(task.id, &pair_key, ProgressStatus::Cancelled, None).await;
        }

        let now = self.0.clock.now();
        let start_patch = ProgressPatch { status: Some(ProgressStatus::Running), started_at: Some(now), ..Default::default() };
        if let Err(error) = self.0.aggregator.apply_patch(task.id, &pair_key, start_patch).await {
            tracing::warn!(task_id = %task.id, pair_key = %pair_key, %error, "failed to record pair start");
        }

        let reporter = EngineReporter {
            aggregator: self.0.aggregator.clone(),
            log_buffer: self.0.log_buffer.clone(),
            task_id: task.id,
            pair_key: pair_key.clone(),
        };
        let sampler = self.0.aggregator.spawn_sampler(task.id, pair_key.clone());

        let options = (&task.options).into();
        let result = adapter.scrape_area(area_code, options, &reporter, &controller).await;
        sampler.stop_and_join().await;

        match result {
            Ok(stats) => self.finalize_pair(task.id, &pair_key, ProgressStatus::Completed, Some(stats)).await,
            Err(SiteAdapterError::Cancelled) => self.finalize_pair(task.id, &pair_key, ProgressStatus::Cancelled, None).await,
            Err(error) => {
                let _ = self
                    .0
                    .log_buffer
                    .log_error(
                        task.id,
                        &IssueInfo {
                            scraper: scraper.to_string(),
                            area: area_code.to_string(),
                            url: None,
                            building_name: None,
                            price_man_yen: None,
                            reason: error.category().as_str().to_string(),
                            error_detail: error.to_string(),
                        },
                    )
                    .await;
                self.finalize_pair(task.id, &pair_key, ProgressStatus::Failed, None).await
            }
        }
    }

    async fn fail_missing_adapter(&self, task: &Task, scraper: &str, area_code: &str) -> ProgressStatus {
        let pair_key = Task::pair_key(scraper, area_code);
        let _ = self
            .0
            .log_buffer
            .log_error(
                task.id,
                &IssueInfo {
                    scraper: scraper.to_string(),
                    area: area_code.to_string(),
                    url: None,
                    building_name: None,
                    price_man_yen: None,
                    reason: crate::domain::errors::ErrorCategory::ModuleImportError.as_str().to_string(),
                    error_detail: format!("no adapter registered for scraper '{scraper}'"),
                },
            )
            .await;
        self.finalize_pair(task.id, &pair_key, ProgressStatus::Failed, None).await
    }

    /// Writes the pair's terminal patch, then re-reads and re-issues once if
    /// the first write didn't land as expected (e.g. a racing sampler tick
    /// landed in between on a patch that didn't carry `is_final`).
    async fn finalize_pair(&self, task_id: Uuid, pair_key: &str, status: ProgressStatus, stats: Option<Stats>) -> ProgressStatus {
        let now = self.0.clock.now();
        let baseline = self.0.store.load_task(task_id).await.ok().and_then(|t| t.progress_detail.get(pair_key).cloned());

        let mut patch = stats.as_ref().map(|s| diff_against_baseline(s, baseline.as_ref())).unwrap_or_default();
        patch.status = Some(status);
        patch.is_final = true;
        patch.completed_at = Some(now);

        if let Err(error) = self.0.aggregator.apply_patch(task_id, pair_key, patch).await {
            tracing::warn!(task_id = %task_id, pair_key = %pair_key, %error, "failed to write terminal progress patch");
        }

        if let Ok(task) = self.0.store.load_task(task_id).await {
            if let Some(record) = task.progress_detail.get(pair_key) {
                if record.status != status || !record.is_final {
                    let _ = self.0.aggregator.apply_patch(task_id, pair_key, ProgressPatch::terminal(status, now)).await;
                }
            }
        }

        status
    }
}

/// §4.5's aggregation rule: completed iff every pair completed; cancelled iff
/// at least one pair was cancelled and none failed; failed otherwise.
fn aggregate_status(outcomes: &[ProgressStatus]) -> TaskStatus {
    if outcomes.is_empty() || outcomes.iter().all(|s| *s == ProgressStatus::Completed) {
        return TaskStatus::Completed;
    }
    let any_failed = outcomes.iter().any(|s| *s == ProgressStatus::Failed);
    let any_cancelled = outcomes.iter().any(|s| *s == ProgressStatus::Cancelled);
    if any_cancelled && !any_failed {
        TaskStatus::Cancelled
    } else {
        TaskStatus::Failed
    }
}
