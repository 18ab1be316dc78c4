//! Entry point: loads configuration, opens the SQLite store, wires the
//! engine/scheduler, and dispatches one parsed CLI command against
//! `ControlOps`. The scheduler and stall-sweep run as background tasks for
//! the lifetime of the process so a single CLI invocation can also serve as
//! a long-lived control-plane daemon (`chintai-orchestrator list` while a
//! prior `start-serial` is still running observes live progress).

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use chintai_orchestrator::adapters::mock_site_adapter::MockSiteAdapter;
use chintai_orchestrator::adapters::sqlite::{
    initialize_database, SqliteScheduleStore, SqliteTaskStore,
};
use chintai_orchestrator::cli::{commands, Cli};
use chintai_orchestrator::domain::ports::clock::SystemClock;
use chintai_orchestrator::domain::ports::site_adapter::SiteAdapter;
use chintai_orchestrator::infrastructure::config::ConfigLoader;
use chintai_orchestrator::infrastructure::logging::{AuditLogger, LogConfig, LoggerImpl};
use chintai_orchestrator::services::{ControlOps, HookRegistry, ScheduleOps, Scheduler, TaskEngine};

/// Scrapers this process knows how to run. Real `SiteAdapter`s (SUUMO,
/// LIFULL HOME'S, AtHome, ...) are external collaborators plugged in here;
/// until one is wired up, each name resolves to a `MockSiteAdapter` so the
/// control plane is runnable and demoable end-to-end on its own.
fn adapter_registry() -> HashMap<String, Arc<dyn SiteAdapter>> {
    let mut adapters: HashMap<String, Arc<dyn SiteAdapter>> = HashMap::new();
    for scraper in ["suumo", "homes", "athome"] {
        adapters.insert(scraper.to_string(), Arc::new(MockSiteAdapter::new()));
    }
    adapters
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load().context("failed to load configuration")?;
    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging)).context("failed to initialize logging")?;

    let database_url = format!("sqlite:{}", config.database.path);
    let pool = initialize_database(&database_url).await.context("failed to initialize database")?;

    let task_store = Arc::new(SqliteTaskStore::new(pool.clone()));
    let schedule_store = Arc::new(SqliteScheduleStore::new(pool));
    let clock = Arc::new(SystemClock);
    let hooks = Arc::new(HookRegistry::new());

    let engine = TaskEngine::new(
        task_store.clone(),
        clock.clone(),
        hooks.clone(),
        adapter_registry(),
        config.pause_timeout_seconds,
        config.stats_sample_interval_seconds,
    );

    let scheduler = Scheduler::new(
        schedule_store.clone(),
        task_store.clone(),
        engine.clone(),
        clock.clone(),
        config.scheduler_tick_seconds,
    );
    hooks.register_completion(scheduler.reconciliation_hook()).await;
    let _scheduler_handle = scheduler.spawn();

    let audit_log_path = std::path::Path::new(&config.database.path)
        .parent()
        .unwrap_or_else(|| std::path::Path::new("."))
        .join("audit.log");
    let audit = Arc::new(AuditLogger::new(audit_log_path).await.context("failed to open audit log")?);

    let ops = ControlOps::new(task_store, engine, clock, audit.clone(), config.max_tasks_listed, config.stall_threshold_minutes);
    let schedule_ops = ScheduleOps::new(schedule_store, audit);

    commands::run(&ops, &schedule_ops, cli).await;
    Ok(())
}
