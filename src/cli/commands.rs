//! Subcommand definitions and handlers: one function per control operation
//! in §4.8, each a thin shim from parsed CLI arguments onto `ControlOps`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use comfy_table::Cell;
use serde_json::json;
use uuid::Uuid;

use crate::cli::output::{output, output_error, CommandOutput};
use crate::cli::table::{list_table, render_list};
use crate::domain::models::area;
use crate::domain::models::log_entry::LogEntry;
use crate::domain::models::schedule::{Schedule, ScheduleType};
use crate::domain::models::task::Task;
use crate::domain::ports::schedule_store::ScheduleStore;
use crate::domain::ports::task_store::TaskStore;
use crate::services::control_ops::{ControlOps, StartOptions};
use crate::services::schedule_ops::{ScheduleOps, ScheduleOptions};

#[derive(Parser, Debug)]
#[command(name = "chintai-orchestrator", version, about = "Control plane for Japanese real-estate scraping runs")]
pub struct Cli {
    /// Emit machine-readable JSON instead of human-readable tables/text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Actor name recorded against every mutating control operation's audit entry.
    #[arg(long, global = true, default_value = "cli")]
    pub actor: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a task that runs scrapers one at a time, areas in order.
    StartSerial(StartArgs),
    /// Start a task that runs one worker per scraper concurrently.
    StartParallel(StartArgs),
    /// Show a task's full status snapshot.
    Status { task_id: Uuid },
    /// List recent tasks.
    List {
        /// Restrict to `status ∈ {pending, running, paused}`.
        #[arg(long)]
        active_only: bool,
    },
    /// Request a running task pause at its workers' next checkpoint.
    Pause { task_id: Uuid },
    /// Resume a paused task.
    Resume { task_id: Uuid },
    /// Request a task cancel at its workers' next checkpoint.
    Cancel { task_id: Uuid },
    /// Delete a task in a terminal state (or pending, never started).
    Delete { task_id: Uuid },
    /// Read log entries appended since a cursor timestamp, grouped by kind.
    Logs {
        task_id: Uuid,
        /// RFC3339 cursor; entries with `timestamp > since` are returned. Defaults to the epoch.
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },
    /// Run the stall-detector sweep immediately, regardless of threshold.
    ForceCleanup,
    /// Create, list, or delete recurring schedules.
    #[command(subcommand)]
    Schedule(ScheduleCommands),
}

#[derive(Subcommand, Debug)]
pub enum ScheduleCommands {
    /// Register a new recurring schedule.
    Create(ScheduleCreateArgs),
    /// List schedules.
    List {
        /// Restrict to `status = active`.
        #[arg(long)]
        active_only: bool,
    },
    /// Delete a schedule.
    Delete { schedule_id: Uuid },
}

#[derive(Args, Debug)]
pub struct ScheduleCreateArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long, default_value = "")]
    pub description: String,
    /// Scraper identifiers, comma-separated (e.g. "suumo,homes").
    #[arg(long, value_delimiter = ',')]
    pub scrapers: Vec<String>,
    /// Area codes, Japanese ward names, or romaji, comma-separated.
    #[arg(long, value_delimiter = ',')]
    pub areas: Vec<String>,
    #[arg(long, default_value_t = 100)]
    pub max_properties: u32,
    /// Fire every N minutes. Mutually exclusive with --daily-hour.
    #[arg(long)]
    pub interval_minutes: Option<u32>,
    /// Fire daily at this hour (0-23 UTC). Requires --daily-minute and is
    /// mutually exclusive with --interval-minutes.
    #[arg(long)]
    pub daily_hour: Option<u8>,
    #[arg(long, default_value_t = 0)]
    pub daily_minute: u8,
}

impl ScheduleCreateArgs {
    pub fn into_schedule_type(&self) -> anyhow::Result<ScheduleType> {
        match (self.interval_minutes, self.daily_hour) {
            (Some(_), Some(_)) => {
                anyhow::bail!("specify either --interval-minutes or --daily-hour, not both")
            }
            (Some(interval_minutes), None) => Ok(ScheduleType::Interval { interval_minutes }),
            (None, Some(hour)) => {
                if hour > 23 || self.daily_minute > 59 {
                    anyhow::bail!("--daily-hour must be 0-23 and --daily-minute 0-59");
                }
                Ok(ScheduleType::Daily { hour, minute: self.daily_minute })
            }
            (None, None) => anyhow::bail!("specify either --interval-minutes or --daily-hour"),
        }
    }
}

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Scraper identifiers, comma-separated (e.g. "suumo,homes").
    #[arg(long, value_delimiter = ',')]
    pub scrapers: Vec<String>,
    /// Area codes, Japanese ward names, or romaji, comma-separated.
    #[arg(long, value_delimiter = ',')]
    pub areas: Vec<String>,
    #[arg(long, default_value_t = 100)]
    pub max_properties: u32,
    #[arg(long)]
    pub force_detail_fetch: bool,
    #[arg(long)]
    pub detail_refetch_hours: Option<u32>,
    #[arg(long)]
    pub ignore_error_history: bool,
}

impl From<StartArgs> for StartOptions {
    fn from(args: StartArgs) -> Self {
        Self {
            scrapers: args.scrapers,
            areas: args.areas,
            max_properties_per_pair: args.max_properties,
            force_detail_fetch: args.force_detail_fetch,
            detail_refetch_hours: args.detail_refetch_hours,
            ignore_error_history: args.ignore_error_history,
        }
    }
}

/// Renders area codes with their romaji ward name for operator-facing
/// output, e.g. "13103(minato)"; falls back to the bare code for anything
/// `romaji_for_code` doesn't recognise.
fn format_areas(areas: &[String]) -> String {
    areas
        .iter()
        .map(|code| match area::romaji_for_code(code) {
            Some(romaji) => format!("{code}({romaji})"),
            None => code.clone(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

impl CommandOutput for Task {
    fn to_human(&self) -> String {
        format!(
            "{} [{}] {} scrapers={:?} areas=[{}] processed={} errors={}",
            self.id,
            self.kind.as_str(),
            self.status.as_str(),
            self.scrapers,
            format_areas(&self.areas),
            self.total_processed,
            self.total_errors,
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(json!({}))
    }
}

struct TaskList(Vec<Task>);

impl serde::Serialize for TaskList {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl CommandOutput for TaskList {
    fn to_human(&self) -> String {
        let mut table = list_table(&["task_id", "kind", "status", "scrapers", "areas", "errors"]);
        for task in &self.0 {
            table.add_row(vec![
                Cell::new(task.id),
                Cell::new(task.kind.as_str()),
                Cell::new(task.status.as_str()),
                Cell::new(task.scrapers.join(",")),
                Cell::new(format_areas(&task.areas)),
                Cell::new(task.total_errors),
            ]);
        }
        render_list("task", table, self.0.len())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.0).unwrap_or(json!([]))
    }
}

impl CommandOutput for Schedule {
    fn to_human(&self) -> String {
        format!(
            "{} \"{}\" [{}] scrapers={:?} areas=[{}] next_run_at={} status={}",
            self.id,
            self.name,
            self.schedule_type.as_str(),
            self.scrapers,
            format_areas(&self.areas),
            self.next_run_at,
            self.status.as_str(),
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(json!({}))
    }
}

struct ScheduleList(Vec<Schedule>);

impl serde::Serialize for ScheduleList {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl CommandOutput for ScheduleList {
    fn to_human(&self) -> String {
        let mut table = list_table(&["schedule_id", "name", "type", "scrapers", "areas", "next_run_at", "status"]);
        for schedule in &self.0 {
            table.add_row(vec![
                Cell::new(schedule.id),
                Cell::new(&schedule.name),
                Cell::new(schedule.schedule_type.as_str()),
                Cell::new(schedule.scrapers.join(",")),
                Cell::new(format_areas(&schedule.areas)),
                Cell::new(schedule.next_run_at),
                Cell::new(schedule.status.as_str()),
            ]);
        }
        render_list("schedule", table, self.0.len())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.0).unwrap_or(json!([]))
    }
}

struct LogDiff {
    property_updates: Vec<LogEntry>,
    errors: Vec<LogEntry>,
    warnings: Vec<LogEntry>,
}

impl serde::Serialize for LogDiff {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("LogDiff", 3)?;
        state.serialize_field("property_updates", &self.property_updates)?;
        state.serialize_field("errors", &self.errors)?;
        state.serialize_field("warnings", &self.warnings)?;
        state.end()
    }
}

impl CommandOutput for LogDiff {
    fn to_human(&self) -> String {
        let mut out = String::new();
        for entry in &self.property_updates {
            out.push_str(&format!("[{}] {}\n", entry.timestamp, entry.message));
        }
        for entry in &self.errors {
            out.push_str(&format!("[{}] ERROR {}\n", entry.timestamp, entry.message));
        }
        for entry in &self.warnings {
            out.push_str(&format!("[{}] WARN {}\n", entry.timestamp, entry.message));
        }
        if out.is_empty() {
            "No new log entries.".to_string()
        } else {
            out.trim_end().to_string()
        }
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "property_updates": self.property_updates,
            "errors": self.errors,
            "warnings": self.warnings,
        })
    }
}

/// Dispatches one parsed `Commands` variant against `ControlOps` (task
/// control) or `ScheduleOps` (schedule CRUD), rendering the result or error
/// per the caller's `--json` preference.
pub async fn run<Store: TaskStore + 'static, Sched: ScheduleStore + 'static>(
    ops: &ControlOps<Store>,
    schedule_ops: &ScheduleOps<Sched>,
    cli: Cli,
) {
    let json = cli.json;
    let actor = cli.actor.as_str();
    match cli.command {
        Commands::StartSerial(args) => match ops.start_serial(args.into(), actor).await {
            Ok(task) => output(&task, json),
            Err(error) => output_error("start-serial", &error.into(), json),
        },
        Commands::StartParallel(args) => match ops.start_parallel(args.into(), actor).await {
            Ok(task) => output(&task, json),
            Err(error) => output_error("start-parallel", &error.into(), json),
        },
        Commands::Status { task_id } => match ops.get_status(task_id).await {
            Ok(task) => output(&task, json),
            Err(error) => output_error("status", &error.into(), json),
        },
        Commands::List { active_only } => match ops.list_tasks(active_only).await {
            Ok(tasks) => output(&TaskList(tasks), json),
            Err(error) => output_error("list", &error.into(), json),
        },
        Commands::Pause { task_id } => match ops.pause(task_id, actor).await {
            Ok(()) => print_ok("paused", task_id, json),
            Err(error) => output_error("pause", &error.into(), json),
        },
        Commands::Resume { task_id } => match ops.resume(task_id, actor).await {
            Ok(()) => print_ok("resumed", task_id, json),
            Err(error) => output_error("resume", &error.into(), json),
        },
        Commands::Cancel { task_id } => match ops.cancel(task_id, actor).await {
            Ok(()) => print_ok("cancelled", task_id, json),
            Err(error) => output_error("cancel", &error.into(), json),
        },
        Commands::Delete { task_id } => match ops.delete(task_id, actor).await {
            Ok(()) => print_ok("deleted", task_id, json),
            Err(error) => output_error("delete", &error.into(), json),
        },
        Commands::Logs { task_id, since } => {
            let since = since.unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default());
            match ops.read_log_diff(task_id, since).await {
                Ok(grouped) => output(
                    &LogDiff { property_updates: grouped.property_updates, errors: grouped.errors, warnings: grouped.warnings },
                    json,
                ),
                Err(error) => output_error("logs", &error.into(), json),
            }
        }
        Commands::ForceCleanup => match ops.force_cleanup(actor).await {
            Ok(count) => {
                if json {
                    println!("{}", json!({"tasks_failed": count}));
                } else {
                    println!("force-cleanup failed {count} stalled task(s)");
                }
            }
            Err(error) => output_error("force-cleanup", &error.into(), json),
        },
        Commands::Schedule(ScheduleCommands::Create(args)) => {
            let schedule_type = match args.into_schedule_type() {
                Ok(schedule_type) => schedule_type,
                Err(error) => return output_error("schedule create", &error, json),
            };
            let opts = ScheduleOptions {
                name: args.name,
                description: args.description,
                scrapers: args.scrapers,
                areas: args.areas,
                max_properties_per_pair: args.max_properties,
                schedule_type,
            };
            match schedule_ops.create(opts, actor).await {
                Ok(schedule) => output(&schedule, json),
                Err(error) => output_error("schedule create", &error.into(), json),
            }
        }
        Commands::Schedule(ScheduleCommands::List { active_only }) => {
            match schedule_ops.list(active_only).await {
                Ok(schedules) => output(&ScheduleList(schedules), json),
                Err(error) => output_error("schedule list", &error.into(), json),
            }
        }
        Commands::Schedule(ScheduleCommands::Delete { schedule_id }) => {
            match schedule_ops.delete(schedule_id, actor).await {
                Ok(()) => print_ok("deleted", schedule_id, json),
                Err(error) => output_error("schedule delete", &error.into(), json),
            }
        }
    }
}

fn print_ok(verb: &str, task_id: Uuid, json: bool) {
    if json {
        println!("{}", json!({"task_id": task_id, "result": verb}));
    } else {
        println!("task {task_id} {verb}");
    }
}
