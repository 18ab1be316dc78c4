//! Operations the CLI's `schedule` subcommands drive: create, list, delete.
//! Mirrors `ControlOps`'s shape — area resolution plus an audited wrapper
//! over the store — but scoped to the Schedule entity rather than Task.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::area;
use crate::domain::models::schedule::{Schedule, ScheduleType};
use crate::domain::ports::schedule_store::ScheduleStore;
use crate::infrastructure::logging::AuditLogger;

/// Caller-supplied inputs for `Schedule::Create`. `areas` accepts area codes,
/// Japanese ward names, or romaji, resolved the same way `StartOptions` does.
#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    pub name: String,
    pub description: String,
    pub scrapers: Vec<String>,
    pub areas: Vec<String>,
    pub max_properties_per_pair: u32,
    pub schedule_type: ScheduleType,
}

pub struct ScheduleOps<Sched: ScheduleStore> {
    store: Arc<Sched>,
    audit: Arc<AuditLogger>,
}

impl<Sched: ScheduleStore + 'static> ScheduleOps<Sched> {
    pub fn new(store: Arc<Sched>, audit: Arc<AuditLogger>) -> Self {
        Self { store, audit }
    }

    async fn audit_log(&self, operation: &str, actor: &str, resource_id: Option<Uuid>, success: bool, metadata: Option<serde_json::Value>) {
        let resource_id = resource_id.map(|id| id.to_string());
        if let Err(error) =
            self.audit.log_operation(operation, actor, resource_id.as_deref(), success, metadata).await
        {
            tracing::warn!(%error, operation, "failed to write audit log entry");
        }
    }

    fn resolve_areas(&self, areas: &[String]) -> DomainResult<Vec<String>> {
        areas
            .iter()
            .map(|input| {
                area::resolve_code(input)
                    .map(str::to_string)
                    .ok_or_else(|| OrchestratorError::InvalidArgument(format!("unrecognised area: {input}")))
            })
            .collect()
    }

    pub async fn create(&self, opts: ScheduleOptions, actor: &str) -> DomainResult<Schedule> {
        if opts.scrapers.is_empty() {
            let error = OrchestratorError::InvalidArgument("a schedule must name at least one scraper".into());
            self.audit_log("create_schedule", actor, None, false, Some(json!({"error": error.to_string()}))).await;
            return Err(error);
        }
        let areas = match self.resolve_areas(&opts.areas) {
            Ok(areas) => areas,
            Err(error) => {
                self.audit_log("create_schedule", actor, None, false, Some(json!({"error": error.to_string()}))).await;
                return Err(error);
            }
        };

        let draft = Schedule::new(
            opts.name,
            opts.description,
            opts.scrapers,
            areas,
            opts.max_properties_per_pair,
            opts.schedule_type,
            Some(actor.to_string()),
        );
        let result = self.store.create_schedule(draft).await;
        match &result {
            Ok(schedule) => self.audit_log("create_schedule", actor, Some(schedule.id), true, None).await,
            Err(error) => self.audit_log("create_schedule", actor, None, false, Some(json!({"error": error.to_string()}))).await,
        }
        result
    }

    pub async fn list(&self, active_only: bool) -> DomainResult<Vec<Schedule>> {
        self.store.list_schedules(active_only).await
    }

    pub async fn delete(&self, id: Uuid, actor: &str) -> DomainResult<()> {
        let result = self.store.delete_schedule(id).await;
        self.audit_log("delete_schedule", actor, Some(id), result.is_ok(), None).await;
        result
    }
}
