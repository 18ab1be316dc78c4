//! Area code/Japanese-name/romaji resolution (§3.2) exercised through
//! `ControlOps::start_serial`, the only place a caller-supplied area string
//! actually gets resolved before a task is created.

use std::collections::HashMap;
use std::sync::Arc;

use chintai_orchestrator::adapters::mock_site_adapter::MockSiteAdapter;
use chintai_orchestrator::adapters::sqlite::{create_migrated_test_pool, SqliteTaskStore};
use chintai_orchestrator::domain::ports::clock::SystemClock;
use chintai_orchestrator::domain::ports::site_adapter::SiteAdapter;
use chintai_orchestrator::infrastructure::logging::AuditLogger;
use chintai_orchestrator::services::control_ops::{ControlOps, StartOptions};
use chintai_orchestrator::services::hooks::HookRegistry;
use chintai_orchestrator::services::task_engine::TaskEngine;
use tempfile::TempDir;

async fn setup() -> (ControlOps<SqliteTaskStore>, TempDir) {
    let pool = create_migrated_test_pool().await.unwrap();
    let store = Arc::new(SqliteTaskStore::new(pool));
    let mut adapters: HashMap<String, Arc<dyn SiteAdapter>> = HashMap::new();
    adapters.insert("suumo".into(), Arc::new(MockSiteAdapter::new()));
    let engine = TaskEngine::new(store.clone(), Arc::new(SystemClock), Arc::new(HookRegistry::new()), adapters, 1800, 2);
    let temp_dir = TempDir::new().unwrap();
    let audit = Arc::new(AuditLogger::new(temp_dir.path().join("audit.log")).await.unwrap());
    (ControlOps::new(store, engine, Arc::new(SystemClock), audit, 100, 30), temp_dir)
}

fn opts(areas: Vec<&str>) -> StartOptions {
    StartOptions {
        scrapers: vec!["suumo".into()],
        areas: areas.into_iter().map(str::to_string).collect(),
        max_properties_per_pair: 100,
        force_detail_fetch: false,
        detail_refetch_hours: None,
        ignore_error_history: false,
    }
}

#[tokio::test]
async fn a_numeric_code_passes_through_unchanged() {
    let (ops, _dir) = setup().await;
    let task = ops.start_serial(opts(vec!["13103"]), "t").await.unwrap();
    assert_eq!(task.areas, vec!["13103".to_string()]);
}

#[tokio::test]
async fn a_japanese_ward_name_resolves_to_its_code() {
    let (ops, _dir) = setup().await;
    let task = ops.start_serial(opts(vec!["渋谷区"]), "t").await.unwrap();
    assert_eq!(task.areas, vec!["13113".to_string()]);
}

#[tokio::test]
async fn a_romaji_name_is_case_insensitive() {
    let (ops, _dir) = setup().await;
    let task = ops.start_serial(opts(vec!["Shinjuku"]), "t").await.unwrap();
    assert_eq!(task.areas, vec!["13104".to_string()]);
}

#[tokio::test]
async fn an_unrecognised_area_is_rejected_before_any_task_is_created() {
    let (ops, _dir) = setup().await;
    assert!(ops.start_serial(opts(vec!["atlantis"]), "t").await.is_err());
}

#[tokio::test]
async fn mixed_identifiers_in_one_request_all_resolve() {
    let (ops, _dir) = setup().await;
    let task = ops.start_serial(opts(vec!["minato", "13113", "新宿区"]), "t").await.unwrap();
    assert_eq!(task.areas, vec!["13103".to_string(), "13113".to_string(), "13104".to_string()]);
}
