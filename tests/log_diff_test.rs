//! `ReadLogDiff`: a property change and a scripted failure on two different
//! pairs should surface as one `property_updates` entry and one `errors`
//! entry, both newer than a cursor taken before the run started.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chintai_orchestrator::adapters::mock_site_adapter::{AreaScript, MockSiteAdapter, SiteAdapterErrorKind};
use chintai_orchestrator::adapters::sqlite::{create_migrated_test_pool, SqliteTaskStore};
use chintai_orchestrator::domain::models::task::{TaskKind, TaskStatus};
use chintai_orchestrator::domain::ports::clock::SystemClock;
use chintai_orchestrator::domain::ports::site_adapter::{ChangeKind, ListingChange, SiteAdapter, Stats};
use chintai_orchestrator::domain::ports::task_store::TaskStore;
use chintai_orchestrator::infrastructure::logging::AuditLogger;
use chintai_orchestrator::services::control_ops::{ControlOps, StartOptions};
use chintai_orchestrator::services::hooks::HookRegistry;
use chintai_orchestrator::services::task_engine::TaskEngine;
use tempfile::TempDir;

#[tokio::test]
async fn log_diff_groups_property_updates_and_errors_since_the_cursor() {
    let pool = create_migrated_test_pool().await.unwrap();
    let store = Arc::new(SqliteTaskStore::new(pool));

    let change = ListingChange {
        kind: ChangeKind::PriceUpdated,
        building_name: "Green Heights".into(),
        floor: Some("5F".into()),
        area_sqm: Some("40".into()),
        layout: Some("2LDK".into()),
        direction: Some("south".into()),
        price_man_yen: Some(12000),
        details_text: None,
    };
    let suumo = MockSiteAdapter::new()
        .with_script("13103", AreaScript::Succeed { listings: vec![change], stats: Stats { price_updated: 1, ..Default::default() } })
        .with_script("13113", AreaScript::Fail(SiteAdapterErrorKind::Timeout));

    let mut adapters: HashMap<String, Arc<dyn SiteAdapter>> = HashMap::new();
    adapters.insert("suumo".into(), Arc::new(suumo));
    let engine = TaskEngine::new(store.clone(), Arc::new(SystemClock), Arc::new(HookRegistry::new()), adapters, 1800, 2);
    let temp_dir = TempDir::new().unwrap();
    let audit = Arc::new(AuditLogger::new(temp_dir.path().join("audit.log")).await.unwrap());
    let ops = ControlOps::new(store.clone(), engine, Arc::new(SystemClock), audit, 100, 30);

    let since = chrono::Utc::now() - chrono::Duration::seconds(1);
    let task = ops
        .start_serial(
            StartOptions {
                scrapers: vec!["suumo".into()],
                areas: vec!["minato".into(), "shibuya".into()],
                max_properties_per_pair: 100,
                force_detail_fetch: false,
                detail_refetch_hours: None,
                ignore_error_history: false,
            },
            "operator",
        )
        .await
        .unwrap();

    for _ in 0..200 {
        if store.load_task(task.id).await.unwrap().status == TaskStatus::Failed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.load_task(task.id).await.unwrap().status, TaskStatus::Failed);
    assert_eq!(store.load_task(task.id).await.unwrap().kind, TaskKind::Serial);

    let diff = ops.read_log_diff(task.id, since).await.unwrap();
    assert_eq!(diff.property_updates.len(), 1);
    assert!(diff.property_updates[0].message.contains("Green Heights"));
    assert_eq!(diff.errors.len(), 1);
    assert!(diff.errors[0].message.contains("mock_failure"));

    // A cursor taken after the run sees nothing new.
    let empty = ops.read_log_diff(task.id, chrono::Utc::now()).await.unwrap();
    assert!(empty.property_updates.is_empty());
    assert!(empty.errors.is_empty());
}
