//! Append-only, typed log stream persisted per task (§4.3).
//!
//! Templates listing changes into stable Japanese messages and groups the
//! diff read by kind; storage itself is `TaskStore::append_log` /
//! `read_logs_since`, which this module never bypasses.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::log_entry::{LogEntry, LogKind, NewLogEntry};
use crate::domain::ports::site_adapter::{ChangeKind, IssueInfo, ListingChange};
use crate::domain::ports::task_store::TaskStore;

const UNKNOWN: &str = "-";

/// `ReadLogsSince` response, grouped by kind per §4.3.
#[derive(Debug, Clone, Default)]
pub struct GroupedLogs {
    pub property_updates: Vec<LogEntry>,
    pub errors: Vec<LogEntry>,
    pub warnings: Vec<LogEntry>,
}

pub struct LogBuffer<Store: TaskStore> {
    store: Arc<Store>,
}

impl<Store: TaskStore> LogBuffer<Store> {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Templates a `property_update` entry from a listing change.
    /// `refetched_unchanged` and `skipped` never reach here (callers check
    /// `ChangeKind::produces_log_entry` first); asserted defensively.
    pub async fn log_listing_change(&self, task_id: Uuid, change: &ListingChange) -> DomainResult<()> {
        if !change.kind.produces_log_entry() {
            return Ok(());
        }

        let building = change.building_name.as_str();
        let price = change.price_man_yen.map_or_else(|| UNKNOWN.to_string(), |p| p.to_string());
        let message = match change.kind {
            ChangeKind::New => format!(
                "新規物件登録: {building} {floor}/{area}/{layout}/{direction} ({price}万円)",
                floor = change.floor.as_deref().unwrap_or(UNKNOWN),
                area = change.area_sqm.as_deref().unwrap_or(UNKNOWN),
                layout = change.layout.as_deref().unwrap_or(UNKNOWN),
                direction = change.direction.as_deref().unwrap_or(UNKNOWN),
            ),
            ChangeKind::PriceUpdated => format!("価格変更: {building} ({price}万円)"),
            ChangeKind::OtherUpdates => format!("物件情報更新: {building}"),
            ChangeKind::RefetchedUnchanged | ChangeKind::Skipped => unreachable!("checked above"),
        };

        self.store.append_log(NewLogEntry::property_update(task_id, message)).await.map(|_| ())
    }

    pub async fn log_error(&self, task_id: Uuid, info: &IssueInfo) -> DomainResult<()> {
        let message = format!("{}: {}", info.reason, info.error_detail);
        let details = serde_json::to_value(info)?;
        self.store.append_log(NewLogEntry::error(task_id, message, Some(details))).await.map(|_| ())
    }

    pub async fn log_warning(&self, task_id: Uuid, info: &IssueInfo) -> DomainResult<()> {
        let message = format!("{}: {}", info.reason, info.error_detail);
        let details = serde_json::to_value(info)?;
        self.store.append_log(NewLogEntry::warning(task_id, message, Some(details))).await.map(|_| ())
    }

    /// Entries with `timestamp > since`, grouped by kind.
    pub async fn read_since(&self, task_id: Uuid, since: DateTime<Utc>) -> DomainResult<GroupedLogs> {
        let entries = self.store.read_logs_since(task_id, since).await?;
        let mut grouped = GroupedLogs::default();
        for entry in entries {
            match entry.kind {
                LogKind::PropertyUpdate => grouped.property_updates.push(entry),
                LogKind::Error => grouped.errors.push(entry),
                LogKind::Warning => grouped.warnings.push(entry),
            }
        }
        Ok(grouped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::adapters::sqlite::task_store::SqliteTaskStore;
    use crate::domain::models::task::{TaskKind, TaskOptions};
    use crate::domain::ports::task_store::NewTask;

    async fn setup() -> (LogBuffer<SqliteTaskStore>, Uuid) {
        let pool = create_migrated_test_pool().await.unwrap();
        let store = Arc::new(SqliteTaskStore::new(pool));
        let task_id = Uuid::new_v4();
        store
            .create_task(NewTask {
                task_id,
                kind: TaskKind::Serial,
                scrapers: vec!["suumo".into()],
                areas: vec!["13103".into()],
                options: TaskOptions::default(),
            })
            .await
            .unwrap();
        (LogBuffer::new(store), task_id)
    }

    fn listing(kind: ChangeKind) -> ListingChange {
        ListingChange {
            kind,
            building_name: "Test Mansion".into(),
            floor: Some("3F".into()),
            area_sqm: Some("25".into()),
            layout: Some("1K".into()),
            direction: Some("south".into()),
            price_man_yen: Some(8000),
            details_text: None,
        }
    }

    #[tokio::test]
    async fn new_listing_produces_a_templated_property_update() {
        let (buffer, task_id) = setup().await;
        buffer.log_listing_change(task_id, &listing(ChangeKind::New)).await.unwrap();
        let logs = buffer.read_since(task_id, Utc::now() - chrono::Duration::seconds(10)).await.unwrap();
        assert_eq!(logs.property_updates.len(), 1);
        assert!(logs.property_updates[0].message.starts_with("新規物件登録"));
    }

    #[tokio::test]
    async fn refetched_unchanged_produces_no_log_entry() {
        let (buffer, task_id) = setup().await;
        buffer.log_listing_change(task_id, &listing(ChangeKind::RefetchedUnchanged)).await.unwrap();
        let logs = buffer.read_since(task_id, Utc::now() - chrono::Duration::seconds(10)).await.unwrap();
        assert!(logs.property_updates.is_empty());
    }

    #[tokio::test]
    async fn error_and_warning_are_grouped_separately() {
        let (buffer, task_id) = setup().await;
        let info = IssueInfo {
            scraper: "suumo".into(),
            area: "13103".into(),
            url: None,
            building_name: None,
            price_man_yen: None,
            reason: "timeout".into(),
            error_detail: "connect timed out".into(),
        };
        buffer.log_error(task_id, &info).await.unwrap();
        buffer.log_warning(task_id, &info).await.unwrap();

        let logs = buffer.read_since(task_id, Utc::now() - chrono::Duration::seconds(10)).await.unwrap();
        assert_eq!(logs.errors.len(), 1);
        assert_eq!(logs.warnings.len(), 1);
    }
}
