//! Per (scraper, area) execution progress and the patches merged into it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of one (scraper, area) pair's execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ProgressStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// One (scraper, area) pair's recorded progress. Stored as the value side of
/// `tasks.progress_detail[pair_key]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub scraper: String,
    pub area_code: String,
    pub area_name: String,
    pub status: ProgressStatus,
    /// Finalisation barrier: once `true`, every future patch for this key is dropped.
    #[serde(default)]
    pub is_final: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties_found: i64,
    #[serde(default)]
    pub properties_processed: i64,
    #[serde(default)]
    pub properties_attempted: i64,
    #[serde(default)]
    pub detail_fetched: i64,
    #[serde(default)]
    pub detail_skipped: i64,
    #[serde(default)]
    pub detail_fetch_failed: i64,
    #[serde(default)]
    pub new_listings: i64,
    #[serde(default)]
    pub price_updated: i64,
    #[serde(default)]
    pub other_updates: i64,
    #[serde(default)]
    pub refetched_unchanged: i64,
    #[serde(default)]
    pub save_failed: i64,
    #[serde(default)]
    pub price_missing: i64,
    #[serde(default)]
    pub building_info_missing: i64,
    #[serde(default)]
    pub other_errors: i64,
    #[serde(default)]
    pub validation_failed: i64,
    #[serde(default)]
    pub errors: i64,
    #[serde(default)]
    pub errors_list: Vec<String>,
}

impl ProgressRecord {
    pub fn new_pending(scraper: impl Into<String>, area_code: impl Into<String>, area_name: impl Into<String>) -> Self {
        Self {
            scraper: scraper.into(),
            area_code: area_code.into(),
            area_name: area_name.into(),
            status: ProgressStatus::Pending,
            is_final: false,
            started_at: None,
            completed_at: None,
            properties_found: 0,
            properties_processed: 0,
            properties_attempted: 0,
            detail_fetched: 0,
            detail_skipped: 0,
            detail_fetch_failed: 0,
            new_listings: 0,
            price_updated: 0,
            other_updates: 0,
            refetched_unchanged: 0,
            save_failed: 0,
            price_missing: 0,
            building_info_missing: 0,
            other_errors: 0,
            validation_failed: 0,
            errors: 0,
            errors_list: Vec::new(),
        }
    }
}

/// A partial update merged into a `ProgressRecord` by the aggregator.
/// `None` fields mean "no change"; this is why the merge rules in
/// `services::progress_aggregator` treat a patch without a `status` specially.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressPatch {
    pub status: Option<ProgressStatus>,
    #[serde(default)]
    pub is_final: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub properties_found: Option<i64>,
    pub properties_processed: Option<i64>,
    pub properties_attempted: Option<i64>,
    pub detail_fetched: Option<i64>,
    pub detail_skipped: Option<i64>,
    pub detail_fetch_failed: Option<i64>,
    pub new_listings: Option<i64>,
    pub price_updated: Option<i64>,
    pub other_updates: Option<i64>,
    pub refetched_unchanged: Option<i64>,
    pub save_failed: Option<i64>,
    pub price_missing: Option<i64>,
    pub building_info_missing: Option<i64>,
    pub other_errors: Option<i64>,
    pub validation_failed: Option<i64>,
    pub errors: Option<i64>,
    pub errors_list: Option<Vec<String>>,
}

impl ProgressPatch {
    pub fn terminal(status: ProgressStatus, completed_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(status),
            is_final: true,
            completed_at: Some(completed_at),
            ..Default::default()
        }
    }
}

impl ProgressRecord {
    /// Merges a patch in place. Returns `false` without changing anything if
    /// the record was already finalised — the finalisation barrier at the
    /// heart of the merge protocol: once `is_final` is set, no later patch
    /// (even a legitimate-looking status update) can un-finalise it.
    ///
    /// Counters are treated as increments (a `Reporter::update_stats` call
    /// mid-run reports what changed since the last call, not a running
    /// total), while `status`/timestamps/`errors_list` are last-write-wins.
    pub fn apply_patch(&mut self, patch: &ProgressPatch) -> bool {
        if self.is_final {
            return false;
        }

        // Rule 2: a `running` (or absent) status never regresses an already
        // completed/failed record. Counters from the same patch still merge.
        let regressive_running = self.status.is_terminal()
            && !matches!(self.status, ProgressStatus::Cancelled)
            && matches!(patch.status, Some(ProgressStatus::Running) | None);
        if let Some(status) = patch.status {
            if !regressive_running {
                self.status = status;
            }
        }
        if patch.is_final {
            self.is_final = true;
        }
        if self.started_at.is_none() {
            if let Some(started_at) = patch.started_at {
                self.started_at = Some(started_at);
            }
        }
        if !regressive_running {
            if let Some(completed_at) = patch.completed_at {
                self.completed_at = Some(completed_at);
            }
        }

        macro_rules! add {
            ($field:ident) => {
                if let Some(delta) = patch.$field {
                    self.$field += delta;
                }
            };
        }
        add!(properties_found);
        add!(properties_processed);
        add!(properties_attempted);
        add!(detail_fetched);
        add!(detail_skipped);
        add!(detail_fetch_failed);
        add!(new_listings);
        add!(price_updated);
        add!(other_updates);
        add!(refetched_unchanged);
        add!(save_failed);
        add!(price_missing);
        add!(building_info_missing);
        add!(other_errors);
        add!(validation_failed);
        add!(errors);

        if let Some(errors_list) = &patch.errors_list {
            self.errors_list.extend(errors_list.iter().cloned());
        }

        true
    }
}
