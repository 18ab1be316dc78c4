//! The external collaborator boundary: one `SiteAdapter` per scraping source,
//! and the three capability interfaces the engine hands it (`Reporter`,
//! `Controller`, `ListingSink`). Adapters are plug-ins; the engine never
//! inspects their internals, only the `Stats` they hand back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::models::task::TaskOptions;

/// Raised from `Controller::checkpoint_or_abort` when a worker must stop
/// because its task was cancelled (directly, or via pause-timeout promotion).
/// Pause itself is never exceptional — it's absorbed inside the checkpoint
/// loop and returns normally once cleared.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("task cancelled")]
pub struct Cancelled;

/// Per-pair options threaded through from `TaskOptions` unchanged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScrapeOptions {
    pub max_properties: u32,
    pub force_detail_fetch: bool,
    pub detail_refetch_hours: Option<u32>,
    pub ignore_error_history: bool,
}

impl From<&TaskOptions> for ScrapeOptions {
    fn from(opts: &TaskOptions) -> Self {
        Self {
            max_properties: opts.max_properties_per_pair,
            force_detail_fetch: opts.force_detail_fetch,
            detail_refetch_hours: opts.detail_refetch_hours,
            ignore_error_history: opts.ignore_error_history,
        }
    }
}

/// Terminal snapshot an adapter returns from `scrape_area`. Field set mirrors
/// `ProgressRecord`'s counters one-to-one; the engine copies these into the
/// finalisation patch rather than trusting incremental `update_stats` calls
/// alone (an adapter that forgot a final flush still reports correctly).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub properties_found: i64,
    pub properties_processed: i64,
    pub properties_attempted: i64,
    pub detail_fetched: i64,
    pub detail_skipped: i64,
    pub detail_fetch_failed: i64,
    pub new_listings: i64,
    pub price_updated: i64,
    pub other_updates: i64,
    pub refetched_unchanged: i64,
    pub save_failed: i64,
    pub price_missing: i64,
    pub building_info_missing: i64,
    pub other_errors: i64,
    pub validation_failed: i64,
    pub errors: i64,
}

/// A partial statistics update pushed by the adapter mid-run. Maps directly
/// onto `ProgressPatch`'s counter fields; `reporter` is responsible for the
/// translation so adapters don't depend on the aggregator's merge types.
pub type StatsUpdate = Stats;

/// Kind of change a sink write produced, mirroring §4.3 (`LogBuffer`):
/// `refetched_unchanged` and `skipped` never produce a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    New,
    PriceUpdated,
    OtherUpdates,
    RefetchedUnchanged,
    Skipped,
}

impl ChangeKind {
    pub fn produces_log_entry(self) -> bool {
        !matches!(self, Self::RefetchedUnchanged | Self::Skipped)
    }
}

/// A listing-change notification the engine turns into a `property_update`
/// log line using the stable template in §4.3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingChange {
    pub kind: ChangeKind,
    pub building_name: String,
    pub floor: Option<String>,
    pub area_sqm: Option<String>,
    pub layout: Option<String>,
    pub direction: Option<String>,
    pub price_man_yen: Option<i64>,
    pub details_text: Option<String>,
}

/// Error/warning payload shared by `Reporter::log_error` / `log_warning`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueInfo {
    pub scraper: String,
    pub area: String,
    pub url: Option<String>,
    pub building_name: Option<String>,
    pub price_man_yen: Option<i64>,
    /// Short category from §7's vocabulary (`timeout`, `execution_error`, ...).
    pub reason: String,
    pub error_detail: String,
}

/// The capability interface the engine hands an adapter for reporting
/// progress. Backed by `ProgressAggregator` + `LogBuffer`; adapters depend
/// only on this trait, never on the aggregator or store directly.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn update_stats(&self, partial: StatsUpdate);
    async fn log_listing_change(&self, change: ListingChange);
    async fn log_error(&self, info: IssueInfo);
    async fn log_warning(&self, info: IssueInfo);
}

/// The capability interface an adapter consults at every checkpoint.
/// `checkpoint_or_abort` blocks while the task is paused and returns
/// `Err(Cancelled)` once the task is cancelled or the pause times out.
#[async_trait]
pub trait Controller: Send + Sync {
    async fn checkpoint_or_abort(&self) -> Result<(), Cancelled>;
}

/// The capability interface adapters persist parsed listings through.
/// Opaque to the engine beyond the `ChangeKind` it needs for logging;
/// building/property dedup and price-history writing live entirely on the
/// other side of this trait.
#[async_trait]
pub trait ListingSink: Send + Sync {
    async fn create_or_update_listing(
        &self,
        building_info: Value,
        property_info: Value,
        listing_info: Value,
    ) -> Result<(String, ChangeKind, Option<String>), String>;
}

/// One plug-in scraping source. The engine owns exactly one instance per
/// (task, scraper) and may reuse it across areas within that task; instances
/// are never shared across tasks or memoized across a pause/resume cycle
/// (see SPEC_FULL.md's Open Question on adapter reuse).
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    async fn scrape_area(
        &self,
        area_code: &str,
        options: ScrapeOptions,
        reporter: &(dyn Reporter + 'static),
        controller: &(dyn Controller + 'static),
    ) -> Result<Stats, SiteAdapterError>;
}

/// Errors a `SiteAdapter` may surface; the engine maps these onto the §7
/// category table when writing the pair's `error` log entry.
#[derive(Debug, Error)]
pub enum SiteAdapterError {
    #[error("cancelled")]
    Cancelled,
    #[error("connection refused: {0}")]
    ConnectionRefused(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("execution error: {0}")]
    Execution(String),
}

impl From<Cancelled> for SiteAdapterError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl SiteAdapterError {
    /// Maps an adapter failure onto the §7 error-category vocabulary.
    pub fn category(&self) -> crate::domain::errors::ErrorCategory {
        use crate::domain::errors::ErrorCategory;
        match self {
            Self::Cancelled => ErrorCategory::ExecutionError,
            Self::ConnectionRefused(_) => ErrorCategory::ConnectionRefused,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::PermissionDenied(_) => ErrorCategory::PermissionDenied,
            Self::Execution(_) => ErrorCategory::ExecutionError,
        }
    }
}
