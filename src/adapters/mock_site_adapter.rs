//! A deterministic `SiteAdapter` fixture for tests and local demos.
//!
//! Grounded on the teacher's convention of shipping an in-crate mock
//! alongside every real external-service adapter (so integration tests never
//! need network access). Configurable per-area script lets tests exercise
//! cancellation, partial failure, and the checkpoint loop without a real
//! scraping target.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::ports::site_adapter::{
    Controller, IssueInfo, ListingChange, Reporter, ScrapeOptions, SiteAdapter, SiteAdapterError, Stats,
};

/// What `MockSiteAdapter::scrape_area` should do for one area code.
#[derive(Debug, Clone)]
pub enum AreaScript {
    /// Report `listings` one at a time, checkpointing between each, then
    /// return `stats`.
    Succeed { listings: Vec<ListingChange>, stats: Stats },
    /// Return this error without reporting anything.
    Fail(SiteAdapterErrorKind),
    /// Loop checkpointing forever (until caller cancels) without making progress.
    HangUntilCancelled,
}

/// A cloneable stand-in for `SiteAdapterError`, since the real type doesn't implement `Clone`.
#[derive(Debug, Clone)]
pub enum SiteAdapterErrorKind {
    ConnectionRefused,
    Timeout,
    PermissionDenied,
    Execution,
}

impl From<SiteAdapterErrorKind> for SiteAdapterError {
    fn from(kind: SiteAdapterErrorKind) -> Self {
        match kind {
            SiteAdapterErrorKind::ConnectionRefused => Self::ConnectionRefused("mock: connection refused".into()),
            SiteAdapterErrorKind::Timeout => Self::Timeout("mock: timed out".into()),
            SiteAdapterErrorKind::PermissionDenied => Self::PermissionDenied("mock: permission denied".into()),
            SiteAdapterErrorKind::Execution => Self::Execution("mock: execution error".into()),
        }
    }
}

/// A scriptable `SiteAdapter`. Tests construct one with `with_script`,
/// run it through the engine, then assert against `calls()`.
pub struct MockSiteAdapter {
    scripts: HashMap<String, AreaScript>,
    default_stats: Stats,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockSiteAdapter {
    pub fn new() -> Self {
        Self { scripts: HashMap::new(), default_stats: Stats::default(), calls: Arc::new(Mutex::new(Vec::new())) }
    }

    #[must_use]
    pub fn with_script(mut self, area_code: impl Into<String>, script: AreaScript) -> Self {
        self.scripts.insert(area_code.into(), script);
        self
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

impl Default for MockSiteAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SiteAdapter for MockSiteAdapter {
    async fn scrape_area(
        &self,
        area_code: &str,
        _options: ScrapeOptions,
        reporter: &(dyn Reporter + 'static),
        controller: &(dyn Controller + 'static),
    ) -> Result<Stats, SiteAdapterError> {
        self.calls.lock().await.push(area_code.to_string());
        controller.checkpoint_or_abort().await?;

        match self.scripts.get(area_code) {
            Some(AreaScript::Succeed { listings, stats }) => {
                for change in listings {
                    controller.checkpoint_or_abort().await?;
                    reporter.log_listing_change(change.clone()).await;
                }
                Ok(stats.clone())
            }
            Some(AreaScript::Fail(kind)) => {
                reporter
                    .log_error(IssueInfo {
                        scraper: "mock".into(),
                        area: area_code.into(),
                        url: None,
                        building_name: None,
                        price_man_yen: None,
                        reason: "mock_failure".into(),
                        error_detail: format!("{kind:?}"),
                    })
                    .await;
                Err(kind.clone().into())
            }
            Some(AreaScript::HangUntilCancelled) => loop {
                controller.checkpoint_or_abort().await?;
                tokio::time::sleep(Duration::from_millis(10)).await;
            },
            None => Ok(self.default_stats.clone()),
        }
    }
}
