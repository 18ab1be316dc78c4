//! Domain ports (interfaces) consumed by services and implemented by adapters.

pub mod clock;
pub mod schedule_store;
pub mod site_adapter;
pub mod task_store;

pub use clock::{Clock, SystemClock};
pub use schedule_store::{NewScheduleHistory, ScheduleStore};
pub use site_adapter::{
    Cancelled, ChangeKind, Controller, IssueInfo, ListingChange, ListingSink, Reporter,
    ScrapeOptions, SiteAdapter, SiteAdapterError, Stats, StatsUpdate,
};
pub use task_store::{ControlFlag, NewTask, TaskFilter, TaskStore};
