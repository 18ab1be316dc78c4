//! Adapters implementing the domain's ports against concrete infrastructure.

pub mod mock_site_adapter;
pub mod sqlite;

pub use mock_site_adapter::MockSiteAdapter;
