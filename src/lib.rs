//! chintai-orchestrator - control plane for scheduling and supervising
//! Japanese real-estate listing scrapes.
//!
//! Hexagonal layout: `domain` holds the entities and port traits a scraping
//! run is defined in terms of; `adapters` implements those ports against
//! SQLite and a scriptable mock scraper; `services` is the application layer
//! (the task engine, scheduler, stall detector, and the control operations a
//! caller drives); `infrastructure` is the ambient stack (config loading,
//! structured logging, audit trail) every layer above depends on.

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;
