//! Infrastructure layer: configuration loading and structured logging.
//! The SQLite connection itself lives under `adapters::sqlite`, since it's a
//! port implementation rather than ambient plumbing.

pub mod config;
pub mod logging;
