//! Domain layer: entities, ports, and errors for the scraping control plane.
//!
//! Framework-agnostic business logic — no sqlx, no tokio I/O, no tracing
//! subscriber wiring. Adapters and services depend on this layer, never the
//! other way around.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainResult, ErrorCategory, OrchestratorError};
