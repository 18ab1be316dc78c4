//! Domain errors for the scraping control plane.

use thiserror::Error;

/// Error category surfaced to callers and mirrored into log-entry `reason`
/// fields, matching the vocabulary operators already see in task logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    DatabaseInitError,
    ModuleImportError,
    ConnectionRefused,
    Timeout,
    PermissionDenied,
    ExecutionError,
    UnexpectedError,
    Stalled,
    InvalidArgument,
    InvalidState,
    Conflict,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DatabaseInitError => "database_init_error",
            Self::ModuleImportError => "module_import_error",
            Self::ConnectionRefused => "connection_refused",
            Self::Timeout => "timeout",
            Self::PermissionDenied => "permission_denied",
            Self::ExecutionError => "execution_error",
            Self::UnexpectedError => "unexpected_error",
            Self::Stalled => "stalled",
            Self::InvalidArgument => "invalid_argument",
            Self::InvalidState => "invalid_state",
            Self::Conflict => "conflict",
        }
    }
}

/// Domain-level errors that can occur in the orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("schedule not found: {0}")]
    ScheduleNotFound(String),

    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("task id already exists: {0}")]
    DuplicateTaskId(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("adapter unavailable: {0}")]
    ModuleImportError(String),

    #[error("cancelled")]
    Cancelled,

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

pub type DomainResult<T> = Result<T, OrchestratorError>;

impl OrchestratorError {
    /// Maps this error onto the fixed §7 error-category vocabulary.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::TaskNotFound(_) | Self::ScheduleNotFound(_) => ErrorCategory::InvalidArgument,
            Self::InvalidStateTransition { .. } | Self::InvalidState(_) => {
                ErrorCategory::InvalidState
            }
            Self::InvalidArgument(_) | Self::DuplicateTaskId(_) => ErrorCategory::InvalidArgument,
            Self::Conflict(_) => ErrorCategory::Conflict,
            Self::Database(_) => ErrorCategory::DatabaseInitError,
            Self::Serialization(_) => ErrorCategory::UnexpectedError,
            Self::ModuleImportError(_) => ErrorCategory::ModuleImportError,
            Self::Cancelled => ErrorCategory::ExecutionError,
            Self::Unexpected(_) => ErrorCategory::UnexpectedError,
        }
    }
}

impl From<sqlx::Error> for OrchestratorError {
    fn from(err: sqlx::Error) -> Self {
        OrchestratorError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::Serialization(err.to_string())
    }
}
