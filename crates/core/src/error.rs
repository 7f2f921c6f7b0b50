use thiserror::Error;

use crate::model::RunStatus;

/// Machine-readable codes persisted on runs and records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Unknown,
    SourceNotFound,
    SourceBusy,
    AdapterConfig,
    AdapterRuntime,
    Retryable,
    ValidationFailed,
    StorageFailed,
    Timeout,
    Canceled,
    InvalidTransition,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unknown => "UNKNOWN",
            ErrorCode::SourceNotFound => "SOURCE_NOT_FOUND",
            ErrorCode::SourceBusy => "SOURCE_BUSY",
            ErrorCode::AdapterConfig => "ADAPTER_CONFIG",
            ErrorCode::AdapterRuntime => "ADAPTER_RUNTIME",
            ErrorCode::Retryable => "RETRYABLE",
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::StorageFailed => "STORAGE_FAILED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Canceled => "CANCELED",
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error taxonomy for the ingestion core.
///
/// The variants form a small fixed set of kinds carried explicitly through
/// return values: configuration problems are never retried, `Retryable` is
/// the only variant the retry controller re-attempts, and
/// `InvalidTransition` marks a logic bug rather than a runtime condition.
#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("source not found: {0}")]
    SourceNotFound(String),

    #[error("source busy: {0}")]
    SourceBusy(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("retryable error: {0}")]
    Retryable(String),

    #[error("adapter error: {0}")]
    Adapter(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("run timed out: {0}")]
    Timeout(String),

    #[error("run canceled: {0}")]
    Canceled(String),

    #[error("invalid run transition: {from} -> {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl IntakeError {
    /// Code persisted as the run/record error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            IntakeError::SourceNotFound(_) => ErrorCode::SourceNotFound,
            IntakeError::SourceBusy(_) => ErrorCode::SourceBusy,
            IntakeError::Configuration(_) => ErrorCode::AdapterConfig,
            IntakeError::Retryable(_) => ErrorCode::Retryable,
            IntakeError::Adapter(_) => ErrorCode::AdapterRuntime,
            IntakeError::Validation(_) => ErrorCode::ValidationFailed,
            IntakeError::Storage(_) | IntakeError::Io(_) => ErrorCode::StorageFailed,
            IntakeError::Timeout(_) => ErrorCode::Timeout,
            IntakeError::Canceled(_) => ErrorCode::Canceled,
            IntakeError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            IntakeError::Serialize(_) => ErrorCode::Unknown,
        }
    }

    /// Whether a repeat attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IntakeError::Retryable(_))
    }
}
