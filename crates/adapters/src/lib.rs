//! Source adapters: one fetch capability over HTTP APIs, filesystem
//! directories, and SQLite databases.
//!
//! Each adapter owns its own parameter validation; missing or malformed
//! parameters surface as `IntakeError::Configuration` (never retried),
//! while transient runtime faults surface as `IntakeError::Retryable`.

pub mod checkpoint;
pub mod file;
pub mod http;
pub mod sqlite;

use async_trait::async_trait;

use intake_core::{IntakeError, RawPayload, Source, SourceType};

pub use checkpoint::CheckpointStore;
pub use file::FileSource;
pub use http::HttpApiSource;
pub use sqlite::SqliteSource;

/// Capability to pull a batch of raw payloads from a configured origin.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawPayload>, IntakeError>;
}

/// Build the adapter for a source, validating its parameter map.
pub fn adapter_for(source: &Source) -> Result<Box<dyn SourceAdapter>, IntakeError> {
    match source.source_type {
        SourceType::HttpApi => Ok(Box::new(HttpApiSource::from_params(&source.params)?)),
        SourceType::File => Ok(Box::new(FileSource::from_params(&source.params)?)),
        SourceType::Sqlite => Ok(Box::new(SqliteSource::from_params(&source.params)?)),
    }
}

/// Validate a source's parameter map without constructing the adapter.
/// Used by the pipeline as a pre-run configuration check.
pub fn validate_params(
    source_type: SourceType,
    params: &serde_json::Value,
) -> Result<(), IntakeError> {
    match source_type {
        SourceType::HttpApi => http::HttpParams::parse(params).map(|_| ()),
        SourceType::File => file::FileParams::parse(params).map(|_| ()),
        SourceType::Sqlite => sqlite::SqliteParams::parse(params).map(|_| ()),
    }
}

fn config_err(msg: impl Into<String>) -> IntakeError {
    IntakeError::Configuration(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validate_params_rejects_missing_required_fields() {
        let err = validate_params(SourceType::File, &json!({})).unwrap_err();
        assert!(matches!(err, IntakeError::Configuration(_)));
        assert!(validate_params(SourceType::File, &json!({"directory": "/tmp"})).is_ok());
    }
}
