//! Shared types for the intake ingestion service: configuration, the error
//! taxonomy, and the source/run/record domain model.

pub mod config;
pub mod error;
pub mod hash;
pub mod model;

pub use config::{Config, DedupeMode, RuntimePolicy, StorageMode};
pub use hash::sha256_hex;
pub use error::{ErrorCode, IntakeError};
pub use model::{
    HealthSnapshot, NewRecord, NewSource, PayloadFormat, RawPayload, Record, Run, RunEvent,
    RunMetrics, RunStatus, Source, SourceType, ValidationStatus,
};
