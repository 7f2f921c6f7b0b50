//! Domain model for sources, runs, payloads, and persisted records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Run lifecycle ─────────────────────────────────────────────

/// Lifecycle status of an ingestion run. `Pending` is the only initial
/// state; `Success`, `Failed`, and `Canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Running => "RUNNING",
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
            RunStatus::Canceled => "CANCELED",
        }
    }

    pub fn parse(s: &str) -> Option<RunStatus> {
        match s {
            "PENDING" => Some(RunStatus::Pending),
            "RUNNING" => Some(RunStatus::Running),
            "SUCCESS" => Some(RunStatus::Success),
            "FAILED" => Some(RunStatus::Failed),
            "CANCELED" => Some(RunStatus::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Failed | RunStatus::Canceled
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Sources ───────────────────────────────────────────────────

/// Kind of origin a source pulls from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    HttpApi,
    File,
    Sqlite,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::HttpApi => "HTTP_API",
            SourceType::File => "FILE",
            SourceType::Sqlite => "SQLITE",
        }
    }

    pub fn parse(s: &str) -> Option<SourceType> {
        match s {
            "HTTP_API" => Some(SourceType::HttpApi),
            "FILE" => Some(SourceType::File),
            "SQLITE" => Some(SourceType::Sqlite),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured origin. Owned by configuration management; the core reads
/// it and only the `enabled` flag gates admission.
#[derive(Debug, Clone)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub source_type: SourceType,
    pub enabled: bool,
    /// Adapter-specific parameter map (opaque to the core).
    pub params: serde_json::Value,
    /// Optional schedule, e.g. `{"interval_seconds": 300}`.
    pub schedule: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Source {
    /// Interval in seconds if this source has a usable schedule.
    pub fn schedule_interval_seconds(&self) -> Option<i64> {
        self.schedule
            .as_ref()
            .and_then(|s| s.get("interval_seconds"))
            .and_then(|v| v.as_i64())
            .filter(|v| *v > 0)
    }
}

/// Insert shape for seeding sources (CRUD proper is an external surface).
#[derive(Debug, Clone)]
pub struct NewSource {
    pub name: String,
    pub source_type: SourceType,
    pub enabled: bool,
    pub params: serde_json::Value,
    pub schedule: Option<serde_json::Value>,
}

// ── Runs ──────────────────────────────────────────────────────

/// One ingestion attempt for one source.
#[derive(Debug, Clone)]
pub struct Run {
    pub run_id: String,
    pub source_id: i64,
    pub status: RunStatus,
    pub message: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub records_count: i64,
    pub bytes_total: i64,
    pub duration_ms: i64,
    pub cancellation_requested: bool,
}

/// Write-once-per-finalization run summary counters.
#[derive(Debug, Clone, Default)]
pub struct RunMetrics {
    pub records_count: i64,
    pub bytes_total: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunMetrics {
    pub fn started_now() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn add_payload(&mut self, body: &[u8]) {
        self.records_count += 1;
        self.bytes_total += body.len() as i64;
    }

    pub fn duration_ms(&self) -> i64 {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0),
            _ => 0,
        }
    }
}

// ── Payloads & records ────────────────────────────────────────

/// Classified payload format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadFormat {
    Json,
    Csv,
    Text,
    Unknown,
}

impl PayloadFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadFormat::Json => "JSON",
            PayloadFormat::Csv => "CSV",
            PayloadFormat::Text => "TEXT",
            PayloadFormat::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of structural validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStatus {
    Passed,
    Failed,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Passed => "PASSED",
            ValidationStatus::Failed => "FAILED",
        }
    }
}

/// Ephemeral, in-memory result of one adapter fetch call. Consumed by the
/// record builder; never persisted in this shape.
#[derive(Debug, Clone, Default)]
pub struct RawPayload {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub uri: Option<String>,
    pub status_code: Option<i64>,
    pub row_count: Option<i64>,
    pub columns: Option<Vec<String>>,
    pub encoding: Option<String>,
    pub checksum: Option<String>,
}

/// A normalized record ready for persistence. Exactly one of
/// `payload`/`payload_path` ends up populated, selected by storage mode.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub run_id: String,
    pub source_id: i64,
    pub format: PayloadFormat,
    pub raw_size: i64,
    pub payload: Vec<u8>,
    pub payload_path: Option<String>,
    pub checksum: String,
    pub validation_status: ValidationStatus,
    pub validation_message: String,
    pub validation_code: String,
    pub validation_details: serde_json::Value,
    pub content_type: Option<String>,
    pub source_uri: Option<String>,
    pub status_code: Option<i64>,
    pub row_count: Option<i64>,
    pub columns: Option<String>,
    pub metadata: Option<String>,
}

/// A persisted record row.
#[derive(Debug, Clone)]
pub struct Record {
    pub record_id: i64,
    pub run_id: String,
    pub source_id: i64,
    pub ingest_time: DateTime<Utc>,
    pub format: String,
    pub raw_size: i64,
    pub payload: String,
    pub payload_path: Option<String>,
    pub checksum: String,
    pub validation_status: String,
    pub validation_message: Option<String>,
    pub error_code: Option<String>,
    pub validation_details: Option<String>,
    pub content_type: Option<String>,
    pub source_uri: Option<String>,
    pub status_code: Option<i64>,
    pub row_count: Option<i64>,
    pub columns: Option<String>,
    pub metadata: Option<String>,
}

// ── Run events ────────────────────────────────────────────────

/// Audit trail entry for a run stage.
#[derive(Debug, Clone)]
pub struct RunEvent {
    pub event_id: i64,
    pub run_id: String,
    pub ts: DateTime<Utc>,
    pub stage: String,
    pub event_type: String,
    pub message: String,
    pub error_code: Option<String>,
}

/// Well-known run event types.
pub mod event_type {
    pub const RUN_STARTED: &str = "RUN_STARTED";
    pub const FETCH_STARTED: &str = "FETCH_STARTED";
    pub const FETCH_DONE: &str = "FETCH_DONE";
    pub const DETECT_DONE: &str = "DETECT_DONE";
    pub const VALIDATION_DONE: &str = "VALIDATION_DONE";
    pub const STORAGE_DONE: &str = "STORAGE_DONE";
    pub const RUN_SUCCESS: &str = "RUN_SUCCESS";
    pub const RUN_FAILED: &str = "RUN_FAILED";
    pub const RUN_CANCELED: &str = "RUN_CANCELED";
}

// ── Health snapshot ───────────────────────────────────────────

/// Periodic operator-facing counters emitted by the scheduler.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthSnapshot {
    pub running: i64,
    pub pending: i64,
    pub failed: i64,
    /// Pending-run depth per source id.
    pub queue_depth: BTreeMap<i64, i64>,
}
