//! Run/record repository backed by SQLite through sqlx.
//!
//! The pool is capped at a single connection: every statement, including
//! the admission check-and-insert, serializes through it, which is what
//! makes "at most one active run per source" hold under concurrent
//! triggers from the scheduler and manual callers.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use intake_core::model::{NewRecord, NewSource, Record, Run, RunEvent, RunMetrics, Source};
use intake_core::{IntakeError, RunStatus, SourceType};

fn db_err(e: sqlx::Error) -> IntakeError {
    IntakeError::Storage(format!("database error: {e}"))
}

/// Persistent store for sources, runs, records, and run events.
#[derive(Clone)]
pub struct RunStore {
    pool: SqlitePool,
}

impl RunStore {
    /// Open (and create if missing) the store at the given path.
    pub async fn open(path: &Path) -> Result<Self, IntakeError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        Self::connect(options).await
    }

    /// In-memory store for tests.
    pub async fn memory() -> Result<Self, IntakeError> {
        Self::connect(SqliteConnectOptions::new().in_memory(true)).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self, IntakeError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(db_err)?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), IntakeError> {
        const SCHEMA: &[&str] = &[
            r#"CREATE TABLE IF NOT EXISTS sources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                source_type TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                params TEXT NOT NULL,
                schedule TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                source_id INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING',
                message TEXT,
                error_code TEXT,
                error_message TEXT,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                records_count INTEGER NOT NULL DEFAULT 0,
                bytes_total INTEGER NOT NULL DEFAULT 0,
                duration_ms INTEGER NOT NULL DEFAULT 0,
                cancellation_requested INTEGER NOT NULL DEFAULT 0
            )"#,
            "CREATE INDEX IF NOT EXISTS idx_runs_source_status ON runs (source_id, status)",
            r#"CREATE TABLE IF NOT EXISTS records (
                record_id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                source_id INTEGER NOT NULL,
                ingest_time TEXT NOT NULL,
                format TEXT NOT NULL,
                raw_size INTEGER NOT NULL,
                payload TEXT NOT NULL,
                payload_path TEXT,
                checksum TEXT NOT NULL,
                validation_status TEXT NOT NULL,
                validation_message TEXT,
                error_code TEXT,
                validation_details TEXT,
                content_type TEXT,
                source_uri TEXT,
                status_code INTEGER,
                row_count INTEGER,
                columns TEXT,
                metadata TEXT
            )"#,
            "CREATE INDEX IF NOT EXISTS idx_records_run ON records (run_id)",
            r#"CREATE TABLE IF NOT EXISTS run_events (
                event_id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                ts TEXT NOT NULL,
                stage TEXT NOT NULL,
                event_type TEXT NOT NULL,
                message TEXT NOT NULL,
                error_code TEXT
            )"#,
            "CREATE INDEX IF NOT EXISTS idx_events_run ON run_events (run_id)",
        ];
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    // ── Sources ───────────────────────────────────────────────

    /// Insert a source row (seeding/tests; source CRUD proper lives
    /// outside the core).
    pub async fn insert_source(&self, source: &NewSource) -> Result<i64, IntakeError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO sources (name, source_type, enabled, params, schedule, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        )
        .bind(&source.name)
        .bind(source.source_type.as_str())
        .bind(source.enabled)
        .bind(source.params.to_string())
        .bind(source.schedule.as_ref().map(|s| s.to_string()))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_source(&self, source_id: i64) -> Result<Option<Source>, IntakeError> {
        let row = sqlx::query("SELECT * FROM sources WHERE id = ?1")
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| source_from_row(&r)).transpose()
    }

    pub async fn list_enabled_sources(&self) -> Result<Vec<Source>, IntakeError> {
        let rows = sqlx::query("SELECT * FROM sources WHERE enabled = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(source_from_row).collect()
    }

    pub async fn list_scheduled_sources(&self) -> Result<Vec<Source>, IntakeError> {
        let rows =
            sqlx::query("SELECT * FROM sources WHERE enabled = 1 AND schedule IS NOT NULL ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
        rows.iter().map(source_from_row).collect()
    }

    pub async fn set_source_enabled(&self, source_id: i64, enabled: bool) -> Result<(), IntakeError> {
        sqlx::query("UPDATE sources SET enabled = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(source_id)
            .bind(enabled)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // ── Run admission & lifecycle ─────────────────────────────

    /// Atomic admission: source-enabled check, active-run check, and the
    /// PENDING insert happen in one transaction on the single connection,
    /// so two concurrent triggers cannot both see "no active run".
    pub async fn create_run_admission(
        &self,
        run_id: &str,
        source_id: i64,
        allow_queue_on_busy: bool,
    ) -> Result<Run, IntakeError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let source = sqlx::query("SELECT id FROM sources WHERE id = ?1 AND enabled = 1")
            .bind(source_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        if source.is_none() {
            return Err(IntakeError::SourceNotFound(format!(
                "source {source_id} not found or disabled"
            )));
        }

        let active = sqlx::query(
            "SELECT run_id FROM runs WHERE source_id = ?1 AND status IN ('PENDING', 'RUNNING') LIMIT 1",
        )
        .bind(source_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        if active.is_some() && !allow_queue_on_busy {
            return Err(IntakeError::SourceBusy(format!(
                "source {source_id} has an active run"
            )));
        }

        let started_at = Utc::now();
        sqlx::query(
            "INSERT INTO runs (run_id, source_id, status, started_at) VALUES (?1, ?2, 'PENDING', ?3)",
        )
        .bind(run_id)
        .bind(source_id)
        .bind(started_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        Ok(Run {
            run_id: run_id.to_string(),
            source_id,
            status: RunStatus::Pending,
            message: None,
            error_code: None,
            error_message: None,
            started_at,
            finished_at: None,
            records_count: 0,
            bytes_total: 0,
            duration_ms: 0,
            cancellation_requested: false,
        })
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<Run>, IntakeError> {
        let row = sqlx::query("SELECT * FROM runs WHERE run_id = ?1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| run_from_row(&r)).transpose()
    }

    /// Mark a run RUNNING, resetting error fields and counters. The caller
    /// is responsible for having validated the transition.
    pub async fn mark_run_started(&self, run_id: &str) -> Result<(), IntakeError> {
        sqlx::query(
            "UPDATE runs SET status = 'RUNNING', error_code = NULL, error_message = NULL,
             records_count = 0, bytes_total = 0, duration_ms = 0 WHERE run_id = ?1",
        )
        .bind(run_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Write the terminal status and summary counters in one UPDATE.
    pub async fn finalize_run(
        &self,
        run_id: &str,
        status: RunStatus,
        error_code: Option<&str>,
        error_message: Option<&str>,
        metrics: &RunMetrics,
    ) -> Result<(), IntakeError> {
        let finished_at = metrics.finished_at.unwrap_or_else(Utc::now);
        sqlx::query(
            "UPDATE runs SET status = ?2, error_code = ?3, error_message = ?4,
             records_count = ?5, bytes_total = ?6, duration_ms = ?7, finished_at = ?8
             WHERE run_id = ?1",
        )
        .bind(run_id)
        .bind(status.as_str())
        .bind(error_code)
        .bind(error_message)
        .bind(metrics.records_count)
        .bind(metrics.bytes_total)
        .bind(metrics.duration_ms())
        .bind(finished_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Override a run's started_at. Admission stamps the current time;
    /// this exists for sweep and retention tests that need aged runs.
    pub async fn set_run_started_at(
        &self,
        run_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<(), IntakeError> {
        sqlx::query("UPDATE runs SET started_at = ?2 WHERE run_id = ?1")
            .bind(run_id)
            .bind(started_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn set_run_message(&self, run_id: &str, message: &str) -> Result<(), IntakeError> {
        sqlx::query("UPDATE runs SET message = ?2 WHERE run_id = ?1")
            .bind(run_id)
            .bind(message)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Set the cooperative cancellation flag on a non-terminal run.
    /// Returns false when the run is missing or already terminal.
    pub async fn request_cancel(&self, run_id: &str) -> Result<bool, IntakeError> {
        let result = sqlx::query(
            "UPDATE runs SET cancellation_requested = 1
             WHERE run_id = ?1 AND status IN ('PENDING', 'RUNNING')",
        )
        .bind(run_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn cancellation_requested(&self, run_id: &str) -> Result<bool, IntakeError> {
        let row = sqlx::query("SELECT cancellation_requested FROM runs WHERE run_id = ?1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(|r| r.get::<bool, _>(0)).unwrap_or(false))
    }

    // ── Queue & sweep queries ─────────────────────────────────

    pub async fn has_running(&self, source_id: i64) -> Result<bool, IntakeError> {
        let row = sqlx::query(
            "SELECT run_id FROM runs WHERE source_id = ?1 AND status = 'RUNNING' LIMIT 1",
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.is_some())
    }

    /// Oldest PENDING run for a source (FIFO by started_at).
    pub async fn next_pending(&self, source_id: i64) -> Result<Option<Run>, IntakeError> {
        let row = sqlx::query(
            "SELECT * FROM runs WHERE source_id = ?1 AND status = 'PENDING'
             ORDER BY started_at ASC LIMIT 1",
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(|r| run_from_row(&r)).transpose()
    }

    pub async fn running_runs(&self) -> Result<Vec<Run>, IntakeError> {
        let rows = sqlx::query("SELECT * FROM runs WHERE status = 'RUNNING'")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(run_from_row).collect()
    }

    /// PENDING runs admitted before the cutoff (stale, never dispatched).
    pub async fn stale_pending_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Run>, IntakeError> {
        let rows =
            sqlx::query("SELECT * FROM runs WHERE status = 'PENDING' AND started_at < ?1")
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
        rows.iter().map(run_from_row).collect()
    }

    pub async fn count_by_status(&self, status: RunStatus) -> Result<i64, IntakeError> {
        let row = sqlx::query("SELECT COUNT(*) FROM runs WHERE status = ?1")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.get(0))
    }

    /// Pending-run depth per source id.
    pub async fn pending_depth_by_source(
        &self,
    ) -> Result<std::collections::BTreeMap<i64, i64>, IntakeError> {
        let rows = sqlx::query(
            "SELECT source_id, COUNT(*) AS depth FROM runs WHERE status = 'PENDING' GROUP BY source_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<i64, _>("source_id"), r.get::<i64, _>("depth")))
            .collect())
    }

    // ── Retention queries ─────────────────────────────────────

    pub async fn run_ids_started_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<String>, IntakeError> {
        let rows = sqlx::query("SELECT run_id FROM runs WHERE started_at < ?1")
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.iter().map(|r| r.get("run_id")).collect())
    }

    pub async fn source_ids_with_runs(&self) -> Result<Vec<i64>, IntakeError> {
        let rows = sqlx::query("SELECT DISTINCT source_id FROM runs")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.iter().map(|r| r.get("source_id")).collect())
    }

    /// Run ids beyond the N most-recently-started for a source.
    pub async fn run_ids_beyond_count(
        &self,
        source_id: i64,
        keep: usize,
    ) -> Result<Vec<String>, IntakeError> {
        let rows = sqlx::query(
            "SELECT run_id FROM runs WHERE source_id = ?1
             ORDER BY started_at DESC LIMIT -1 OFFSET ?2",
        )
        .bind(source_id)
        .bind(keep as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(|r| r.get("run_id")).collect())
    }

    pub async fn payload_paths_for_runs(
        &self,
        run_ids: &[String],
    ) -> Result<Vec<String>, IntakeError> {
        let mut paths = Vec::new();
        for run_id in run_ids {
            let rows = sqlx::query(
                "SELECT payload_path FROM records WHERE run_id = ?1 AND payload_path IS NOT NULL",
            )
            .bind(run_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            paths.extend(rows.iter().map(|r| r.get::<String, _>("payload_path")));
        }
        Ok(paths)
    }

    /// Delete runs with their records and events. Children are deleted
    /// before the parent run so no orphaned rows survive a partial sweep.
    pub async fn delete_runs(&self, run_ids: &[String]) -> Result<u64, IntakeError> {
        if run_ids.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut deleted = 0u64;
        for run_id in run_ids {
            sqlx::query("DELETE FROM records WHERE run_id = ?1")
                .bind(run_id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            sqlx::query("DELETE FROM run_events WHERE run_id = ?1")
                .bind(run_id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            let result = sqlx::query("DELETE FROM runs WHERE run_id = ?1")
                .bind(run_id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            deleted += result.rows_affected();
        }
        tx.commit().await.map_err(db_err)?;
        Ok(deleted)
    }

    // ── Records ───────────────────────────────────────────────

    pub async fn insert_records(&self, records: &[NewRecord]) -> Result<usize, IntakeError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for record in records {
            sqlx::query(
                "INSERT INTO records (run_id, source_id, ingest_time, format, raw_size, payload,
                 payload_path, checksum, validation_status, validation_message, error_code,
                 validation_details, content_type, source_uri, status_code, row_count, columns, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            )
            .bind(&record.run_id)
            .bind(record.source_id)
            .bind(Utc::now())
            .bind(record.format.as_str())
            .bind(record.raw_size)
            .bind(String::from_utf8_lossy(&record.payload).into_owned())
            .bind(&record.payload_path)
            .bind(&record.checksum)
            .bind(record.validation_status.as_str())
            .bind(&record.validation_message)
            .bind(&record.validation_code)
            .bind(record.validation_details.to_string())
            .bind(&record.content_type)
            .bind(&record.source_uri)
            .bind(record.status_code)
            .bind(record.row_count)
            .bind(&record.columns)
            .bind(&record.metadata)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(records.len())
    }

    pub async fn records_for_run(&self, run_id: &str) -> Result<Vec<Record>, IntakeError> {
        let rows = sqlx::query("SELECT * FROM records WHERE run_id = ?1 ORDER BY record_id")
            .bind(run_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.iter().map(record_from_row).collect())
    }

    // ── Run events ────────────────────────────────────────────

    pub async fn insert_event(
        &self,
        run_id: &str,
        stage: &str,
        event_type: &str,
        message: &str,
        error_code: Option<&str>,
    ) -> Result<(), IntakeError> {
        sqlx::query(
            "INSERT INTO run_events (run_id, ts, stage, event_type, message, error_code)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(run_id)
        .bind(Utc::now())
        .bind(stage)
        .bind(event_type)
        .bind(message)
        .bind(error_code)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn events_for_run(&self, run_id: &str) -> Result<Vec<RunEvent>, IntakeError> {
        let rows = sqlx::query("SELECT * FROM run_events WHERE run_id = ?1 ORDER BY event_id")
            .bind(run_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.iter().map(event_from_row).collect())
    }
}

// ── Row mapping ───────────────────────────────────────────────

fn run_from_row(row: &SqliteRow) -> Result<Run, IntakeError> {
    let status_text: String = row.get("status");
    let status = RunStatus::parse(&status_text)
        .ok_or_else(|| IntakeError::Storage(format!("unknown run status: {status_text}")))?;
    Ok(Run {
        run_id: row.get("run_id"),
        source_id: row.get("source_id"),
        status,
        message: row.get("message"),
        error_code: row.get("error_code"),
        error_message: row.get("error_message"),
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
        records_count: row.get("records_count"),
        bytes_total: row.get("bytes_total"),
        duration_ms: row.get("duration_ms"),
        cancellation_requested: row.get("cancellation_requested"),
    })
}

fn source_from_row(row: &SqliteRow) -> Result<Source, IntakeError> {
    let type_text: String = row.get("source_type");
    let source_type = SourceType::parse(&type_text)
        .ok_or_else(|| IntakeError::Storage(format!("unknown source type: {type_text}")))?;
    let params_text: String = row.get("params");
    let params = serde_json::from_str(&params_text).unwrap_or(serde_json::Value::Null);
    let schedule = row
        .get::<Option<String>, _>("schedule")
        .and_then(|s| serde_json::from_str(&s).ok());
    Ok(Source {
        id: row.get("id"),
        name: row.get("name"),
        source_type,
        enabled: row.get("enabled"),
        params,
        schedule,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn record_from_row(row: &SqliteRow) -> Record {
    Record {
        record_id: row.get("record_id"),
        run_id: row.get("run_id"),
        source_id: row.get("source_id"),
        ingest_time: row.get("ingest_time"),
        format: row.get("format"),
        raw_size: row.get("raw_size"),
        payload: row.get("payload"),
        payload_path: row.get("payload_path"),
        checksum: row.get("checksum"),
        validation_status: row.get("validation_status"),
        validation_message: row.get("validation_message"),
        error_code: row.get("error_code"),
        validation_details: row.get("validation_details"),
        content_type: row.get("content_type"),
        source_uri: row.get("source_uri"),
        status_code: row.get("status_code"),
        row_count: row.get("row_count"),
        columns: row.get("columns"),
        metadata: row.get("metadata"),
    }
}

fn event_from_row(row: &SqliteRow) -> RunEvent {
    RunEvent {
        event_id: row.get("event_id"),
        run_id: row.get("run_id"),
        ts: row.get("ts"),
        stage: row.get("stage"),
        event_type: row.get("event_type"),
        message: row.get("message"),
        error_code: row.get("error_code"),
    }
}
