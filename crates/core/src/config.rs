use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"),
        Err(_) => default,
    }
}

// ── Storage knobs ─────────────────────────────────────────────

/// Where record payloads live: inline in the DB or on the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageMode {
    Db,
    File,
}

impl StorageMode {
    pub fn parse(s: &str) -> StorageMode {
        match s {
            "file" | "FILE" => StorageMode::File,
            _ => StorageMode::Db,
        }
    }
}

/// Whether file-mode storage skips payloads whose checksum was seen before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DedupeMode {
    Store,
    Skip,
}

impl DedupeMode {
    pub fn parse(s: &str) -> DedupeMode {
        match s {
            "skip" | "SKIP" => DedupeMode::Skip,
            _ => DedupeMode::Store,
        }
    }
}

// ── Runtime policy ────────────────────────────────────────────

/// Retry/timeout/queuing knobs for run execution. Read once at startup and
/// held immutable for the process lifetime.
#[derive(Debug, Clone, Copy)]
pub struct RuntimePolicy {
    pub allow_queue_on_busy: bool,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub run_timeout: Duration,
}

impl Default for RuntimePolicy {
    fn default() -> Self {
        Self {
            allow_queue_on_busy: true,
            max_retries: 2,
            retry_backoff: Duration::from_secs(2),
            run_timeout: Duration::from_secs(90),
        }
    }
}

// ── Top-level config ──────────────────────────────────────────

/// Application settings with defaults suitable for local runs.
/// Keys are read from the environment with an `INTAKE_` prefix.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite file backing the run/record store.
    pub db_path: PathBuf,
    /// Root directory for payload files and index state.
    pub data_dir: PathBuf,
    pub max_payload_size_bytes: usize,
    pub scheduler_interval: Duration,
    pub policy: RuntimePolicy,
    pub storage_mode: StorageMode,
    pub dedupe_mode: DedupeMode,
    pub retention_days: i64,
    pub max_runs_per_source: usize,
    pub stale_grace_minutes: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/intake.db"),
            data_dir: PathBuf::from("data"),
            max_payload_size_bytes: 5 * 1024 * 1024,
            scheduler_interval: Duration::from_secs(10),
            policy: RuntimePolicy::default(),
            storage_mode: StorageMode::Db,
            dedupe_mode: DedupeMode::Store,
            retention_days: 7,
            max_runs_per_source: 500,
            stale_grace_minutes: 60,
        }
    }
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        let policy = RuntimePolicy {
            allow_queue_on_busy: env_bool("INTAKE_ALLOW_QUEUE_ON_BUSY", true),
            max_retries: env_u32("INTAKE_MAX_RETRIES", 2),
            retry_backoff: Duration::from_secs(env_u64("INTAKE_RETRY_BACKOFF_SECONDS", 2)),
            run_timeout: Duration::from_secs(env_u64("INTAKE_RUN_TIMEOUT_SECONDS", 90)),
        };
        Self {
            db_path: PathBuf::from(env_or("INTAKE_DB_PATH", "data/intake.db")),
            data_dir: PathBuf::from(env_or("INTAKE_DATA_DIR", "data")),
            max_payload_size_bytes: env_u64("INTAKE_MAX_PAYLOAD_SIZE_BYTES", 5 * 1024 * 1024)
                as usize,
            scheduler_interval: Duration::from_secs(env_u64(
                "INTAKE_SCHEDULER_INTERVAL_SECONDS",
                10,
            )),
            policy,
            storage_mode: StorageMode::parse(&env_or("INTAKE_STORAGE_MODE", "db")),
            dedupe_mode: DedupeMode::parse(&env_or("INTAKE_DEDUPE_MODE", "store")),
            retention_days: env_u64("INTAKE_RETENTION_DAYS", 7) as i64,
            max_runs_per_source: env_u64("INTAKE_MAX_RUNS_PER_SOURCE", 500) as usize,
            stale_grace_minutes: env_u64("INTAKE_STALE_GRACE_MINUTES", 60) as i64,
        }
    }

    /// Directory payload files are written under in file storage mode.
    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    /// Directory for dedupe/checkpoint index state.
    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join("state")
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  db:         {}", self.db_path.display());
        tracing::info!("  data_dir:   {}", self.data_dir.display());
        tracing::info!(
            "  storage:    mode={:?}, dedupe={:?}, retention_days={}",
            self.storage_mode,
            self.dedupe_mode,
            self.retention_days
        );
        tracing::info!(
            "  runtime:    timeout={}s, retries={}, backoff={}s, queue_on_busy={}",
            self.policy.run_timeout.as_secs(),
            self.policy.max_retries,
            self.policy.retry_backoff.as_secs(),
            self.policy.allow_queue_on_busy
        );
        tracing::info!(
            "  scheduler:  interval={}s, stale_grace={}min",
            self.scheduler_interval.as_secs(),
            self.stale_grace_minutes
        );
    }
}
