//! File source: directory scan with glob filtering, incremental
//! checkpoints, and encoding transcoding to UTF-8.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use intake_core::{sha256_hex, IntakeError, RawPayload};
use intake_validate::encoding;

use crate::checkpoint::CheckpointStore;
use crate::{config_err, SourceAdapter};

const DEFAULT_PATTERN: &str = "*.csv";
const DEFAULT_STATE_PATH: &str = ".state/file_index.json";
const DEFAULT_MAX_SIZE_BYTES: u64 = 5 * 1024 * 1024;

/// Incremental scan strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incremental {
    Mtime,
    Checksum,
}

/// Parameter map for a file source.
#[derive(Debug, Clone, Deserialize)]
pub struct FileParams {
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub incremental: Option<String>,
    #[serde(default)]
    pub max_size_bytes: Option<u64>,
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
    #[serde(default)]
    pub state_path: Option<String>,
}

impl FileParams {
    pub fn parse(params: &Value) -> Result<FileParams, IntakeError> {
        let parsed: FileParams = serde_json::from_value(params.clone())
            .map_err(|e| config_err(format!("invalid file source params: {e}")))?;
        if parsed.directory.as_deref().unwrap_or("").is_empty() {
            return Err(config_err("file source requires 'directory'"));
        }
        parsed.strategy()?;
        Ok(parsed)
    }

    fn strategy(&self) -> Result<Incremental, IntakeError> {
        match self.incremental.as_deref().unwrap_or("mtime") {
            "mtime" => Ok(Incremental::Mtime),
            "checksum" => Ok(Incremental::Checksum),
            other => Err(config_err(format!("invalid incremental mode: {other}"))),
        }
    }
}

/// Reads files from a directory with incremental checkpoints.
pub struct FileSource {
    params: FileParams,
    strategy: Incremental,
    checkpoints: Mutex<CheckpointStore>,
}

impl FileSource {
    pub fn from_params(params: &Value) -> Result<Self, IntakeError> {
        let params = FileParams::parse(params)?;
        let strategy = params.strategy()?;
        let state_path = params
            .state_path
            .clone()
            .unwrap_or_else(|| DEFAULT_STATE_PATH.to_string());
        Ok(Self {
            params,
            strategy,
            checkpoints: Mutex::new(CheckpointStore::open(state_path)),
        })
    }

    fn extension_allowed(&self, path: &Path) -> bool {
        let Some(allowed) = &self.params.extensions else {
            return true;
        };
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        allowed
            .iter()
            .any(|a| normalize_extension(a) == ext)
    }
}

#[async_trait]
impl SourceAdapter for FileSource {
    async fn fetch(&self) -> Result<Vec<RawPayload>, IntakeError> {
        let directory = PathBuf::from(self.params.directory.as_deref().unwrap_or_default());
        if !directory.is_dir() {
            return Err(config_err(format!(
                "directory {} does not exist",
                directory.display()
            )));
        }
        let pattern = self.params.pattern.as_deref().unwrap_or(DEFAULT_PATTERN);
        let max_size = self.params.max_size_bytes.unwrap_or(DEFAULT_MAX_SIZE_BYTES);

        let mut entries: Vec<PathBuf> = WalkDir::new(&directory)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();
        entries.sort();

        let mut checkpoints = self
            .checkpoints
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut payloads = Vec::new();

        for path in entries {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !glob_match::glob_match(pattern, &name) {
                continue;
            }
            let size = file_len(&path)?;
            if size > max_size {
                debug!(file = %path.display(), size, "skipping oversized file");
                continue;
            }
            if !self.extension_allowed(&path) {
                continue;
            }

            // Incremental skip: mtime is checked before reading; checksum
            // requires the current content.
            if self.strategy == Incremental::Mtime && checkpoints.is_seen_mtime(&path) {
                continue;
            }
            let raw = read_bytes(&path)?;
            let raw_checksum = sha256_hex(&raw);
            if self.strategy == Incremental::Checksum
                && checkpoints.is_seen_checksum(&path, &raw_checksum)
            {
                continue;
            }

            let (text, detected) = encoding::decode(&raw);
            let body = text.into_bytes();
            let checksum = sha256_hex(&body);
            let suffix = path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_else(|| "plain".to_string());
            payloads.push(RawPayload {
                body,
                content_type: Some(format!("text/{suffix}; charset=utf-8")),
                uri: Some(path.display().to_string()),
                status_code: Some(200),
                encoding: Some(detected.to_string()),
                checksum: Some(checksum),
                ..Default::default()
            });

            match self.strategy {
                Incremental::Mtime => checkpoints.record_mtime(&path),
                Incremental::Checksum => checkpoints.record_checksum(&path, &raw_checksum),
            }
        }

        checkpoints.save()?;
        Ok(payloads)
    }
}

// Files can vanish or become unreadable between the directory scan and
// the read; the next attempt simply rescans.
fn file_len(path: &Path) -> Result<u64, IntakeError> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| IntakeError::Retryable(format!("failed to stat {}: {e}", path.display())))
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, IntakeError> {
    std::fs::read(path)
        .map_err(|e| IntakeError::Retryable(format!("failed to read {}: {e}", path.display())))
}

fn normalize_extension(ext: &str) -> String {
    let lowered = ext.to_lowercase();
    if lowered.starts_with('.') {
        lowered
    } else {
        format!(".{lowered}")
    }
}
