//! File-scan checkpoints: per-file mtime or content checksum, persisted as
//! JSON so incremental scans survive process restarts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use intake_core::IntakeError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CheckpointState {
    mtime: HashMap<String, i64>,
    checksum: HashMap<String, String>,
}

/// JSON-backed index of processed files. Loaded on construct; callers save
/// explicitly after a mutating batch. One instance per file source keeps
/// concurrent writers out (the one-run-per-source invariant).
pub struct CheckpointStore {
    path: PathBuf,
    state: CheckpointState,
}

impl CheckpointStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "corrupt checkpoint index, starting fresh");
                CheckpointState::default()
            }),
            Err(_) => CheckpointState::default(),
        };
        Self { path, state }
    }

    pub fn save(&self) -> Result<(), IntakeError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(&self.state)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Whether the file's recorded mtime is at least as new as its current
    /// mtime (nothing changed since the last scan).
    pub fn is_seen_mtime(&self, file: &Path) -> bool {
        let Some(recorded) = self.state.mtime.get(&key(file)) else {
            return false;
        };
        match current_mtime(file) {
            Some(current) => *recorded >= current,
            None => false,
        }
    }

    pub fn record_mtime(&mut self, file: &Path) {
        if let Some(mtime) = current_mtime(file) {
            self.state.mtime.insert(key(file), mtime);
        }
    }

    /// Whether the recorded content checksum matches the given one.
    pub fn is_seen_checksum(&self, file: &Path, current: &str) -> bool {
        self.state
            .checksum
            .get(&key(file))
            .map(|recorded| recorded == current)
            .unwrap_or(false)
    }

    pub fn record_checksum(&mut self, file: &Path, checksum: &str) {
        self.state.checksum.insert(key(file), checksum.to_string());
    }
}

fn key(file: &Path) -> String {
    file.to_string_lossy().into_owned()
}

fn current_mtime(file: &Path) -> Option<i64> {
    let modified = std::fs::metadata(file).ok()?.modified().ok()?;
    let since_epoch = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
    Some(since_epoch.as_secs() as i64)
}
