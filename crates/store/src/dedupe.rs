//! Payload-level dedupe: a persisted set of checksums already stored,
//! consulted before writing payload files.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

use intake_core::config::DedupeMode;
use intake_core::IntakeError;

/// JSON-file-backed set of payload checksums.
#[derive(Debug)]
pub struct DedupeIndex {
    path: PathBuf,
    seen: HashSet<String>,
}

impl DedupeIndex {
    /// Load the index; a missing or corrupt file starts fresh.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let seen = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Vec<String>>(&bytes) {
                Ok(list) => list.into_iter().collect(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "dedupe index unreadable, starting fresh");
                    HashSet::new()
                }
            },
            Err(_) => HashSet::new(),
        };
        Self { path, seen }
    }

    pub fn contains(&self, checksum: &str) -> bool {
        self.seen.contains(checksum)
    }

    pub fn insert(&mut self, checksum: &str) {
        self.seen.insert(checksum.to_string());
    }

    /// Persist via temp-file-and-rename, same as payload writes.
    pub fn save(&self) -> Result<(), IntakeError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut list: Vec<&String> = self.seen.iter().collect();
        list.sort();
        let bytes = serde_json::to_vec(&list)?;
        let tmp = self.path.with_extension("tmp");
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Shared dedupe decision point. In `Store` mode everything is stored;
/// in `Skip` mode a previously seen checksum keeps its record row but
/// no payload file is written.
pub struct DedupeGate {
    mode: DedupeMode,
    index: Mutex<DedupeIndex>,
}

impl DedupeGate {
    pub fn new(mode: DedupeMode, index_path: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            index: Mutex::new(DedupeIndex::open(index_path)),
        }
    }

    /// Whether a payload with this checksum should get a payload file.
    /// First sight of a checksum records it either way.
    pub fn should_store(&self, checksum: &str) -> Result<bool, IntakeError> {
        let mut index = self
            .index
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let first_sight = !index.contains(checksum);
        if first_sight {
            index.insert(checksum);
            index.save()?;
        }
        match self.mode {
            DedupeMode::Store => Ok(true),
            DedupeMode::Skip => Ok(first_sight),
        }
    }
}
