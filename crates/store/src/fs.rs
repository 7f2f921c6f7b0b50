//! Payload files on disk, one directory per run. Writes go through a
//! temp file in the target directory followed by a rename, so readers
//! never observe a partially written payload.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use intake_core::IntakeError;

/// Writes raw payload bodies under `base_dir/<run_id>/`.
#[derive(Debug, Clone)]
pub struct FileSystemStorage {
    base_dir: PathBuf,
}

impl FileSystemStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Write one payload and return its absolute path.
    pub fn write_payload(
        &self,
        run_id: &str,
        source_id: i64,
        seq: usize,
        body: &[u8],
        content_type: Option<&str>,
    ) -> Result<PathBuf, IntakeError> {
        let run_dir = self.base_dir.join(run_id);
        std::fs::create_dir_all(&run_dir)?;

        let ext = extension_for(content_type);
        let path = run_dir.join(format!("{source_id}_{seq}.{ext}"));
        let tmp = run_dir.join(format!(".{source_id}_{seq}.{ext}.tmp"));

        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(body)?;
        file.sync_all()?;
        std::fs::rename(&tmp, &path)?;

        debug!(path = %path.display(), bytes = body.len(), "wrote payload file");
        Ok(path)
    }

    /// Remove a payload file; missing files are not an error.
    pub fn remove(&self, path: &Path) -> Result<(), IntakeError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IntakeError::Io(e)),
        }
    }

    /// Remove a run's payload directory if it is now empty.
    pub fn remove_run_dir_if_empty(&self, run_id: &str) {
        let run_dir = self.base_dir.join(run_id);
        // Fails when non-empty or already gone, both fine.
        let _ = std::fs::remove_dir(run_dir);
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

fn extension_for(content_type: Option<&str>) -> &'static str {
    let ct = content_type.unwrap_or_default();
    if ct.contains("json") {
        "json"
    } else if ct.contains("csv") {
        "csv"
    } else if ct.starts_with("text/") {
        "txt"
    } else {
        "bin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_places_file_under_run_dir_with_extension() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSystemStorage::new(dir.path());

        let path = storage
            .write_payload("run-1", 7, 0, b"{\"a\":1}", Some("application/json"))
            .unwrap();
        assert!(path.ends_with("run-1/7_0.json"));
        assert_eq!(std::fs::read(&path).unwrap(), b"{\"a\":1}");

        // No temp file left behind.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("run-1"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn extension_follows_content_type() {
        assert_eq!(extension_for(Some("text/csv; charset=utf-8")), "csv");
        assert_eq!(extension_for(Some("text/plain")), "txt");
        assert_eq!(extension_for(Some("application/octet-stream")), "bin");
        assert_eq!(extension_for(None), "bin");
    }

    #[test]
    fn remove_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSystemStorage::new(dir.path());
        storage.remove(&dir.path().join("absent.json")).unwrap();
    }
}
