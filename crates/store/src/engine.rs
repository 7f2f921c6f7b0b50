//! Storage engine: applies the storage mode and dedupe decision to a
//! batch of records before they are inserted.
//!
//! In `Db` mode payload bodies stay inline in the record row. In `File`
//! mode the body is written under the raw data directory and the row
//! keeps only the path. A deduplicated payload keeps its record row for
//! audit (checksum and metadata intact) but carries no body and no file.

use tracing::debug;

use intake_core::config::StorageMode;
use intake_core::model::NewRecord;
use intake_core::IntakeError;

use crate::dedupe::DedupeGate;
use crate::fs::FileSystemStorage;

pub struct StorageEngine {
    mode: StorageMode,
    fs: FileSystemStorage,
    dedupe: DedupeGate,
}

impl StorageEngine {
    pub fn new(mode: StorageMode, fs: FileSystemStorage, dedupe: DedupeGate) -> Self {
        Self { mode, fs, dedupe }
    }

    /// Resolve payload placement for each record in admission order.
    /// Returns the number of payloads skipped as duplicates.
    ///
    /// Dedupe gates file writes only: in `Db` mode every payload stays
    /// inline and the dedupe index is never consulted or mutated.
    pub fn place_payloads(&self, records: &mut [NewRecord]) -> Result<usize, IntakeError> {
        if self.mode == StorageMode::Db {
            for record in records.iter_mut() {
                record.payload_path = None;
            }
            return Ok(0);
        }

        let mut skipped = 0;
        for (seq, record) in records.iter_mut().enumerate() {
            if !self.dedupe.should_store(&record.checksum)? {
                debug!(
                    run_id = %record.run_id,
                    checksum = %record.checksum,
                    "duplicate payload, keeping record without body"
                );
                record.payload.clear();
                record.payload_path = None;
                skipped += 1;
                continue;
            }
            let path = self.fs.write_payload(
                &record.run_id,
                record.source_id,
                seq,
                &record.payload,
                record.content_type.as_deref(),
            )?;
            record.payload_path = Some(path.display().to_string());
            record.payload.clear();
        }
        Ok(skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::config::DedupeMode;
    use intake_core::model::{PayloadFormat, ValidationStatus};

    fn record(run_id: &str, body: &[u8], checksum: &str) -> NewRecord {
        NewRecord {
            run_id: run_id.to_string(),
            source_id: 1,
            format: PayloadFormat::Text,
            raw_size: body.len() as i64,
            payload: body.to_vec(),
            payload_path: None,
            checksum: checksum.to_string(),
            validation_status: ValidationStatus::Passed,
            validation_message: "ok".to_string(),
            validation_code: "TEXT_OK".to_string(),
            validation_details: serde_json::json!({}),
            content_type: Some("text/plain".to_string()),
            source_uri: None,
            status_code: None,
            row_count: None,
            columns: None,
            metadata: None,
        }
    }

    fn engine(dir: &std::path::Path, mode: StorageMode, dedupe: DedupeMode) -> StorageEngine {
        StorageEngine::new(
            mode,
            FileSystemStorage::new(dir.join("raw")),
            DedupeGate::new(dedupe, dir.join("state/dedupe.json")),
        )
    }

    #[test]
    fn db_mode_keeps_payload_inline() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), StorageMode::Db, DedupeMode::Store);
        let mut records = vec![record("r1", b"hello", "c1")];
        assert_eq!(engine.place_payloads(&mut records).unwrap(), 0);
        assert_eq!(records[0].payload, b"hello");
        assert!(records[0].payload_path.is_none());
    }

    #[test]
    fn db_mode_ignores_dedupe_and_keeps_duplicate_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), StorageMode::Db, DedupeMode::Skip);
        let mut records = vec![
            record("r1", b"hello", "same"),
            record("r1", b"hello", "same"),
        ];
        assert_eq!(engine.place_payloads(&mut records).unwrap(), 0);

        for record in &records {
            assert_eq!(record.payload, b"hello");
            assert!(record.payload_path.is_none());
        }
        // The dedupe index must never be touched from db mode.
        assert!(!dir.path().join("state/dedupe.json").exists());
    }

    #[test]
    fn file_mode_moves_payload_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), StorageMode::File, DedupeMode::Store);
        let mut records = vec![record("r1", b"hello", "c1")];
        engine.place_payloads(&mut records).unwrap();

        assert!(records[0].payload.is_empty());
        let path = records[0].payload_path.as_deref().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"hello");
    }

    #[test]
    fn duplicate_keeps_row_without_body_or_file() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), StorageMode::File, DedupeMode::Skip);
        let mut records = vec![
            record("r1", b"hello", "same"),
            record("r1", b"hello", "same"),
        ];
        assert_eq!(engine.place_payloads(&mut records).unwrap(), 1);

        assert!(records[0].payload_path.is_some());
        assert!(records[1].payload_path.is_none());
        assert!(records[1].payload.is_empty());
        assert_eq!(records[1].checksum, "same");

        let files = std::fs::read_dir(dir.path().join("raw/r1")).unwrap().count();
        assert_eq!(files, 1);
    }
}
