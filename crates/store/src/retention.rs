//! Retention: drops runs past the age window and runs beyond the
//! per-source count cap, together with their records, events, and
//! payload files.

use chrono::{Duration, Utc};
use tracing::{info, warn};

use intake_core::IntakeError;

use crate::db::RunStore;
use crate::fs::FileSystemStorage;

/// Outcome counters for one retention pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    pub runs_deleted: u64,
    pub files_deleted: u64,
}

pub struct RetentionSweep {
    store: RunStore,
    fs: FileSystemStorage,
    retention_days: i64,
    max_runs_per_source: usize,
}

impl RetentionSweep {
    pub fn new(
        store: RunStore,
        fs: FileSystemStorage,
        retention_days: i64,
        max_runs_per_source: usize,
    ) -> Self {
        Self {
            store,
            fs,
            retention_days,
            max_runs_per_source,
        }
    }

    /// One full pass: age window first, then the per-source count cap.
    pub async fn run_once(&self) -> Result<SweepOutcome, IntakeError> {
        let mut outcome = self.enforce_age().await?;
        let by_count = self.enforce_count().await?;
        outcome.runs_deleted += by_count.runs_deleted;
        outcome.files_deleted += by_count.files_deleted;
        if outcome.runs_deleted > 0 {
            info!(
                runs = outcome.runs_deleted,
                files = outcome.files_deleted,
                "retention sweep deleted runs"
            );
        }
        Ok(outcome)
    }

    async fn enforce_age(&self) -> Result<SweepOutcome, IntakeError> {
        let cutoff = Utc::now() - Duration::days(self.retention_days);
        let run_ids = self.store.run_ids_started_before(cutoff).await?;
        self.delete(&run_ids).await
    }

    async fn enforce_count(&self) -> Result<SweepOutcome, IntakeError> {
        let mut outcome = SweepOutcome::default();
        for source_id in self.store.source_ids_with_runs().await? {
            let run_ids = self
                .store
                .run_ids_beyond_count(source_id, self.max_runs_per_source)
                .await?;
            let deleted = self.delete(&run_ids).await?;
            outcome.runs_deleted += deleted.runs_deleted;
            outcome.files_deleted += deleted.files_deleted;
        }
        Ok(outcome)
    }

    /// Database rows go first; payload files after. A file that fails to
    /// unlink is logged and left for the next pass rather than aborting
    /// the sweep.
    async fn delete(&self, run_ids: &[String]) -> Result<SweepOutcome, IntakeError> {
        if run_ids.is_empty() {
            return Ok(SweepOutcome::default());
        }
        let paths = self.store.payload_paths_for_runs(run_ids).await?;
        let runs_deleted = self.store.delete_runs(run_ids).await?;

        let mut files_deleted = 0;
        for path in &paths {
            match self.fs.remove(std::path::Path::new(path)) {
                Ok(()) => files_deleted += 1,
                Err(e) => warn!(path, error = %e, "failed to delete payload file"),
            }
        }
        for run_id in run_ids {
            self.fs.remove_run_dir_if_empty(run_id);
        }
        Ok(SweepOutcome {
            runs_deleted,
            files_deleted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::model::{NewSource, RunMetrics};
    use intake_core::{RunStatus, SourceType};
    use serde_json::json;

    async fn seeded_store() -> (RunStore, i64) {
        let store = RunStore::memory().await.unwrap();
        let source_id = store
            .insert_source(&NewSource {
                name: "s".to_string(),
                source_type: SourceType::File,
                enabled: true,
                params: json!({}),
                schedule: None,
            })
            .await
            .unwrap();
        (store, source_id)
    }

    async fn finished_run(store: &RunStore, source_id: i64, run_id: &str) {
        store.create_run_admission(run_id, source_id, true).await.unwrap();
        store
            .finalize_run(run_id, RunStatus::Success, None, None, &RunMetrics::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn count_cap_keeps_most_recent_runs() {
        let (store, source_id) = seeded_store().await;
        for i in 0..5 {
            finished_run(&store, source_id, &format!("r{i}")).await;
            // Distinct started_at values for deterministic ordering.
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let dir = tempfile::tempdir().unwrap();
        let sweep = RetentionSweep::new(
            store.clone(),
            FileSystemStorage::new(dir.path()),
            30,
            2,
        );
        let outcome = sweep.run_once().await.unwrap();
        assert_eq!(outcome.runs_deleted, 3);

        // The two newest survive.
        assert!(store.get_run("r4").await.unwrap().is_some());
        assert!(store.get_run("r3").await.unwrap().is_some());
        assert!(store.get_run("r0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn age_window_deletes_old_and_keeps_recent() {
        let (store, source_id) = seeded_store().await;
        finished_run(&store, source_id, "old").await;
        store
            .set_run_started_at("old", Utc::now() - Duration::days(8))
            .await
            .unwrap();
        finished_run(&store, source_id, "recent").await;
        store
            .set_run_started_at("recent", Utc::now() - Duration::days(6))
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let sweep = RetentionSweep::new(
            store.clone(),
            FileSystemStorage::new(dir.path()),
            7,
            100,
        );
        let outcome = sweep.run_once().await.unwrap();
        assert_eq!(outcome.runs_deleted, 1);
        assert!(store.get_run("old").await.unwrap().is_none());
        assert!(store.get_run("recent").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn recent_runs_survive_age_window() {
        let (store, source_id) = seeded_store().await;
        finished_run(&store, source_id, "r1").await;

        let dir = tempfile::tempdir().unwrap();
        let sweep = RetentionSweep::new(
            store.clone(),
            FileSystemStorage::new(dir.path()),
            7,
            100,
        );
        let outcome = sweep.run_once().await.unwrap();
        assert_eq!(outcome.runs_deleted, 0);
        assert!(store.get_run("r1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn deleted_runs_take_their_payload_files() {
        let (store, source_id) = seeded_store().await;
        for i in 0..3 {
            finished_run(&store, source_id, &format!("r{i}")).await;
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let dir = tempfile::tempdir().unwrap();
        let fs = FileSystemStorage::new(dir.path());
        let path = fs.write_payload("r0", source_id, 0, b"old", Some("text/plain")).unwrap();
        store
            .insert_records(&[intake_core::model::NewRecord {
                run_id: "r0".to_string(),
                source_id,
                format: intake_core::model::PayloadFormat::Text,
                raw_size: 3,
                payload: Vec::new(),
                payload_path: Some(path.display().to_string()),
                checksum: "c".to_string(),
                validation_status: intake_core::model::ValidationStatus::Passed,
                validation_message: "ok".to_string(),
                validation_code: "TEXT_OK".to_string(),
                validation_details: json!({}),
                content_type: None,
                source_uri: None,
                status_code: None,
                row_count: None,
                columns: None,
                metadata: None,
            }])
            .await
            .unwrap();

        let sweep = RetentionSweep::new(store.clone(), fs, 30, 1);
        let outcome = sweep.run_once().await.unwrap();
        assert_eq!(outcome.runs_deleted, 2);
        assert_eq!(outcome.files_deleted, 1);
        assert!(!path.exists());
        assert!(store.records_for_run("r0").await.unwrap().is_empty());
    }
}
