//! End-to-end pipeline tests over a real temp directory and an
//! in-memory store.

use std::path::Path;

use serde_json::json;

use intake_core::config::{DedupeMode, StorageMode};
use intake_core::model::{event_type, NewSource};
use intake_core::{Config, RunStatus, SourceType};
use intake_engine::IngestionPipeline;
use intake_store::RunStore;

fn config_for(dir: &Path) -> Config {
    Config {
        data_dir: dir.join("data"),
        ..Config::default()
    }
}

async fn file_source(store: &RunStore, inbox: &Path, state_dir: &Path) -> i64 {
    store
        .insert_source(&NewSource {
            name: "inbox".to_string(),
            source_type: SourceType::File,
            enabled: true,
            params: json!({
                "directory": inbox.to_string_lossy(),
                "pattern": "*.csv",
                "state_path": state_dir.join("file_index.json").to_string_lossy(),
            }),
            schedule: None,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn file_csv_run_reaches_success_with_passed_record() {
    let dir = tempfile::tempdir().unwrap();
    let inbox = dir.path().join("inbox");
    std::fs::create_dir_all(&inbox).unwrap();
    // Exactly 10 bytes of well-formed CSV.
    std::fs::write(inbox.join("data.csv"), "ab,cd\n1,2\n").unwrap();

    let store = RunStore::memory().await.unwrap();
    let source_id = file_source(&store, &inbox, &dir.path().join("state")).await;
    let pipeline = IngestionPipeline::new(store.clone(), &config_for(dir.path()));

    let run = pipeline.trigger_run(source_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Success);

    let stored = store.get_run(&run.run_id).await.unwrap().unwrap();
    assert_eq!(stored.records_count, 1);
    assert_eq!(stored.bytes_total, 10);
    assert!(stored.finished_at.is_some());
    assert!(stored.duration_ms >= 0);

    let records = store.records_for_run(&run.run_id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].format, "CSV");
    assert_eq!(records[0].raw_size, 10);
    assert_eq!(records[0].validation_status, "PASSED");
    assert_eq!(records[0].checksum.len(), 64);
    // Db storage mode: payload inline, no file.
    assert_eq!(records[0].payload, "ab,cd\n1,2\n");
    assert!(records[0].payload_path.is_none());

    let events = store.events_for_run(&run.run_id).await.unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert!(types.contains(&event_type::RUN_STARTED));
    assert!(types.contains(&event_type::FETCH_DONE));
    assert!(types.contains(&event_type::STORAGE_DONE));
    assert_eq!(types.last().copied(), Some(event_type::RUN_SUCCESS));
}

#[tokio::test]
async fn busy_source_is_rejected_when_queuing_is_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let inbox = dir.path().join("inbox");
    std::fs::create_dir_all(&inbox).unwrap();

    let mut config = config_for(dir.path());
    config.policy.allow_queue_on_busy = false;

    let store = RunStore::memory().await.unwrap();
    let source_id = file_source(&store, &inbox, &dir.path().join("state")).await;
    // An undispatched PENDING run holds the source.
    store.create_run_admission("held", source_id, true).await.unwrap();

    let pipeline = IngestionPipeline::new(store.clone(), &config);
    let err = pipeline.trigger_run(source_id).await.unwrap_err();
    assert!(matches!(err, intake_core::IntakeError::SourceBusy(_)));
}

#[tokio::test]
async fn queued_runs_execute_in_admission_order_on_drain() {
    let dir = tempfile::tempdir().unwrap();
    let inbox = dir.path().join("inbox");
    std::fs::create_dir_all(&inbox).unwrap();
    std::fs::write(inbox.join("data.csv"), "a,b\n1,2").unwrap();

    let store = RunStore::memory().await.unwrap();
    let source_id = file_source(&store, &inbox, &dir.path().join("state")).await;
    store.create_run_admission("first", source_id, true).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let pipeline = IngestionPipeline::new(store.clone(), &config_for(dir.path()));
    // An older PENDING run is ahead in line, so the trigger queues.
    let queued = pipeline.trigger_run(source_id).await.unwrap();
    assert_eq!(queued.status, RunStatus::Pending);

    assert_eq!(pipeline.drain_queues().await.unwrap(), 1);
    let first = store.get_run("first").await.unwrap().unwrap();
    assert_eq!(first.status, RunStatus::Success);
    assert_eq!(
        store.get_run(&queued.run_id).await.unwrap().unwrap().status,
        RunStatus::Pending
    );

    assert_eq!(pipeline.drain_queues().await.unwrap(), 1);
    assert_eq!(
        store.get_run(&queued.run_id).await.unwrap().unwrap().status,
        RunStatus::Success
    );
}

#[tokio::test]
async fn canceled_pending_run_finalizes_canceled_on_drain() {
    let dir = tempfile::tempdir().unwrap();
    let inbox = dir.path().join("inbox");
    std::fs::create_dir_all(&inbox).unwrap();

    let store = RunStore::memory().await.unwrap();
    let source_id = file_source(&store, &inbox, &dir.path().join("state")).await;
    store.create_run_admission("r1", source_id, true).await.unwrap();

    let pipeline = IngestionPipeline::new(store.clone(), &config_for(dir.path()));
    assert!(pipeline.cancel_run("r1").await.unwrap());
    pipeline.drain_queues().await.unwrap();

    let run = store.get_run("r1").await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Canceled);
    assert_eq!(run.error_code.as_deref(), Some("CANCELED"));

    let events = store.events_for_run("r1").await.unwrap();
    assert!(events
        .iter()
        .any(|e| e.event_type == event_type::RUN_CANCELED));
}

async fn run_duplicate_payloads(
    dedupe: DedupeMode,
) -> (RunStore, Config, String, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let inbox = dir.path().join("inbox");
    std::fs::create_dir_all(&inbox).unwrap();
    // Two files, identical content, same checksum.
    std::fs::write(inbox.join("one.csv"), "a,b\n1,2").unwrap();
    std::fs::write(inbox.join("two.csv"), "a,b\n1,2").unwrap();

    let mut config = config_for(dir.path());
    config.storage_mode = StorageMode::File;
    config.dedupe_mode = dedupe;

    let store = RunStore::memory().await.unwrap();
    let source_id = file_source(&store, &inbox, &dir.path().join("state")).await;
    let pipeline = IngestionPipeline::new(store.clone(), &config);
    let run = pipeline.trigger_run(source_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Success);

    (store, config, run.run_id, dir)
}

#[tokio::test]
async fn dedupe_skip_writes_one_file_but_keeps_both_records() {
    let (store, config, run_id, _dir) = run_duplicate_payloads(DedupeMode::Skip).await;

    let records = store.records_for_run(&run_id).await.unwrap();
    assert_eq!(records.len(), 2);
    let with_path = records.iter().filter(|r| r.payload_path.is_some()).count();
    assert_eq!(with_path, 1);
    // The duplicate keeps its checksum but carries no body.
    let dup = records.iter().find(|r| r.payload_path.is_none()).unwrap();
    assert_eq!(dup.checksum.len(), 64);
    assert!(dup.payload.is_empty());

    let files = std::fs::read_dir(config.raw_dir().join(&run_id)).unwrap().count();
    assert_eq!(files, 1);
}

#[tokio::test]
async fn dedupe_store_writes_every_payload_file() {
    let (store, config, run_id, _dir) = run_duplicate_payloads(DedupeMode::Store).await;

    let records = store.records_for_run(&run_id).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.payload_path.is_some()));

    let files = std::fs::read_dir(config.raw_dir().join(&run_id)).unwrap().count();
    assert_eq!(files, 2);
}

#[tokio::test]
async fn missing_required_param_fails_the_run_before_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let store = RunStore::memory().await.unwrap();
    let source_id = store
        .insert_source(&NewSource {
            name: "no-directory".to_string(),
            source_type: SourceType::File,
            enabled: true,
            params: json!({}),
            schedule: None,
        })
        .await
        .unwrap();

    let pipeline = IngestionPipeline::new(store.clone(), &config_for(dir.path()));
    let run = pipeline.trigger_run(source_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);

    let stored = store.get_run(&run.run_id).await.unwrap().unwrap();
    assert_eq!(stored.error_code.as_deref(), Some("ADAPTER_CONFIG"));

    // The parameter check fires before any fetch is attempted.
    let events = store.events_for_run(&run.run_id).await.unwrap();
    assert!(events
        .iter()
        .all(|e| e.event_type != event_type::FETCH_STARTED));
}

#[tokio::test]
async fn bad_adapter_config_fails_the_run_with_code() {
    let dir = tempfile::tempdir().unwrap();
    let store = RunStore::memory().await.unwrap();
    let source_id = store
        .insert_source(&NewSource {
            name: "broken".to_string(),
            source_type: SourceType::File,
            enabled: true,
            params: json!({"directory": "/definitely/not/here"}),
            schedule: None,
        })
        .await
        .unwrap();

    let pipeline = IngestionPipeline::new(store.clone(), &config_for(dir.path()));
    let run = pipeline.trigger_run(source_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);

    let stored = store.get_run(&run.run_id).await.unwrap().unwrap();
    assert_eq!(stored.error_code.as_deref(), Some("ADAPTER_CONFIG"));
    assert!(stored.error_message.is_some());

    let events = store.events_for_run(&run.run_id).await.unwrap();
    assert_eq!(
        events.last().map(|e| e.event_type.as_str()),
        Some(event_type::RUN_FAILED)
    );
}
