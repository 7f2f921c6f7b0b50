//! Ingestion pipeline: the full run lifecycle from trigger to terminal
//! status. Fetch, classify, validate, place payloads, persist records,
//! finalize, with an event-trail entry per stage.

use chrono::Utc;
use tracing::warn;

use intake_adapters::{adapter_for, validate_params};
use intake_core::model::{event_type, Run, RunMetrics, Source};
use intake_core::{Config, IntakeError, RunStatus, ValidationStatus};
use intake_store::{DedupeGate, FileSystemStorage, RunStore, StorageEngine};
use intake_validate::ValidatorConfig;

use crate::events::EventLogger;
use crate::manager::RunManager;
use crate::record::RecordBuilder;

pub struct IngestionPipeline {
    store: RunStore,
    manager: RunManager,
    events: EventLogger,
    storage: StorageEngine,
    builder: RecordBuilder,
}

impl IngestionPipeline {
    pub fn new(store: RunStore, config: &Config) -> Self {
        let storage = StorageEngine::new(
            config.storage_mode,
            FileSystemStorage::new(config.raw_dir()),
            DedupeGate::new(config.dedupe_mode, config.state_dir().join("dedupe.json")),
        );
        let validator = ValidatorConfig {
            max_payload_size_bytes: config.max_payload_size_bytes,
            ..Default::default()
        };
        Self {
            manager: RunManager::new(store.clone(), config.policy),
            events: EventLogger::new(store.clone()),
            store,
            storage,
            builder: RecordBuilder::new(validator),
        }
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    pub fn manager(&self) -> &RunManager {
        &self.manager
    }

    /// Admit a run and, when the source is idle and this run is next in
    /// line, execute it to completion. A queued run stays PENDING for the
    /// drain.
    pub async fn trigger_run(&self, source_id: i64) -> Result<Run, IntakeError> {
        let run = self.manager.create_run(source_id).await?;
        if !self.store.has_running(source_id).await? {
            if let Some(next) = self.store.next_pending(source_id).await? {
                if next.run_id == run.run_id {
                    return self.execute_run(run).await;
                }
            }
        }
        Ok(run)
    }

    /// Cooperative cancel; false for missing or already-terminal runs.
    pub async fn cancel_run(&self, run_id: &str) -> Result<bool, IntakeError> {
        self.manager.request_cancel(run_id).await
    }

    /// Execute one admitted run through to a terminal status. The
    /// returned run carries that status; `Err` here means the store
    /// itself failed, not the ingestion.
    pub async fn execute_run(&self, mut run: Run) -> Result<Run, IntakeError> {
        // A cancel that lands while the run is still queued takes effect
        // before any work starts.
        if self.store.cancellation_requested(&run.run_id).await? {
            let cause = IntakeError::Canceled(format!("run {} canceled before start", run.run_id));
            self.manager
                .finalize_run(&mut run, RunStatus::Canceled, Some(&cause), &RunMetrics::default())
                .await?;
            self.events
                .log_error(
                    &run.run_id,
                    "run",
                    event_type::RUN_CANCELED,
                    "canceled before start",
                    cause.code().as_str(),
                )
                .await;
            return Ok(run);
        }

        let source = self
            .store
            .get_source(run.source_id)
            .await?
            .ok_or_else(|| IntakeError::SourceNotFound(format!("source {}", run.source_id)))?;

        self.manager.start_run(&mut run).await?;
        self.events
            .log(&run.run_id, "run", event_type::RUN_STARTED, "run started")
            .await;

        let mut metrics = RunMetrics::started_now();
        let outcome = self.run_stages(&run, &source, &mut metrics).await;
        metrics.finished_at = Some(Utc::now());

        match outcome {
            Ok(()) => {
                self.manager
                    .finalize_run(&mut run, RunStatus::Success, None, &metrics)
                    .await?;
                self.store
                    .set_run_message(
                        &run.run_id,
                        &format!("ingested {} payloads", metrics.records_count),
                    )
                    .await?;
                self.events
                    .log(&run.run_id, "run", event_type::RUN_SUCCESS, "run succeeded")
                    .await;
            }
            Err(cause) => {
                let (status, event) = if matches!(cause, IntakeError::Canceled(_)) {
                    (RunStatus::Canceled, event_type::RUN_CANCELED)
                } else {
                    (RunStatus::Failed, event_type::RUN_FAILED)
                };
                self.manager
                    .finalize_run(&mut run, status, Some(&cause), &metrics)
                    .await?;
                self.events
                    .log_error(
                        &run.run_id,
                        "run",
                        event,
                        &cause.to_string(),
                        cause.code().as_str(),
                    )
                    .await;
            }
        }
        Ok(run)
    }

    async fn run_stages(
        &self,
        run: &Run,
        source: &Source,
        metrics: &mut RunMetrics,
    ) -> Result<(), IntakeError> {
        // Reject a broken parameter map before the adapter is built, so
        // the run fails with ADAPTER_CONFIG and no fetch is attempted.
        validate_params(source.source_type, &source.params)?;
        let adapter = adapter_for(source)?;

        self.events
            .log(
                &run.run_id,
                "fetch",
                event_type::FETCH_STARTED,
                &format!("fetching from source '{}'", source.name),
            )
            .await;
        let payloads = self
            .manager
            .execute_with_retry(run, || adapter.fetch())
            .await?;
        self.events
            .log(
                &run.run_id,
                "fetch",
                event_type::FETCH_DONE,
                &format!("fetched {} payloads", payloads.len()),
            )
            .await;

        let mut records = Vec::with_capacity(payloads.len());
        let mut failed = 0usize;
        for payload in &payloads {
            let record = self.builder.build(&run.run_id, run.source_id, payload);
            if record.validation_status == ValidationStatus::Failed {
                failed += 1;
            }
            metrics.add_payload(&payload.body);
            records.push(record);
        }
        self.events
            .log(
                &run.run_id,
                "detect",
                event_type::DETECT_DONE,
                &format!("classified {} payloads", records.len()),
            )
            .await;
        self.events
            .log(
                &run.run_id,
                "validate",
                event_type::VALIDATION_DONE,
                &format!("{failed} of {} payloads failed validation", records.len()),
            )
            .await;

        let skipped = self.storage.place_payloads(&mut records)?;
        self.store.insert_records(&records).await?;
        self.events
            .log(
                &run.run_id,
                "store",
                event_type::STORAGE_DONE,
                &format!(
                    "stored {} records, {skipped} duplicate payloads skipped",
                    records.len()
                ),
            )
            .await;
        Ok(())
    }

    /// One pass over every enabled source: when nothing is running for a
    /// source, pop its oldest PENDING run and execute it inline. A failed
    /// source never blocks the others.
    pub async fn drain_queues(&self) -> Result<usize, IntakeError> {
        let mut executed = 0;
        for source in self.store.list_enabled_sources().await? {
            if self.store.has_running(source.id).await? {
                continue;
            }
            let Some(run) = self.store.next_pending(source.id).await? else {
                continue;
            };
            let run_id = run.run_id.clone();
            match self.execute_run(run).await {
                Ok(_) => executed += 1,
                Err(e) => warn!(run_id = %run_id, source_id = source.id, error = %e, "queued run failed to execute"),
            }
        }
        Ok(executed)
    }
}
