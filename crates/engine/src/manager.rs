//! Run manager: admission, lifecycle transitions, and the retry
//! controller with cooperative cancellation.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{info, warn};

use intake_core::config::RuntimePolicy;
use intake_core::model::{Run, RunMetrics};
use intake_core::{IntakeError, RunStatus};
use intake_store::RunStore;

use crate::state;

// Process-local tiebreaker for runs admitted within the same millisecond.
static RUN_SEQ: AtomicU64 = AtomicU64::new(0);

fn next_run_id() -> String {
    let millis = Utc::now().timestamp_millis();
    let seq = RUN_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{millis}-{seq}")
}

/// Owns run lifecycle decisions; all writes go through the store.
#[derive(Clone)]
pub struct RunManager {
    store: RunStore,
    policy: RuntimePolicy,
}

impl RunManager {
    pub fn new(store: RunStore, policy: RuntimePolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &RuntimePolicy {
        &self.policy
    }

    /// Admit a new run for a source. Fails with `SourceNotFound` for
    /// missing/disabled sources and `SourceBusy` when the source has an
    /// active run and queuing is disabled.
    pub async fn create_run(&self, source_id: i64) -> Result<Run, IntakeError> {
        let run_id = next_run_id();
        let run = self
            .store
            .create_run_admission(&run_id, source_id, self.policy.allow_queue_on_busy)
            .await?;
        info!(run_id = %run.run_id, source_id, "run admitted");
        Ok(run)
    }

    /// PENDING -> RUNNING. Error fields and counters are reset so a run
    /// picked up from the queue starts clean.
    pub async fn start_run(&self, run: &mut Run) -> Result<(), IntakeError> {
        state::ensure_transition(run.status, RunStatus::Running)?;
        self.store.mark_run_started(&run.run_id).await?;
        run.status = RunStatus::Running;
        Ok(())
    }

    /// Write the terminal status. The transition is validated against the
    /// in-memory run before anything reaches the database.
    pub async fn finalize_run(
        &self,
        run: &mut Run,
        status: RunStatus,
        error: Option<&IntakeError>,
        metrics: &RunMetrics,
    ) -> Result<(), IntakeError> {
        state::ensure_transition(run.status, status)?;
        let code = error.map(|e| e.code().as_str());
        let message = error.map(|e| e.to_string());
        self.store
            .finalize_run(&run.run_id, status, code, message.as_deref(), metrics)
            .await?;
        run.status = status;
        info!(
            run_id = %run.run_id,
            status = %status,
            records = metrics.records_count,
            bytes = metrics.bytes_total,
            "run finalized"
        );
        Ok(())
    }

    /// Cooperative cancel: sets the flag on an active run. The run
    /// observes it at its next checkpoint.
    pub async fn request_cancel(&self, run_id: &str) -> Result<bool, IntakeError> {
        let accepted = self.store.request_cancel(run_id).await?;
        if accepted {
            info!(run_id, "cancellation requested");
        }
        Ok(accepted)
    }

    /// Drive a fallible unit of work under the runtime policy.
    ///
    /// Checkpoint order per attempt: cancellation flag, then the deadline
    /// (run started_at + run timeout), then the work itself. Only
    /// `Retryable` failures are re-attempted; `max_retries` bounds the
    /// retries, so `max_retries + 1` attempts happen in the worst case.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        run: &Run,
        mut work: F,
    ) -> Result<T, IntakeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, IntakeError>>,
    {
        let deadline = run.started_at
            + ChronoDuration::milliseconds(self.policy.run_timeout.as_millis() as i64);
        let mut attempts: u32 = 0;

        loop {
            if self.store.cancellation_requested(&run.run_id).await? {
                return Err(IntakeError::Canceled(format!(
                    "run {} canceled at retry checkpoint",
                    run.run_id
                )));
            }
            if Utc::now() >= deadline {
                return Err(IntakeError::Timeout(format!(
                    "run {} exceeded {}s budget",
                    run.run_id,
                    self.policy.run_timeout.as_secs()
                )));
            }

            match work().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    attempts += 1;
                    if attempts > self.policy.max_retries {
                        return Err(IntakeError::Adapter(format!(
                            "giving up after {attempts} attempts: {e}"
                        )));
                    }
                    warn!(
                        run_id = %run.run_id,
                        attempt = attempts,
                        max_retries = self.policy.max_retries,
                        error = %e,
                        "retryable failure, backing off"
                    );
                    // Pre-sleep checkpoint: don't burn backoff time on a
                    // run that was just canceled.
                    if self.store.cancellation_requested(&run.run_id).await? {
                        return Err(IntakeError::Canceled(format!(
                            "run {} canceled at retry checkpoint",
                            run.run_id
                        )));
                    }
                    tokio::time::sleep(self.policy.retry_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::model::NewSource;
    use intake_core::SourceType;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn policy() -> RuntimePolicy {
        RuntimePolicy {
            allow_queue_on_busy: true,
            max_retries: 2,
            retry_backoff: Duration::from_millis(1),
            run_timeout: Duration::from_secs(60),
        }
    }

    async fn manager_with_run() -> (RunManager, Run) {
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
        let manager = RunManager::new(store, policy());
        let run = manager.create_run(source_id).await.unwrap();
        (manager, run)
    }

    #[tokio::test]
    async fn retry_succeeds_within_budget() {
        let (manager, run) = manager_with_run().await;
        let calls = AtomicU32::new(0);

        // Fails twice, succeeds on the third attempt; max_retries = 2.
        let result = manager
            .execute_with_retry(&run, || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(IntakeError::Retryable("flaky".to_string()))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_retries() {
        let (manager, run) = manager_with_run().await;
        let calls = AtomicU32::new(0);

        let err = manager
            .execute_with_retry(&run, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(IntakeError::Retryable("always down".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Adapter(_)));
        // max_retries retries on top of the first attempt.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_propagate_immediately() {
        let (manager, run) = manager_with_run().await;
        let calls = AtomicU32::new(0);

        let err = manager
            .execute_with_retry(&run, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(IntakeError::Configuration("bad params".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Configuration(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_observed_before_work() {
        let (manager, run) = manager_with_run().await;
        assert!(manager.request_cancel(&run.run_id).await.unwrap());

        let err = manager
            .execute_with_retry(&run, || async { Ok::<_, IntakeError>(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Canceled(_)));
    }

    #[tokio::test]
    async fn expired_deadline_times_out_before_work() {
        let (manager, mut run) = manager_with_run().await;
        run.started_at = Utc::now() - ChronoDuration::hours(1);

        let err = manager
            .execute_with_retry(&run, || async { Ok::<_, IntakeError>(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Timeout(_)));
    }

    #[tokio::test]
    async fn finalize_rejects_illegal_transition_and_keeps_stored_status() {
        let (manager, mut run) = manager_with_run().await;

        // PENDING -> SUCCESS is illegal; the stored row must not move.
        let err = manager
            .finalize_run(&mut run, RunStatus::Success, None, &RunMetrics::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::InvalidTransition { .. }));

        let stored = manager.store.get_run(&run.run_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Pending);
    }

    #[tokio::test]
    async fn full_lifecycle_pending_running_success() {
        let (manager, mut run) = manager_with_run().await;
        manager.start_run(&mut run).await.unwrap();
        assert_eq!(run.status, RunStatus::Running);

        manager
            .finalize_run(&mut run, RunStatus::Success, None, &RunMetrics::default())
            .await
            .unwrap();
        let stored = manager.store.get_run(&run.run_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Success);
    }

    #[test]
    fn run_ids_are_unique_within_a_millisecond() {
        let a = next_run_id();
        let b = next_run_id();
        assert_ne!(a, b);
    }
}
