//! Scheduler sweeps: time out overrunning RUNNING runs and cancel
//! PENDING runs that outlived the stale grace window without being
//! dispatched.

use chrono::{Duration, Utc};
use tracing::warn;

use intake_core::model::{event_type, RunMetrics};
use intake_core::{IntakeError, RunStatus};
use intake_store::RunStore;

/// Fail every RUNNING run whose time budget has elapsed. Returns the
/// number of runs timed out.
pub async fn timeout_sweep(
    store: &RunStore,
    run_timeout: std::time::Duration,
) -> Result<usize, IntakeError> {
    let budget = Duration::milliseconds(run_timeout.as_millis() as i64);
    let now = Utc::now();
    let mut timed_out = 0;

    for run in store.running_runs().await? {
        if now < run.started_at + budget {
            continue;
        }
        let cause = IntakeError::Timeout(format!(
            "run {} exceeded {}s budget",
            run.run_id,
            run_timeout.as_secs()
        ));
        warn!(run_id = %run.run_id, source_id = run.source_id, "timing out overrunning run");
        let metrics = RunMetrics {
            started_at: Some(run.started_at),
            finished_at: Some(now),
            ..Default::default()
        };
        store
            .finalize_run(
                &run.run_id,
                RunStatus::Failed,
                Some(cause.code().as_str()),
                Some(&cause.to_string()),
                &metrics,
            )
            .await?;
        store
            .insert_event(
                &run.run_id,
                "sweep",
                event_type::RUN_FAILED,
                &cause.to_string(),
                Some(cause.code().as_str()),
            )
            .await?;
        timed_out += 1;
    }
    Ok(timed_out)
}

/// Cancel PENDING runs older than the grace window; they were admitted
/// but never dispatched (typically after a crash or a long outage).
pub async fn stale_pending_sweep(
    store: &RunStore,
    grace_minutes: i64,
) -> Result<usize, IntakeError> {
    let cutoff = Utc::now() - Duration::minutes(grace_minutes);
    let mut canceled = 0;

    for run in store.stale_pending_before(cutoff).await? {
        let message = format!(
            "canceled stale pending run (older than {grace_minutes} minutes)"
        );
        warn!(run_id = %run.run_id, source_id = run.source_id, "canceling stale pending run");
        store
            .finalize_run(
                &run.run_id,
                RunStatus::Canceled,
                Some("CANCELED"),
                Some(&message),
                &RunMetrics::default(),
            )
            .await?;
        store
            .insert_event(
                &run.run_id,
                "sweep",
                event_type::RUN_CANCELED,
                &message,
                Some("CANCELED"),
            )
            .await?;
        canceled += 1;
    }
    Ok(canceled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::model::NewSource;
    use intake_core::SourceType;
    use serde_json::json;

    async fn store_with_source() -> (RunStore, i64) {
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

    #[tokio::test]
    async fn overrunning_run_is_failed_with_timeout_code() {
        let (store, source_id) = store_with_source().await;
        let run = store.create_run_admission("r1", source_id, true).await.unwrap();
        store.mark_run_started(&run.run_id).await.unwrap();
        store
            .set_run_started_at(&run.run_id, Utc::now() - Duration::hours(1))
            .await
            .unwrap();

        let swept = timeout_sweep(&store, std::time::Duration::from_secs(90))
            .await
            .unwrap();
        assert_eq!(swept, 1);

        let stored = store.get_run(&run.run_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.error_code.as_deref(), Some("TIMEOUT"));
    }

    #[tokio::test]
    async fn run_within_budget_is_left_alone() {
        let (store, source_id) = store_with_source().await;
        let run = store.create_run_admission("r1", source_id, true).await.unwrap();
        store.mark_run_started(&run.run_id).await.unwrap();

        let swept = timeout_sweep(&store, std::time::Duration::from_secs(90))
            .await
            .unwrap();
        assert_eq!(swept, 0);
        let stored = store.get_run(&run.run_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Running);
    }

    #[tokio::test]
    async fn stale_pending_run_is_canceled() {
        let (store, source_id) = store_with_source().await;
        store.create_run_admission("old", source_id, true).await.unwrap();
        store
            .set_run_started_at("old", Utc::now() - Duration::hours(2))
            .await
            .unwrap();
        store.create_run_admission("fresh", source_id, true).await.unwrap();

        let swept = stale_pending_sweep(&store, 60).await.unwrap();
        assert_eq!(swept, 1);

        let old = store.get_run("old").await.unwrap().unwrap();
        assert_eq!(old.status, RunStatus::Canceled);
        let fresh = store.get_run("fresh").await.unwrap().unwrap();
        assert_eq!(fresh.status, RunStatus::Pending);
    }
}
