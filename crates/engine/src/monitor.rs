//! Operator-facing health counters, emitted once per scheduler tick.

use tracing::info;

use intake_core::{HealthSnapshot, IntakeError, RunStatus};
use intake_store::RunStore;

pub struct MonitorService {
    store: RunStore,
}

impl MonitorService {
    pub fn new(store: RunStore) -> Self {
        Self { store }
    }

    pub async fn snapshot(&self) -> Result<HealthSnapshot, IntakeError> {
        Ok(HealthSnapshot {
            running: self.store.count_by_status(RunStatus::Running).await?,
            pending: self.store.count_by_status(RunStatus::Pending).await?,
            failed: self.store.count_by_status(RunStatus::Failed).await?,
            queue_depth: self.store.pending_depth_by_source().await?,
        })
    }

    pub async fn emit(&self) -> Result<(), IntakeError> {
        let snapshot = self.snapshot().await?;
        info!(
            running = snapshot.running,
            pending = snapshot.pending,
            failed = snapshot.failed,
            queue_depth = %serde_json::to_string(&snapshot.queue_depth).unwrap_or_default(),
            "health"
        );
        Ok(())
    }
}
