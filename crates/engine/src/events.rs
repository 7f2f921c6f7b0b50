//! Run event audit trail. Event writes are best-effort: a failed insert
//! is logged and never fails the run it describes.

use tracing::warn;

use intake_store::RunStore;

#[derive(Clone)]
pub struct EventLogger {
    store: RunStore,
}

impl EventLogger {
    pub fn new(store: RunStore) -> Self {
        Self { store }
    }

    pub async fn log(&self, run_id: &str, stage: &str, event_type: &str, message: &str) {
        self.write(run_id, stage, event_type, message, None).await;
    }

    pub async fn log_error(
        &self,
        run_id: &str,
        stage: &str,
        event_type: &str,
        message: &str,
        error_code: &str,
    ) {
        self.write(run_id, stage, event_type, message, Some(error_code))
            .await;
    }

    async fn write(
        &self,
        run_id: &str,
        stage: &str,
        event_type: &str,
        message: &str,
        error_code: Option<&str>,
    ) {
        if let Err(e) = self
            .store
            .insert_event(run_id, stage, event_type, message, error_code)
            .await
        {
            warn!(run_id, event_type, error = %e, "failed to record run event");
        }
    }
}
