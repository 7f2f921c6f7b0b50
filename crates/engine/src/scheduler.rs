//! Scheduler: one background task driving the whole service on a fixed
//! tick. Per tick, in order: trigger scan over scheduled sources,
//! timeout sweep, stale-pending cleanup, retention, queue drain, health
//! snapshot. A failure in any step is logged and never aborts the tick.

use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use intake_core::{Config, IntakeError};
use intake_store::{FileSystemStorage, RetentionSweep, RunStore};

use crate::monitor::MonitorService;
use crate::pipeline::IngestionPipeline;
use crate::rate_limit::RateLimiter;
use crate::sweep;

pub struct Scheduler {
    pipeline: Arc<IngestionPipeline>,
    store: RunStore,
    config: Config,
    retention: RetentionSweep,
    monitor: MonitorService,
    limiter: Mutex<RateLimiter>,
    shutdown: Notify,
}

impl Scheduler {
    pub fn new(pipeline: Arc<IngestionPipeline>, config: Config) -> Self {
        let store = pipeline.store().clone();
        let retention = RetentionSweep::new(
            store.clone(),
            FileSystemStorage::new(config.raw_dir()),
            config.retention_days,
            config.max_runs_per_source,
        );
        Self {
            monitor: MonitorService::new(store.clone()),
            retention,
            store,
            pipeline,
            config,
            limiter: Mutex::new(RateLimiter::new()),
            shutdown: Notify::new(),
        }
    }

    /// Spawn the tick loop. Stops on [`Scheduler::shutdown`].
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.scheduler_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                interval_s = self.config.scheduler_interval.as_secs(),
                "scheduler started"
            );
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.tick().await,
                    _ = self.shutdown.notified() => {
                        info!("scheduler stopping");
                        break;
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    /// One full scheduler pass.
    pub async fn tick(&self) {
        self.trigger_scan().await;
        if let Err(e) = sweep::timeout_sweep(&self.store, self.config.policy.run_timeout).await {
            warn!(error = %e, "timeout sweep failed");
        }
        if let Err(e) =
            sweep::stale_pending_sweep(&self.store, self.config.stale_grace_minutes).await
        {
            warn!(error = %e, "stale-pending sweep failed");
        }
        if let Err(e) = self.retention.run_once().await {
            warn!(error = %e, "retention sweep failed");
        }
        if let Err(e) = self.pipeline.drain_queues().await {
            warn!(error = %e, "queue drain failed");
        }
        if let Err(e) = self.monitor.emit().await {
            warn!(error = %e, "health snapshot failed");
        }
    }

    /// Fire every scheduled source whose interval has elapsed.
    async fn trigger_scan(&self) {
        let sources = match self.store.list_scheduled_sources().await {
            Ok(sources) => sources,
            Err(e) => {
                warn!(error = %e, "failed to list scheduled sources");
                return;
            }
        };
        for source in sources {
            let Some(interval) = source.schedule_interval_seconds() else {
                continue;
            };
            let due = self
                .limiter
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .try_fire(source.id, interval);
            if !due {
                continue;
            }
            match self.pipeline.trigger_run(source.id).await {
                Ok(run) => {
                    debug!(source_id = source.id, run_id = %run.run_id, status = %run.status, "scheduled trigger")
                }
                Err(IntakeError::SourceBusy(_)) => {
                    debug!(source_id = source.id, "scheduled trigger skipped, source busy")
                }
                Err(e) => warn!(source_id = source.id, error = %e, "scheduled trigger failed"),
            }
        }
    }
}
