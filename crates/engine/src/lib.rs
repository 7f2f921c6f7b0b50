//! Ingestion engine: run lifecycle, retry/cancellation/timeout control,
//! the fetch-validate-store pipeline, and the scheduler that drives it.

pub mod events;
pub mod manager;
pub mod monitor;
pub mod pipeline;
pub mod rate_limit;
pub mod record;
pub mod scheduler;
pub mod state;
pub mod sweep;

pub use events::EventLogger;
pub use manager::RunManager;
pub use monitor::MonitorService;
pub use pipeline::IngestionPipeline;
pub use rate_limit::RateLimiter;
pub use record::RecordBuilder;
pub use scheduler::Scheduler;
