//! Durable state for the ingestion service: the run/record repository
//! (SQLite via sqlx), payload file storage with atomic writes, the
//! persisted dedupe index, and retention enforcement.

pub mod db;
pub mod dedupe;
pub mod engine;
pub mod fs;
pub mod retention;

pub use db::RunStore;
pub use dedupe::{DedupeGate, DedupeIndex};
pub use engine::StorageEngine;
pub use fs::FileSystemStorage;
pub use retention::RetentionSweep;
