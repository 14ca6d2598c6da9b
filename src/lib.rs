// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod ingest;
pub mod metrics;
pub mod notify;

pub use crate::ingest::config::IngestConfig;
pub use crate::ingest::cycle::{CycleOutcome, CycleResult, NotificationStatus, SourceStatus};
pub use crate::ingest::scheduler::{Scheduler, SchedulerHandle, SchedulerSettings};
pub use crate::notify::Notifier;
