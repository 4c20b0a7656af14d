//! Background jobs: shipment creation, deferred shipment re-fetch, refunds.
//!
//! Work that must not block a request is enqueued as a [`Job`] and run by the
//! [`JobExecutor`] on tokio. Failures are retried with backoff per
//! [`RetryPolicy`]; exhausted jobs land in the dead letters, from where an
//! operator can re-queue them.

pub mod executor;
pub mod store;
pub mod types;

pub use executor::{ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobHandler};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    BackoffStrategy, DeadLetterEntry, Job, JobAttemptRecord, JobId, JobKind, JobResult, JobStatus,
    OrderJob, RetryPolicy, ShipmentJob,
};
