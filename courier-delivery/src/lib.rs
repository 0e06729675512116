//! Delivery scheduling and rate limiting engine
//!
//! This crate provides the core of the courier system:
//! - A delayed job queue with retry/backoff and retention
//! - Per-sender hourly rate accounting
//! - A bounded worker pool running the delivery state machine
//! - The scheduling API callers use to submit, cancel and inspect work

mod config;
mod error;
pub mod queue;
mod rate_limiter;
mod scheduler;
mod transport;
mod worker;

// Re-export common types
pub use courier_common::{DeliveryRecord, DeliveryStatus, RecordId};

pub use config::DeliveryConfig;
pub use error::{DeliveryError, ProcessError, SchedulerError};
pub use queue::{
    DeliveryJob, JobId, JobQueue, QueueStats, RetentionPolicy, RetryDisposition, RetryPolicy,
};
pub use rate_limiter::{HourlyRateLimiter, RateDecision, delay_until_next_hour};
pub use scheduler::{Scheduler, SubmitReceipt, SubmitRequest};
pub use transport::{DeliveryReceipt, LogTransport, MailTransport, TransportError};
pub use worker::{DeliveryWorkerPool, Outcome, PoolConfig, WorkerContext};
