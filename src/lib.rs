//! Scheduled outbound mail delivery with per-sender throughput control
//!
//! The `courier` crate wires the engine pieces together: persisted delivery
//! records, a delayed job queue with retry/backoff, per-sender hourly rate
//! accounting, and a bounded worker pool. [`controller::Courier`] is the
//! top-level runner the binary drives; embedders can also assemble the
//! pieces directly from the re-exports below.

pub mod controller;

pub use controller::Courier;
pub use courier_common::{DeliveryRecord, DeliveryStatus, RecordId, Signal};
pub use courier_delivery::{
    DeliveryConfig, DeliveryJob, DeliveryWorkerPool, HourlyRateLimiter, JobQueue, LogTransport,
    MailTransport, PoolConfig, QueueStats, RetentionPolicy, RetryPolicy, Scheduler, SubmitReceipt,
    SubmitRequest, WorkerContext,
};
pub use courier_store::{MemoryRecordStore, RecordStore, StoreError};
