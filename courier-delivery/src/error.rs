//! Typed error handling for scheduling and delivery processing.
//!
//! The taxonomy follows the system's propagation policy: validation fails
//! fast at submission, while everything downstream of a claimed job is
//! recorded in record status rather than thrown across the worker/caller
//! boundary.

use courier_common::RecordId;
use courier_store::StoreError;
use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced synchronously to callers of the scheduling API.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The recipient is not a syntactically valid mail address.
    #[error("invalid recipient address: {0}")]
    InvalidRecipient(String),

    /// The requested send time is unparsable or in the past.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// No record with that id exists for the calling sender.
    #[error("record not found: {0}")]
    NotFound(RecordId),

    /// Underlying record store failure.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for SchedulerError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Errors raised while a worker processes a claimed job.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The record was deleted after its job was enqueued. Terminal; the
    /// queue never retries it.
    #[error("record {0} no longer exists")]
    RecordMissing(RecordId),

    /// The mail transport rejected or failed the send. Retried by the
    /// queue's backoff policy.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// Record store failure during processing.
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

impl ProcessError {
    /// Permanent errors bypass the queue's retry budget.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::RecordMissing(_))
    }
}

/// Top-level error for running the delivery engine.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    /// A worker task panicked or was aborted.
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
