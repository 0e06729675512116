//! Per-job delivery state machine
//!
//! Order matters here: the idempotency check runs before anything else so a
//! replayed job can never double-send, and the rate counter is incremented
//! only after the transport accepts the message so a failed send never
//! consumes quota.

use std::time::Duration;

use chrono::Local;
use courier_common::DeliveryStatus;
use courier_store::StoreError;
use tracing::{debug, warn};

use crate::{
    error::ProcessError,
    queue::{DeliveryJob, JobId},
    rate_limiter::delay_until_next_hour,
    worker::WorkerContext,
};

/// Result of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The message went out; the worker owes this pacing delay before its
    /// next claim.
    Sent { pacing: Duration },
    /// The record was already sent; duplicate or replayed job, nothing done.
    AlreadySent,
    /// Sender over quota; a fresh job was queued for the next hour.
    Throttled { retry_job: JobId, delay: Duration },
}

/// Run the state machine, marking the record `Failed` (best-effort) on any
/// error other than a missing record.
pub(crate) async fn process_job(
    context: &WorkerContext,
    job: &DeliveryJob,
) -> Result<Outcome, ProcessError> {
    match execute(context, job).await {
        Ok(outcome) => Ok(outcome),
        Err(error) => {
            if !matches!(error, ProcessError::RecordMissing(_)) {
                if let Err(update_error) = context
                    .store
                    .update_status(&job.record_id, DeliveryStatus::Failed)
                    .await
                {
                    // Logged only; never mask the original error.
                    warn!(
                        record = %job.record_id,
                        error = %update_error,
                        "could not mark record failed"
                    );
                }
            }
            Err(error)
        }
    }
}

async fn execute(context: &WorkerContext, job: &DeliveryJob) -> Result<Outcome, ProcessError> {
    // 1. Idempotency: the record is the source of truth, not the job.
    let record = match context.store.read(&job.record_id).await {
        Ok(record) => record,
        Err(StoreError::NotFound(id)) => return Err(ProcessError::RecordMissing(id)),
        Err(error) => return Err(error.into()),
    };
    if record.status == DeliveryStatus::Sent {
        return Ok(Outcome::AlreadySent);
    }

    // 2. Quota check. Not an increment; that happens only after a send.
    let decision = context.limiter.check(&job.sender_id, job.hourly_limit);
    if !decision.allowed {
        match context
            .store
            .update_status(&job.record_id, DeliveryStatus::Throttled)
            .await
        {
            Ok(()) => {}
            Err(StoreError::NotFound(id)) => return Err(ProcessError::RecordMissing(id)),
            Err(error) => return Err(error.into()),
        }

        let delay = delay_until_next_hour(Local::now());
        let retry_job = context.queue.enqueue(job.rescheduled(), delay);
        debug!(
            record = %job.record_id,
            sender = %job.sender_id,
            current = decision.current,
            limit = decision.limit,
            delay_secs = delay.as_secs(),
            "hourly quota exhausted, deferring to next hour"
        );
        return Ok(Outcome::Throttled { retry_job, delay });
    }

    // 3. Send.
    let receipt = context
        .transport
        .send(&job.recipient, &job.subject, &job.body)
        .await?;

    // 4. Finalize: count the send, then record it. A record deleted while
    // the send was in flight is a caller cancellation, not an error.
    let count = context.limiter.increment(&job.sender_id);
    match context
        .store
        .update_status(&job.record_id, DeliveryStatus::Sent)
        .await
    {
        Ok(()) => {}
        Err(StoreError::NotFound(_)) => {
            debug!(record = %job.record_id, "record deleted mid-flight, send already done");
        }
        Err(error) => return Err(error.into()),
    }

    debug!(
        record = %job.record_id,
        sender = %job.sender_id,
        hour_count = count,
        accepted_at = %receipt.accepted_at,
        "delivery recorded"
    );
    Ok(Outcome::Sent {
        pacing: job.pacing_delay(),
    })
}
