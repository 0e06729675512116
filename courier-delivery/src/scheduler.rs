//! Scheduling API
//!
//! The boundary callers use to submit new deliveries, cancel them, and read
//! queue statistics. Validation happens here, synchronously; everything past
//! submission is observable only through record status and queue stats.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use courier_common::{DeliveryRecord, DeliveryStatus, RecordId};
use courier_store::RecordStore;
use mailparse::MailAddr;
use tracing::info;

use crate::{
    error::SchedulerError,
    queue::{DeliveryJob, JobId, JobQueue, QueueStats},
};

/// A new delivery request, as received from the outer surface.
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub sender_id: String,
    /// RFC3339 send time; absent means "send now".
    pub scheduled_at: Option<String>,
    pub send_delay_secs: Option<u64>,
    pub hourly_limit: Option<u32>,
}

/// What a successful submission returns to the caller.
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub record_id: RecordId,
    pub job_id: JobId,
    /// Delay until the job becomes ready.
    pub delay: Duration,
}

/// Entry point for submitting, cancelling and inspecting delivery work
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn RecordStore>,
    queue: Arc<JobQueue>,
}

impl Scheduler {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, queue: Arc<JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Validate and accept a delivery request.
    ///
    /// Creates a `Pending` record and enqueues the initial job with a delay
    /// of `max(0, scheduled_at - now)`. Nothing is created when validation
    /// fails.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidRecipient`] for a malformed address,
    /// [`SchedulerError::InvalidSchedule`] for an unparsable or past send
    /// time, or a store failure.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitReceipt, SchedulerError> {
        validate_recipient(&request.recipient)?;

        let (scheduled_at, delay) = match request.scheduled_at.as_deref() {
            None => (None, Duration::ZERO),
            Some(raw) => {
                let at = parse_schedule(raw)?;
                (Some(at), delay_until(at))
            }
        };

        let mut record = DeliveryRecord::new(
            request.recipient,
            request.subject,
            request.body,
            request.sender_id,
        );
        record.scheduled_at = scheduled_at;
        if let Some(send_delay) = request.send_delay_secs {
            record.send_delay_secs = send_delay;
        }
        if let Some(limit) = request.hourly_limit {
            record.hourly_limit = limit;
        }

        let job = DeliveryJob::initial(&record);
        let record_id = self.store.create(record).await?;
        let job_id = self.queue.enqueue(job, delay);

        info!(
            record = %record_id,
            job = %job_id,
            delay_secs = delay.as_secs(),
            "delivery scheduled"
        );

        Ok(SubmitReceipt {
            record_id,
            job_id,
            delay,
        })
    }

    /// Cancel a delivery owned by `sender_id`.
    ///
    /// Removes any still-pending job for the record (a job already claimed
    /// by a worker runs to completion) and deletes the record. Returns
    /// whether a job was found and removed.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NotFound`] when no record with that id is visible
    /// to the sender.
    pub async fn cancel(
        &self,
        record_id: &RecordId,
        sender_id: &str,
    ) -> Result<bool, SchedulerError> {
        let record = self.store.read_for_sender(record_id, sender_id).await?;
        let removed = self.queue.remove_for_record(&record.id);
        self.store.delete(record_id).await?;

        info!(record = %record_id, job_removed = removed, "delivery cancelled");
        Ok(removed)
    }

    /// Read-only snapshot of the queue counters.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        self.queue.counts()
    }

    /// Fetch one record, scoped to the calling sender.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NotFound`] when the record is absent or owned by
    /// another sender.
    pub async fn get(
        &self,
        record_id: &RecordId,
        sender_id: &str,
    ) -> Result<DeliveryRecord, SchedulerError> {
        Ok(self.store.read_for_sender(record_id, sender_id).await?)
    }

    /// List the sender's records, newest first, optionally filtered by
    /// status.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn list(
        &self,
        sender_id: &str,
        status: Option<DeliveryStatus>,
    ) -> Result<Vec<DeliveryRecord>, SchedulerError> {
        Ok(self.store.list_by_sender(sender_id, status).await?)
    }
}

fn validate_recipient(raw: &str) -> Result<(), SchedulerError> {
    let parsed = mailparse::addrparse(raw)
        .map_err(|error| SchedulerError::InvalidRecipient(format!("{raw}: {error}")))?;

    if parsed.len() != 1 {
        return Err(SchedulerError::InvalidRecipient(raw.to_string()));
    }

    let valid = matches!(
        parsed.first(),
        Some(MailAddr::Single(single))
            if single
                .addr
                .split_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty())
    );

    if valid {
        Ok(())
    } else {
        Err(SchedulerError::InvalidRecipient(raw.to_string()))
    }
}

fn parse_schedule(raw: &str) -> Result<DateTime<Utc>, SchedulerError> {
    let at = DateTime::parse_from_rfc3339(raw)
        .map_err(|_| SchedulerError::InvalidSchedule(format!("unparsable time: {raw}")))?
        .with_timezone(&Utc);

    if at < Utc::now() {
        return Err(SchedulerError::InvalidSchedule(format!(
            "{raw} is in the past"
        )));
    }
    Ok(at)
}

fn delay_until(at: DateTime<Utc>) -> Duration {
    (at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}
