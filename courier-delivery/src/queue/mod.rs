//! Delayed job queue
//!
//! Jobs carry a target execution time; the queue holds not-yet-ready jobs
//! without consuming worker capacity and hands out ready jobs one claimant
//! at a time. Completion and failure are explicit acknowledgements from the
//! worker; failures run through the retry policy before a job is marked
//! failed terminally.

pub mod cleanup;
pub mod retry;

use std::time::{Duration, SystemTime};

use courier_common::{DeliveryRecord, RecordId};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::trace;

use crate::error::ProcessError;

pub use cleanup::RetentionPolicy;
pub use retry::RetryPolicy;

/// Fallback poll interval while the queue has no pending work.
const IDLE_POLL: Duration = Duration::from_millis(500);

/// Identifier for a queued job
///
/// The initial attempt for a record reuses the record id; throttle
/// reschedules derive a fresh id from the record id plus a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    #[must_use]
    pub fn initial(record_id: &RecordId) -> Self {
        Self(record_id.to_string())
    }

    /// Id for a throttle-triggered reschedule: `<recordId>-retry-<millis>`.
    #[must_use]
    pub fn rescheduled(record_id: &RecordId) -> Self {
        Self(format!(
            "{record_id}-retry-{}",
            chrono::Utc::now().timestamp_millis()
        ))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A queued unit of delivery work
///
/// Carries a copy of the record's payload and settings as they were at
/// enqueue time, plus the target execution time.
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    pub id: JobId,
    pub record_id: RecordId,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub sender_id: String,
    pub send_delay_secs: u64,
    pub hourly_limit: u32,
    /// Target execution time; the queue stamps this on enqueue.
    pub run_at: SystemTime,
    /// Failed processing attempts so far.
    pub attempts: u32,
}

impl DeliveryJob {
    /// Job for a record's first delivery attempt.
    #[must_use]
    pub fn initial(record: &DeliveryRecord) -> Self {
        Self {
            id: JobId::initial(&record.id),
            record_id: record.id.clone(),
            recipient: record.recipient.clone(),
            subject: record.subject.clone(),
            body: record.body.clone(),
            sender_id: record.sender_id.clone(),
            send_delay_secs: record.send_delay_secs,
            hourly_limit: record.hourly_limit,
            run_at: SystemTime::now(),
            attempts: 0,
        }
    }

    /// Fresh job carrying the same payload, used when a throttled delivery
    /// is deferred to the next hour. The original job is considered consumed.
    #[must_use]
    pub fn rescheduled(&self) -> Self {
        Self {
            id: JobId::rescheduled(&self.record_id),
            run_at: SystemTime::now(),
            attempts: 0,
            ..self.clone()
        }
    }

    /// Pacing delay the worker owes after sending this job's message.
    #[must_use]
    pub fn pacing_delay(&self) -> Duration {
        Duration::from_secs(
            self.send_delay_secs
                .max(courier_common::MIN_SEND_DELAY_SECS),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobState {
    Pending,
    Active,
    Completed,
    Failed,
}

#[derive(Debug)]
pub(crate) struct JobEntry {
    pub(crate) job: DeliveryJob,
    pub(crate) state: JobState,
    pub(crate) finished_at: Option<SystemTime>,
    pub(crate) last_error: Option<String>,
}

/// Snapshot of queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Pending jobs whose target time has elapsed.
    pub waiting: usize,
    /// Jobs currently held by a worker.
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    /// Pending jobs whose target time is in the future.
    pub delayed: usize,
    /// `waiting + active + delayed`
    pub total: usize,
}

/// How the queue responded to a reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    /// The job was re-queued with a backoff delay.
    Retried { attempt: u32, delay: Duration },
    /// The job is failed terminally.
    Terminal,
}

/// Delayed job queue shared between the scheduling API and the worker pool
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: DashMap<JobId, JobEntry>,
    ready: Notify,
    retry: RetryPolicy,
    retention: RetentionPolicy,
}

impl JobQueue {
    #[must_use]
    pub fn new(retry: RetryPolicy, retention: RetentionPolicy) -> Self {
        Self {
            jobs: DashMap::new(),
            ready: Notify::new(),
            retry,
            retention,
        }
    }

    /// Add a job, to run once `delay` has elapsed.
    pub fn enqueue(&self, mut job: DeliveryJob, delay: Duration) -> JobId {
        job.run_at = SystemTime::now() + delay;
        let id = job.id.clone();

        trace!(job = %id, delay_secs = delay.as_secs(), "enqueueing job");
        self.jobs.insert(
            id.clone(),
            JobEntry {
                job,
                state: JobState::Pending,
                finished_at: None,
                last_error: None,
            },
        );
        self.ready.notify_one();
        id
    }

    /// Claim the next ready job, suspending until one becomes ready.
    ///
    /// The returned job is `Active` and invisible to removal until the
    /// claimant acknowledges it via [`complete`](Self::complete) or
    /// [`fail`](Self::fail).
    pub async fn claim(&self) -> DeliveryJob {
        loop {
            let now = SystemTime::now();
            let mut due: Option<(JobId, SystemTime)> = None;
            let mut next_wake: Option<SystemTime> = None;

            for entry in self.jobs.iter() {
                if entry.value().state != JobState::Pending {
                    continue;
                }
                let run_at = entry.value().job.run_at;
                if run_at <= now {
                    if due.as_ref().is_none_or(|(_, at)| run_at < *at) {
                        due = Some((entry.key().clone(), run_at));
                    }
                } else if next_wake.is_none_or(|at| run_at < at) {
                    next_wake = Some(run_at);
                }
            }

            if let Some((id, _)) = due {
                if let Some(mut entry) = self.jobs.get_mut(&id) {
                    if entry.value().state == JobState::Pending {
                        entry.value_mut().state = JobState::Active;
                        return entry.value().job.clone();
                    }
                }
                // Another worker won the race; look again.
                continue;
            }

            let wait = next_wake.map_or(IDLE_POLL, |at| {
                at.duration_since(now).unwrap_or(Duration::ZERO)
            });
            tokio::select! {
                () = self.ready.notified() => {}
                () = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Remove a pending job. Active jobs run to completion and return false.
    pub fn remove(&self, id: &JobId) -> bool {
        self.jobs
            .remove_if(id, |_, entry| entry.state == JobState::Pending)
            .is_some()
    }

    /// Best-effort removal of every pending job referencing the record,
    /// including throttle reschedules. Returns whether anything was removed.
    pub fn remove_for_record(&self, record_id: &RecordId) -> bool {
        let pending: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|entry| {
                entry.value().state == JobState::Pending
                    && entry.value().job.record_id == *record_id
            })
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = false;
        for id in pending {
            removed |= self.remove(&id);
        }
        removed
    }

    /// Acknowledge successful processing.
    pub fn complete(&self, id: &JobId) {
        if let Some(mut entry) = self.jobs.get_mut(id) {
            entry.value_mut().state = JobState::Completed;
            entry.value_mut().finished_at = Some(SystemTime::now());
        }
        cleanup::prune(&self.jobs, &self.retention);
    }

    /// Acknowledge a processing failure.
    ///
    /// Permanent errors and exhausted budgets mark the job failed; anything
    /// else re-queues it with exponential backoff.
    pub fn fail(&self, id: &JobId, error: &ProcessError) -> RetryDisposition {
        let disposition = {
            let Some(mut entry) = self.jobs.get_mut(id) else {
                return RetryDisposition::Terminal;
            };
            let entry = entry.value_mut();
            entry.last_error = Some(error.to_string());
            entry.job.attempts += 1;
            let attempts = entry.job.attempts;

            if error.is_permanent() || attempts >= self.retry.max_attempts {
                entry.state = JobState::Failed;
                entry.finished_at = Some(SystemTime::now());
                RetryDisposition::Terminal
            } else {
                let delay = self.retry.backoff_delay(attempts);
                entry.job.run_at = SystemTime::now() + delay;
                entry.state = JobState::Pending;
                RetryDisposition::Retried {
                    attempt: attempts,
                    delay,
                }
            }
        };

        match disposition {
            RetryDisposition::Terminal => cleanup::prune(&self.jobs, &self.retention),
            RetryDisposition::Retried { .. } => self.ready.notify_one(),
        }
        disposition
    }

    /// Snapshot of per-state counters.
    #[must_use]
    pub fn counts(&self) -> QueueStats {
        let now = SystemTime::now();
        let mut stats = QueueStats::default();

        for entry in self.jobs.iter() {
            match entry.value().state {
                JobState::Pending => {
                    if entry.value().job.run_at <= now {
                        stats.waiting += 1;
                    } else {
                        stats.delayed += 1;
                    }
                }
                JobState::Active => stats.active += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
            }
        }

        stats.total = stats.waiting + stats.active + stats.delayed;
        stats
    }

    /// Look up a job's current payload (any state).
    #[must_use]
    pub fn get(&self, id: &JobId) -> Option<DeliveryJob> {
        self.jobs.get(id).map(|entry| entry.value().job.clone())
    }

    /// Last error recorded for a job, if it has failed at least once.
    #[must_use]
    pub fn last_error(&self, id: &JobId) -> Option<String> {
        self.jobs
            .get(id)
            .and_then(|entry| entry.value().last_error.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
