//! Delivery worker pool
//!
//! A bounded set of workers pulls ready jobs from the queue, runs the
//! delivery state machine, and acknowledges the result back to the queue.
//! Two brakes apply on top of the per-sender hourly quota: the pool size
//! itself, and a coarse cap on job starts per rolling window across the
//! whole pool.

pub mod process;

use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};

use courier_common::{Signal, internal};
use courier_store::RecordStore;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::{sync::broadcast, task::JoinSet};
use tracing::{debug, error, info, warn};

use crate::{
    error::{DeliveryError, ProcessError},
    queue::{DeliveryJob, JobQueue, RetryDisposition},
    rate_limiter::HourlyRateLimiter,
    transport::MailTransport,
};

pub use process::Outcome;

const fn default_workers() -> usize {
    3
}

const fn default_window_max_starts() -> usize {
    5
}

const fn default_window_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Number of concurrent delivery workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Job starts allowed per rolling window across the whole pool.
    /// Zero disables the brake.
    #[serde(default = "default_window_max_starts")]
    pub window_max_starts: usize,

    /// Length of the rolling start window, in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            window_max_starts: default_window_max_starts(),
            window_secs: default_window_secs(),
        }
    }
}

/// Shared handles every worker needs
///
/// Passed explicitly rather than held as globals, so pools are testable in
/// isolation and several pools can coexist in one process.
#[derive(Clone)]
pub struct WorkerContext {
    pub store: Arc<dyn RecordStore>,
    pub queue: Arc<JobQueue>,
    pub limiter: Arc<HourlyRateLimiter>,
    pub transport: Arc<dyn MailTransport>,
}

impl WorkerContext {
    /// Run the delivery state machine for one claimed job.
    ///
    /// # Errors
    ///
    /// Returns the [`ProcessError`] the queue should apply its retry policy
    /// to. The record has already been marked `Failed` (best-effort) when
    /// this returns an error.
    pub async fn process(&self, job: &DeliveryJob) -> Result<Outcome, ProcessError> {
        process::process_job(self, job).await
    }
}

/// Bounded pool of delivery workers
pub struct DeliveryWorkerPool {
    context: WorkerContext,
    config: PoolConfig,
    launch_window: Arc<Mutex<VecDeque<Instant>>>,
}

impl DeliveryWorkerPool {
    #[must_use]
    pub fn new(context: WorkerContext, config: PoolConfig) -> Self {
        Self {
            context,
            config,
            launch_window: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Run the pool until a shutdown signal arrives.
    ///
    /// Workers finish the job they hold before exiting; pacing pauses are
    /// interruptible, so shutdown is not delayed by a resting worker.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker task panics.
    pub async fn serve(
        &self,
        shutdown: broadcast::Receiver<Signal>,
    ) -> Result<(), DeliveryError> {
        internal!(
            level = INFO,
            "delivery worker pool starting with {} workers",
            self.config.workers
        );

        let mut join_set: JoinSet<()> = JoinSet::new();
        for worker_id in 0..self.config.workers {
            let context = self.context.clone();
            let config = self.config.clone();
            let launch_window = Arc::clone(&self.launch_window);
            let shutdown = shutdown.resubscribe();

            join_set.spawn(async move {
                worker_loop(worker_id, context, &config, &launch_window, shutdown).await;
            });
        }

        while let Some(result) = join_set.join_next().await {
            result?;
        }

        internal!(level = INFO, "delivery worker pool shut down");
        Ok(())
    }
}

async fn worker_loop(
    worker_id: usize,
    context: WorkerContext,
    config: &PoolConfig,
    launch_window: &Mutex<VecDeque<Instant>>,
    mut shutdown: broadcast::Receiver<Signal>,
) {
    debug!(worker = worker_id, "delivery worker ready");

    loop {
        let job = tokio::select! {
            job = context.queue.claim() => job,
            _ = shutdown.recv() => break,
        };

        acquire_start_slot(
            launch_window,
            config.window_max_starts,
            Duration::from_secs(config.window_secs),
        )
        .await;

        let job_id = job.id.clone();
        match context.process(&job).await {
            Ok(Outcome::Sent { pacing }) => {
                context.queue.complete(&job_id);
                info!(
                    worker = worker_id,
                    job = %job_id,
                    record = %job.record_id,
                    "delivery complete"
                );

                // Pacing: this worker stays off the queue until the delay
                // elapses. Other workers are unaffected.
                tokio::select! {
                    () = tokio::time::sleep(pacing) => {}
                    _ = shutdown.recv() => break,
                }
            }
            Ok(Outcome::AlreadySent) => {
                context.queue.complete(&job_id);
                debug!(worker = worker_id, job = %job_id, "record already sent, skipping");
            }
            Ok(Outcome::Throttled { retry_job, delay }) => {
                context.queue.complete(&job_id);
                info!(
                    worker = worker_id,
                    job = %job_id,
                    retry_job = %retry_job,
                    delay_secs = delay.as_secs(),
                    "sender over hourly quota, rescheduled"
                );
            }
            Err(err) => match context.queue.fail(&job_id, &err) {
                RetryDisposition::Retried { attempt, delay } => {
                    warn!(
                        worker = worker_id,
                        job = %job_id,
                        attempt = attempt,
                        delay_secs = delay.as_secs_f64(),
                        error = %err,
                        "delivery attempt failed, will retry"
                    );
                }
                RetryDisposition::Terminal => {
                    error!(
                        worker = worker_id,
                        job = %job_id,
                        error = %err,
                        "delivery failed terminally"
                    );
                }
            },
        }
    }

    debug!(worker = worker_id, "delivery worker stopped");
}

/// Global brake: at most `max_starts` job starts per rolling `span` across
/// the pool, independent of per-sender quotas.
async fn acquire_start_slot(window: &Mutex<VecDeque<Instant>>, max_starts: usize, span: Duration) {
    if max_starts == 0 {
        return;
    }

    loop {
        let wait = {
            let mut starts = window.lock();
            let now = Instant::now();
            while starts
                .front()
                .is_some_and(|at| now.duration_since(*at) >= span)
            {
                starts.pop_front();
            }

            if starts.len() < max_starts {
                starts.push_back(now);
                return;
            }

            starts
                .front()
                .map_or(Duration::ZERO, |oldest| {
                    span.saturating_sub(now.duration_since(*oldest))
                })
        };

        tokio::time::sleep(wait.max(Duration::from_millis(10))).await;
    }
}
