//! Retention for finished jobs
//!
//! Completed and failed jobs stay queryable for a while, but the queue must
//! not grow without bound. Completed jobs are pruned aggressively; failed
//! jobs are kept in larger numbers for diagnostics.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Deserialize;

use super::{JobEntry, JobId, JobState};

const fn default_retain_completed() -> usize {
    100
}

const fn default_completed_max_age_secs() -> u64 {
    3600
}

const fn default_retain_failed() -> usize {
    500
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionPolicy {
    /// Most recent completed jobs to keep.
    #[serde(default = "default_retain_completed")]
    pub retain_completed: usize,

    /// Completed jobs older than this are pruned regardless of count.
    #[serde(default = "default_completed_max_age_secs")]
    pub completed_max_age_secs: u64,

    /// Failed jobs to keep for diagnostics.
    #[serde(default = "default_retain_failed")]
    pub retain_failed: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            retain_completed: default_retain_completed(),
            completed_max_age_secs: default_completed_max_age_secs(),
            retain_failed: default_retain_failed(),
        }
    }
}

pub(super) fn prune(jobs: &DashMap<JobId, JobEntry>, policy: &RetentionPolicy) {
    let now = SystemTime::now();
    let max_age = Duration::from_secs(policy.completed_max_age_secs);

    jobs.retain(|_, entry| {
        entry.state != JobState::Completed
            || entry.finished_at.is_none_or(|at| {
                now.duration_since(at).unwrap_or(Duration::ZERO) <= max_age
            })
    });

    prune_oldest(jobs, JobState::Completed, policy.retain_completed);
    prune_oldest(jobs, JobState::Failed, policy.retain_failed);
}

fn prune_oldest(jobs: &DashMap<JobId, JobEntry>, state: JobState, retain: usize) {
    let mut finished: Vec<(JobId, SystemTime)> = jobs
        .iter()
        .filter(|entry| entry.value().state == state)
        .map(|entry| {
            (
                entry.key().clone(),
                entry.value().finished_at.unwrap_or(UNIX_EPOCH),
            )
        })
        .collect();

    if finished.len() <= retain {
        return;
    }

    finished.sort_by_key(|(_, at)| *at);
    let excess = finished.len() - retain;
    for (id, _) in finished.into_iter().take(excess) {
        jobs.remove(&id);
    }
}
