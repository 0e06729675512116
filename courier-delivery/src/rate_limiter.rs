//! Per-sender rate limiting over calendar-hour buckets
//!
//! Each sender gets one counter per local calendar hour. The check and the
//! increment are deliberately split: a worker checks the quota before
//! sending and increments only after the transport accepts the message, so
//! a failed send never consumes quota.
//!
//! Two workers racing on the same sender in the same hour can both pass the
//! check and jointly exceed the limit by at most the number of racing
//! workers. That slack is accepted; the limit is a throughput target, not a
//! hard cap.

use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike, Local, Timelike};
use dashmap::DashMap;

/// How long a bucket lives after its first increment.
const BUCKET_TTL: Duration = Duration::from_secs(3600);

/// Answer to a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub current: u32,
    pub limit: u32,
}

#[derive(Debug)]
struct Bucket {
    count: u32,
    expires_at: Instant,
}

/// Shared per-sender hourly counters
#[derive(Debug, Default)]
pub struct HourlyRateLimiter {
    buckets: DashMap<String, Bucket>,
}

impl HourlyRateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Key: sender plus the local calendar hour, so sends straddling an hour
    /// boundary land in independent buckets.
    fn bucket_key(sender_id: &str, now: DateTime<Local>) -> String {
        format!(
            "{sender_id}:{}-{}-{}-{}",
            now.year(),
            now.month(),
            now.day(),
            now.hour()
        )
    }

    /// Read the current hour's count for the sender. Does not increment.
    pub fn check(&self, sender_id: &str, limit: u32) -> RateDecision {
        let key = Self::bucket_key(sender_id, Local::now());
        let current = self.buckets.get(&key).map_or(0, |bucket| {
            if bucket.expires_at <= Instant::now() {
                0
            } else {
                bucket.count
            }
        });

        RateDecision {
            allowed: current < limit,
            current,
            limit,
        }
    }

    /// Record one successful send for the sender's current hour bucket.
    ///
    /// The increment that takes the count from 0 to 1 stamps the bucket's
    /// expiry, so stale buckets self-clean.
    pub fn increment(&self, sender_id: &str) -> u32 {
        self.sweep();

        let key = Self::bucket_key(sender_id, Local::now());
        let mut bucket = self.buckets.entry(key).or_insert_with(|| Bucket {
            count: 0,
            expires_at: Instant::now() + BUCKET_TTL,
        });

        if bucket.expires_at <= Instant::now() {
            bucket.count = 0;
            bucket.expires_at = Instant::now() + BUCKET_TTL;
        }
        bucket.count += 1;
        bucket.count
    }

    /// Number of live buckets (for stats/debugging)
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn sweep(&self) {
        let now = Instant::now();
        self.buckets.retain(|_, bucket| bucket.expires_at > now);
    }
}

/// Time until the top of the next clock hour, used to reschedule throttled
/// work. Always in `1..=3600` seconds.
#[must_use]
pub fn delay_until_next_hour(now: DateTime<Local>) -> Duration {
    let into_hour = u64::from(now.minute()) * 60 + u64::from(now.second());
    Duration::from_secs(3600 - into_hour)
}
