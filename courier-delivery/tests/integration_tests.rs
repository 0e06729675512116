//! Integration tests for the delivery scheduling engine

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use std::{sync::Arc, time::Duration};

use chrono::{Local, Utc};
use courier_common::Signal;
use courier_delivery::{
    DeliveryJob, DeliveryStatus, DeliveryWorkerPool, HourlyRateLimiter, JobQueue, MailTransport,
    Outcome, PoolConfig, ProcessError, Scheduler, SchedulerError, SubmitRequest, WorkerContext,
    delay_until_next_hour,
};
use courier_store::{MemoryRecordStore, RecordStore, StoreError};
use support::mock_transport::MockTransport;
use tokio::time::timeout;

struct Harness {
    store: Arc<MemoryRecordStore>,
    queue: Arc<JobQueue>,
    limiter: Arc<HourlyRateLimiter>,
    transport: Arc<MockTransport>,
    context: WorkerContext,
    scheduler: Scheduler,
}

fn harness(transport: MockTransport) -> Harness {
    let store = Arc::new(MemoryRecordStore::new());
    let queue = Arc::new(JobQueue::default());
    let limiter = Arc::new(HourlyRateLimiter::new());
    let transport = Arc::new(transport);

    let context = WorkerContext {
        store: store.clone(),
        queue: queue.clone(),
        limiter: limiter.clone(),
        transport: transport.clone(),
    };
    let scheduler = Scheduler::new(store.clone(), queue.clone());

    Harness {
        store,
        queue,
        limiter,
        transport,
        context,
        scheduler,
    }
}

fn request(sender: &str) -> SubmitRequest {
    SubmitRequest {
        recipient: "a@b.com".to_string(),
        subject: "S".to_string(),
        body: "B".to_string(),
        sender_id: sender.to_string(),
        ..SubmitRequest::default()
    }
}

async fn claim(harness: &Harness) -> DeliveryJob {
    timeout(Duration::from_secs(1), harness.queue.claim())
        .await
        .expect("expected a ready job")
}

#[tokio::test]
async fn submit_without_schedule_is_immediate() {
    let harness = harness(MockTransport::new());

    let receipt = harness.scheduler.submit(request("sender-1")).await.unwrap();
    assert_eq!(receipt.delay, Duration::ZERO);

    let stats = harness.scheduler.stats();
    assert_eq!(stats.waiting, 1);
    assert_eq!(stats.delayed, 0);
    assert_eq!(stats.total, 1);

    let job = claim(&harness).await;
    assert_eq!(job.id, receipt.job_id);
    assert_eq!(job.record_id, receipt.record_id);
}

#[tokio::test]
async fn submit_with_future_schedule_is_delayed() {
    let harness = harness(MockTransport::new());

    let at = (Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
    let receipt = harness
        .scheduler
        .submit(SubmitRequest {
            scheduled_at: Some(at),
            ..request("sender-1")
        })
        .await
        .unwrap();

    assert!(receipt.delay > Duration::from_secs(3590));
    let stats = harness.scheduler.stats();
    assert_eq!(stats.delayed, 1);
    assert_eq!(stats.waiting, 0);

    let record = harness
        .scheduler
        .get(&receipt.record_id, "sender-1")
        .await
        .unwrap();
    assert!(record.scheduled_at.is_some());
}

#[tokio::test]
async fn past_schedule_creates_nothing() {
    let harness = harness(MockTransport::new());

    let result = harness
        .scheduler
        .submit(SubmitRequest {
            scheduled_at: Some("2001-01-01T00:00:00Z".to_string()),
            ..request("sender-1")
        })
        .await;

    assert!(matches!(result, Err(SchedulerError::InvalidSchedule(_))));
    assert!(harness.store.is_empty());
    assert_eq!(harness.scheduler.stats().total, 0);
}

#[tokio::test]
async fn malformed_recipient_creates_nothing() {
    let harness = harness(MockTransport::new());

    let result = harness
        .scheduler
        .submit(SubmitRequest {
            recipient: "not an address".to_string(),
            ..request("sender-1")
        })
        .await;

    assert!(matches!(result, Err(SchedulerError::InvalidRecipient(_))));
    assert!(harness.store.is_empty());
    assert!(harness.queue.is_empty());
}

#[tokio::test]
async fn end_to_end_send_marks_record_and_counts() {
    let harness = harness(MockTransport::new());

    let receipt = harness.scheduler.submit(request("sender-1")).await.unwrap();
    let job = claim(&harness).await;

    let outcome = harness.context.process(&job).await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Sent {
            pacing: Duration::from_secs(2)
        }
    );
    harness.queue.complete(&job.id);

    let record = harness.store.read(&receipt.record_id).await.unwrap();
    assert_eq!(record.status, DeliveryStatus::Sent);
    assert_eq!(harness.transport.sent_count(), 1);
    assert_eq!(harness.transport.sent()[0].recipient, "a@b.com");
    assert_eq!(harness.limiter.check("sender-1", 10).current, 1);

    let stats = harness.scheduler.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.total, 0);
}

#[tokio::test]
async fn pacing_honors_the_requested_delay() {
    let harness = harness(MockTransport::new());

    harness
        .scheduler
        .submit(SubmitRequest {
            send_delay_secs: Some(5),
            ..request("sender-1")
        })
        .await
        .unwrap();
    let job = claim(&harness).await;

    let outcome = harness.context.process(&job).await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Sent {
            pacing: Duration::from_secs(5)
        }
    );
}

#[tokio::test]
async fn already_sent_records_are_not_resent() {
    let harness = harness(MockTransport::new());

    harness.scheduler.submit(request("sender-1")).await.unwrap();
    let job = claim(&harness).await;
    harness.context.process(&job).await.unwrap();
    harness.queue.complete(&job.id);

    // Replay the same work: a second job referencing the same record.
    let record = harness.store.read(&job.record_id).await.unwrap();
    let replay = DeliveryJob::initial(&record).rescheduled();
    harness.queue.enqueue(replay, Duration::ZERO);
    let replayed = claim(&harness).await;

    let outcome = harness.context.process(&replayed).await.unwrap();
    assert_eq!(outcome, Outcome::AlreadySent);
    assert_eq!(harness.transport.sent_count(), 1);
    assert_eq!(harness.limiter.check("sender-1", 10).current, 1);
}

#[tokio::test]
async fn over_quota_senders_are_throttled_to_the_next_hour() {
    let harness = harness(MockTransport::new());

    let limited = |sender: &str| SubmitRequest {
        hourly_limit: Some(1),
        ..request(sender)
    };

    harness.scheduler.submit(limited("sender-1")).await.unwrap();
    let first = claim(&harness).await;
    assert!(matches!(
        harness.context.process(&first).await.unwrap(),
        Outcome::Sent { .. }
    ));
    harness.queue.complete(&first.id);

    let second_receipt = harness.scheduler.submit(limited("sender-1")).await.unwrap();
    let second = claim(&harness).await;
    let outcome = harness.context.process(&second).await.unwrap();
    harness.queue.complete(&second.id);

    let Outcome::Throttled { retry_job, delay } = outcome else {
        panic!("expected throttle, got {outcome:?}");
    };

    let record = harness
        .store
        .read(&second_receipt.record_id)
        .await
        .unwrap();
    assert_eq!(record.status, DeliveryStatus::Throttled);

    // Rescheduled job id derives from the record id, and its delay is the
    // time to the next hour boundary, within tolerance.
    assert!(
        retry_job
            .as_str()
            .starts_with(&second_receipt.record_id.to_string())
    );
    assert!(retry_job.as_str().contains("-retry-"));

    let expected = delay_until_next_hour(Local::now());
    let tolerance = Duration::from_secs(2);
    assert!(delay <= expected + tolerance && delay + tolerance >= expected);

    let stats = harness.scheduler.stats();
    assert_eq!(stats.delayed, 1);

    // The other sender is unaffected.
    harness.scheduler.submit(limited("sender-2")).await.unwrap();
    let other = claim(&harness).await;
    assert!(matches!(
        harness.context.process(&other).await.unwrap(),
        Outcome::Sent { .. }
    ));
}

#[tokio::test]
async fn transport_failures_mark_failed_and_retry() {
    let harness = harness(MockTransport::failing(usize::MAX));

    let receipt = harness.scheduler.submit(request("sender-1")).await.unwrap();
    let job = claim(&harness).await;

    let error = harness.context.process(&job).await.unwrap_err();
    assert!(matches!(error, ProcessError::Transport(_)));
    assert!(!error.is_permanent());

    // Step 6: record marked failed without masking the error.
    let record = harness.store.read(&receipt.record_id).await.unwrap();
    assert_eq!(record.status, DeliveryStatus::Failed);

    // No quota consumed by the failed send.
    assert_eq!(harness.limiter.check("sender-1", 10).current, 0);
}

#[tokio::test]
async fn deleted_record_fails_permanently() {
    let harness = harness(MockTransport::new());

    let receipt = harness.scheduler.submit(request("sender-1")).await.unwrap();
    let job = claim(&harness).await;
    harness.store.delete(&receipt.record_id).await.unwrap();

    let error = harness.context.process(&job).await.unwrap_err();
    assert!(matches!(error, ProcessError::RecordMissing(_)));
    assert!(error.is_permanent());

    // Terminal straight away; the retry budget does not apply.
    assert_eq!(
        harness.queue.fail(&job.id, &error),
        courier_delivery::RetryDisposition::Terminal
    );
    assert_eq!(harness.scheduler.stats().failed, 1);
}

#[tokio::test]
async fn cancel_waiting_removes_record_and_job() {
    let harness = harness(MockTransport::new());

    let at = (Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
    let receipt = harness
        .scheduler
        .submit(SubmitRequest {
            scheduled_at: Some(at),
            ..request("sender-1")
        })
        .await
        .unwrap();

    let removed = harness
        .scheduler
        .cancel(&receipt.record_id, "sender-1")
        .await
        .unwrap();
    assert!(removed);

    assert!(matches!(
        harness.store.read(&receipt.record_id).await,
        Err(StoreError::NotFound(_))
    ));
    assert_eq!(harness.scheduler.stats().total, 0);
}

#[tokio::test]
async fn cancel_is_scoped_to_the_sender() {
    let harness = harness(MockTransport::new());

    let receipt = harness.scheduler.submit(request("sender-1")).await.unwrap();

    let result = harness
        .scheduler
        .cancel(&receipt.record_id, "someone-else")
        .await;
    assert!(matches!(result, Err(SchedulerError::NotFound(_))));

    // Record untouched.
    assert!(harness.store.read(&receipt.record_id).await.is_ok());
}

#[tokio::test]
async fn cancel_after_claim_lets_the_send_finish() {
    let harness = harness(MockTransport::with_delay(Duration::from_millis(300)));

    let receipt = harness.scheduler.submit(request("sender-1")).await.unwrap();
    let job = claim(&harness).await;

    let context = harness.context.clone();
    let in_flight = tokio::spawn(async move { context.process(&job).await });

    // Cancel while the transport is mid-send: the job is active so nothing
    // is removed from the queue, but the record goes away.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let removed = harness
        .scheduler
        .cancel(&receipt.record_id, "sender-1")
        .await
        .unwrap();
    assert!(!removed);

    // The in-flight send still completes without raising.
    let outcome = in_flight.await.unwrap().unwrap();
    assert!(matches!(outcome, Outcome::Sent { .. }));
    assert_eq!(harness.transport.sent_count(), 1);
    assert!(harness.store.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn pool_drives_submissions_to_sent() {
    let harness = harness(MockTransport::new());

    let pool = DeliveryWorkerPool::new(harness.context.clone(), PoolConfig::default());
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let serving = tokio::spawn(async move { pool.serve(shutdown_rx).await });

    let receipt = harness.scheduler.submit(request("sender-1")).await.unwrap();

    // Poll until the worker pool has sent the message.
    let sent = timeout(Duration::from_secs(5), async {
        loop {
            let record = harness.store.read(&receipt.record_id).await.unwrap();
            if record.status == DeliveryStatus::Sent {
                break record;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("pool did not deliver in time");

    assert_eq!(sent.status, DeliveryStatus::Sent);
    assert_eq!(harness.transport.sent_count(), 1);

    shutdown_tx.send(Signal::Shutdown).unwrap();
    timeout(Duration::from_secs(5), serving)
        .await
        .expect("pool did not shut down")
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_drains_in_flight_sends() {
    let harness = harness(MockTransport::with_delay(Duration::from_secs(1)));

    let receipt = harness.scheduler.submit(request("sender-1")).await.unwrap();

    let pool = DeliveryWorkerPool::new(harness.context.clone(), PoolConfig::default());
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);

    let serve = pool.serve(shutdown_rx);
    tokio::pin!(serve);

    // Shutdown arrives while the send is still in flight; the pool must be
    // driven to completion so the worker finishes the job it holds.
    let trigger = async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        shutdown_tx.send(Signal::Shutdown).unwrap();
    };

    tokio::select! {
        r = &mut serve => r.unwrap(),
        () = trigger => timeout(Duration::from_secs(5), serve)
            .await
            .expect("pool did not drain")
            .unwrap(),
    }

    let record = harness.store.read(&receipt.record_id).await.unwrap();
    assert_eq!(record.status, DeliveryStatus::Sent);
    assert_eq!(harness.transport.sent_count(), 1);
    assert_eq!(harness.scheduler.stats().active, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_budget_is_exact_under_concurrency() {
    let transport = MockTransport::failing(1);

    let (a, b, c, d) = tokio::join!(
        transport.send("a@b.com", "S", "B"),
        transport.send("a@b.com", "S", "B"),
        transport.send("a@b.com", "S", "B"),
        transport.send("a@b.com", "S", "B"),
    );

    let failures = [&a, &b, &c, &d]
        .into_iter()
        .filter(|result| result.is_err())
        .count();
    assert_eq!(failures, 1);
    assert_eq!(transport.sent_count(), 3);
}
