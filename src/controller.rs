use std::sync::{Arc, LazyLock};

use courier_common::{Signal, internal, logging, tracing};
use courier_delivery::{
    DeliveryConfig, DeliveryWorkerPool, HourlyRateLimiter, JobQueue, LogTransport, MailTransport,
    Scheduler, WorkerContext,
};
use courier_store::{MemoryRecordStore, RecordStore};
use serde::Deserialize;
use tokio::sync::broadcast;

/// Top-level configuration and runner for the delivery engine
#[derive(Default, Deserialize)]
pub struct Courier {
    #[serde(default)]
    delivery: DeliveryConfig,
    #[serde(default)]
    store: StoreConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// Maximum records held in memory. Absent means unlimited.
    pub capacity: Option<usize>,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    Ok(())
}

impl Courier {
    /// Run the delivery engine until a shutdown signal arrives
    ///
    /// Workers finish the job they hold before exiting.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker task panics or signal handlers cannot
    /// be installed.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let store: Arc<dyn RecordStore> = match self.store.capacity {
            Some(capacity) => Arc::new(MemoryRecordStore::with_capacity(capacity)),
            None => Arc::new(MemoryRecordStore::new()),
        };
        let queue = Arc::new(JobQueue::new(
            self.delivery.retry.clone(),
            self.delivery.retention.clone(),
        ));
        let limiter = Arc::new(HourlyRateLimiter::new());
        let transport: Arc<dyn MailTransport> = Arc::new(LogTransport::default());

        let context = WorkerContext {
            store: Arc::clone(&store),
            queue: Arc::clone(&queue),
            limiter,
            transport,
        };
        let scheduler = Scheduler::new(store, queue);
        let pool = DeliveryWorkerPool::new(context, self.delivery.pool.clone());

        internal!(level = INFO, "Controller running");

        let serve = pool.serve(SHUTDOWN_BROADCAST.subscribe());
        tokio::pin!(serve);

        // The pool only returns once every worker has finished the job it
        // holds, so after broadcasting shutdown we keep driving it rather
        // than dropping it mid-flight.
        let ret = tokio::select! {
            r = &mut serve => r.map_err(Into::into),
            r = shutdown() => {
                r?;
                serve.await.map_err(Into::into)
            }
        };

        let stats = scheduler.stats();
        tracing::info!(
            waiting = stats.waiting,
            active = stats.active,
            completed = stats.completed,
            failed = stats.failed,
            "Shutting down..."
        );

        ret
    }
}
