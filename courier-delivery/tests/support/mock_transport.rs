//! Configurable mock mail transport for delivery tests
//!
//! Can fail a configurable number of leading sends, delay each send to
//! widen the in-flight window, and records everything it accepted for
//! later verification.

#![allow(dead_code)] // Test utility module - not all methods used in every test

use std::{
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use courier_delivery::{DeliveryReceipt, MailTransport, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Default)]
pub struct MockTransport {
    sent: Mutex<Vec<SentMail>>,
    /// Number of leading sends to fail before accepting.
    fail_first: AtomicUsize,
    /// Artificial latency per send.
    send_delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport that fails the first `times` sends with a connection error.
    pub fn failing(times: usize) -> Self {
        let transport = Self::default();
        transport.fail_first.store(times, Ordering::SeqCst);
        transport
    }

    /// Transport that takes `delay` per send before accepting.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            send_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or_default()
    }
}

#[async_trait]
impl MailTransport for MockTransport {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<DeliveryReceipt, TransportError> {
        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }

        // Single atomic decrement, so the budget stays exact when several
        // workers send concurrently.
        let should_fail = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if should_fail {
            return Err(TransportError::Connection(
                "mock transport offline".to_string(),
            ));
        }

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentMail {
                recipient: recipient.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
        }

        Ok(DeliveryReceipt {
            accepted_at: Utc::now(),
            detail: Some("mock".to_string()),
        })
    }
}
