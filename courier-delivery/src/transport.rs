//! Mail transport boundary
//!
//! The engine treats the actual send as a black box: a transport either
//! accepts a message and returns a receipt, or fails. Failures feed the
//! queue's retry policy.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

/// Receipt returned by a transport once it has accepted a message.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub accepted_at: DateTime<Utc>,
    /// Transport-specific detail, e.g. a remote queue id.
    pub detail: Option<String>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to reach the mail relay.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The relay refused the message.
    #[error("message rejected: {0}")]
    Rejected(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability to hand a message to the outside world.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<DeliveryReceipt, TransportError>;
}

/// Transport that logs instead of sending
///
/// Useful for running the daemon without a relay and for smoke tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<DeliveryReceipt, TransportError> {
        info!(
            recipient = recipient,
            subject = subject,
            bytes = body.len(),
            "log transport accepting message"
        );
        Ok(DeliveryReceipt {
            accepted_at: Utc::now(),
            detail: None,
        })
    }
}
