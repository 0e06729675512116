pub mod logging;
pub mod record;

pub use record::{
    DEFAULT_HOURLY_LIMIT, DeliveryRecord, DeliveryStatus, MIN_SEND_DELAY_SECS, RecordId,
};
pub use tracing;

/// Control signal broadcast to long-running tasks.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
}
