use courier_common::{DeliveryStatus, RecordId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// No record with this id (or none visible to the calling sender).
    #[error("record not found: {0}")]
    NotFound(RecordId),

    /// The requested status change would move a record out of a terminal
    /// status.
    #[error("record {id} is {current}, cannot become {requested}")]
    InvalidTransition {
        id: RecordId,
        current: DeliveryStatus,
        requested: DeliveryStatus,
    },

    /// A lock protecting the backing data was poisoned.
    #[error("store lock poisoned: {0}")]
    Lock(String),

    /// Other internal errors.
    #[error("internal store error: {0}")]
    Internal(String),
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(error: std::sync::PoisonError<T>) -> Self {
        Self::Lock(error.to_string())
    }
}
