//! Durable record store for delivery requests
//!
//! The store tracks one [`DeliveryRecord`](courier_common::DeliveryRecord) per
//! submission and enforces the status lifecycle: `Sent` records never change
//! again. Backends implement [`RecordStore`]; the in-memory backend ships in
//! this crate and is used by tests and transient deployments.

pub mod backends;
pub mod error;
pub mod r#trait;

pub use backends::MemoryRecordStore;
pub use error::{Result, StoreError};
pub use r#trait::{LIST_CAP, RecordStore};
