use async_trait::async_trait;
use courier_common::{DeliveryRecord, DeliveryStatus, RecordId};

use crate::Result;

/// Maximum number of records returned by a listing.
pub const LIST_CAP: usize = 100;

/// Storage backend for delivery records
///
/// Implementations must be safe for concurrent use: the scheduling API and
/// every delivery worker share one store handle.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new record, returning its id.
    async fn create(&self, record: DeliveryRecord) -> Result<RecordId>;

    /// Fetch a record by id.
    async fn read(&self, id: &RecordId) -> Result<DeliveryRecord>;

    /// Fetch a record by id, visible only if it belongs to `sender_id`.
    async fn read_for_sender(&self, id: &RecordId, sender_id: &str) -> Result<DeliveryRecord>;

    /// Change a record's status.
    ///
    /// Fails with [`StoreError::InvalidTransition`](crate::StoreError) if the
    /// record is already in a terminal status.
    async fn update_status(&self, id: &RecordId, status: DeliveryStatus) -> Result<()>;

    /// Delete a record. Absent records fail with `NotFound`.
    async fn delete(&self, id: &RecordId) -> Result<()>;

    /// List records for a sender, newest first, capped at [`LIST_CAP`].
    async fn list_by_sender(
        &self,
        sender_id: &str,
        status: Option<DeliveryStatus>,
    ) -> Result<Vec<DeliveryRecord>>;
}
