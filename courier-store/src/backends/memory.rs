use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use courier_common::{DeliveryRecord, DeliveryStatus, RecordId};

use crate::{StoreError, r#trait::LIST_CAP, r#trait::RecordStore};

/// In-memory record store implementation
///
/// Records live in a `HashMap` behind an `RwLock`. Primarily intended for
/// testing, but usable for transient deployments where records do not need to
/// survive a restart.
///
/// # Capacity Management
/// The store can be configured with a maximum capacity. When capacity is
/// reached, `create` fails rather than silently evicting records.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    pub(crate) records: Arc<RwLock<HashMap<RecordId, DeliveryRecord>>>,
    /// Maximum number of records to hold (None = unlimited)
    capacity: Option<usize>,
}

impl MemoryRecordStore {
    /// Create a new empty store with unlimited capacity
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new store with a capacity limit
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            capacity: Some(capacity),
        }
    }

    /// Number of records currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().map_or(0, |records| records.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, record: DeliveryRecord) -> crate::Result<RecordId> {
        let id = record.id.clone();

        let mut records = self.records.write()?;
        if let Some(cap) = self.capacity
            && !records.contains_key(&id)
            && records.len() >= cap
        {
            return Err(StoreError::Internal(format!(
                "record store capacity exceeded: {}/{cap} records",
                records.len(),
            )));
        }

        records.insert(id.clone(), record);
        Ok(id)
    }

    async fn read(&self, id: &RecordId) -> crate::Result<DeliveryRecord> {
        self.records
            .read()?
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn read_for_sender(
        &self,
        id: &RecordId,
        sender_id: &str,
    ) -> crate::Result<DeliveryRecord> {
        self.records
            .read()?
            .get(id)
            .filter(|record| record.sender_id == sender_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn update_status(&self, id: &RecordId, status: DeliveryStatus) -> crate::Result<()> {
        let mut records = self.records.write()?;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if !record.status.can_become(status) {
            return Err(StoreError::InvalidTransition {
                id: id.clone(),
                current: record.status,
                requested: status,
            });
        }

        record.status = status;
        Ok(())
    }

    async fn delete(&self, id: &RecordId) -> crate::Result<()> {
        self.records
            .write()?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn list_by_sender(
        &self,
        sender_id: &str,
        status: Option<DeliveryStatus>,
    ) -> crate::Result<Vec<DeliveryRecord>> {
        let records = self.records.read()?;
        let mut matches: Vec<DeliveryRecord> = records
            .values()
            .filter(|record| record.sender_id == sender_id)
            .filter(|record| status.is_none_or(|wanted| record.status == wanted))
            .cloned()
            .collect();

        // ULIDs sort by creation time, so id-descending is newest-first.
        matches.sort_by(|a, b| b.id.cmp(&a.id));
        matches.truncate(LIST_CAP);
        Ok(matches)
    }
}
