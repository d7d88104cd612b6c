//! In-memory customer repository for tests and tooling.

use crate::repo::{CustomerRepository, NewCustomer, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clientbridge_core::{CustomerId, CustomerRecord, Flag, LocationId};
use tokio::sync::RwLock;

/// Keeps records in insertion order, matching the "storage order is
/// arbitrary but stable" contract of the SQLite store.
#[derive(Default)]
pub struct MemoryCustomerStore {
    records: RwLock<Vec<CustomerRecord>>,
}

impl MemoryCustomerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl CustomerRepository for MemoryCustomerStore {
    async fn list_by_location(
        &self,
        location_id: LocationId,
    ) -> Result<Vec<CustomerRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.location_id == location_id)
            .cloned()
            .collect())
    }

    async fn get(&self, id: &CustomerId) -> Result<Option<CustomerRecord>, StoreError> {
        Ok(self.records.read().await.iter().find(|r| &r.id == id).cloned())
    }

    async fn insert_new(&self, new: NewCustomer) -> Result<CustomerRecord, StoreError> {
        let record = CustomerRecord {
            id: uuid::Uuid::new_v4().to_string(),
            location_id: new.location_id,
            face_id: new.face_id,
            embedding: new.embedding,
            visit_count: 1,
            first_seen: new.seen_at,
            last_seen: new.seen_at,
            flag: Flag::None,
            name: new.name,
            photo_url: new.photo_url,
        };
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn record_visit(
        &self,
        id: &CustomerId,
        seen_at: DateTime<Utc>,
    ) -> Result<CustomerRecord, StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        record.visit_count += 1;
        record.last_seen = seen_at;
        Ok(record.clone())
    }

    async fn set_flag(&self, id: &CustomerId, flag: Flag) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        record.flag = flag;
        Ok(())
    }

    async fn delete(&self, id: &CustomerId) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| &r.id != id);
        if records.len() == before {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }
}
