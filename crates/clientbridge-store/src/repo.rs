use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clientbridge_core::{CustomerId, CustomerRecord, Embedding, Flag, LocationId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Persistence layer failure during read or write. Transient from the
    /// caller's perspective; the edge device retries the whole request.
    #[error("store unavailable: {0}")]
    Unavailable(#[from] tokio_rusqlite::Error),

    /// A stored row could not be decoded (bad embedding blob, timestamp, or flag).
    #[error("corrupt record for customer {customer_id}: {detail}")]
    CorruptRecord {
        customer_id: CustomerId,
        detail: String,
    },

    #[error("customer {0} not found")]
    NotFound(CustomerId),
}

/// Fields needed to enroll a customer. The repository assigns the id and
/// sets `visit_count = 1`, `first_seen = last_seen = seen_at`.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub location_id: LocationId,
    pub face_id: Option<String>,
    pub embedding: Embedding,
    pub name: Option<String>,
    pub photo_url: Option<String>,
    pub seen_at: DateTime<Utc>,
}

/// Persistence seam for customer records. Injected into the identification
/// service rather than reached through ambient state.
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    /// Every record for one location, in storage order. Full scan by design;
    /// an unknown location is simply an empty set.
    async fn list_by_location(
        &self,
        location_id: LocationId,
    ) -> Result<Vec<CustomerRecord>, StoreError>;

    async fn get(&self, id: &CustomerId) -> Result<Option<CustomerRecord>, StoreError>;

    /// Enroll a new customer and return the stored record.
    async fn insert_new(&self, new: NewCustomer) -> Result<CustomerRecord, StoreError>;

    /// Confirmed returning visit: `visit_count += 1`, `last_seen = seen_at`.
    /// The stored embedding is never touched.
    async fn record_visit(
        &self,
        id: &CustomerId,
        seen_at: DateTime<Utc>,
    ) -> Result<CustomerRecord, StoreError>;

    async fn set_flag(&self, id: &CustomerId, flag: Flag) -> Result<(), StoreError>;

    /// Remove the record entirely. A deleted customer is no longer matchable;
    /// their next visit enrolls a fresh record.
    async fn delete(&self, id: &CustomerId) -> Result<(), StoreError>;
}
