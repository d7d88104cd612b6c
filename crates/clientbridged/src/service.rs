//! Identification service: the read-decide-write sequence behind the
//! edge-facing identify endpoint.
//!
//! Two cameras at one location can submit the same new face within the same
//! decision window; without serialization both would see no match and both
//! would enroll. The service therefore runs the whole sequence under a
//! per-location async mutex. Locations never contend with each other.

use crate::photos::PhotoStore;
use chrono::Utc;
use clientbridge_core::{
    CustomerId, Embedding, IdentityMatcher, LocationId, MatchDecision, MatcherConfig, MatcherError,
};
use clientbridge_store::{CustomerRepository, NewCustomer, StoreError};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdentifyError {
    #[error(transparent)]
    Matcher(#[from] MatcherError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitStatus {
    New,
    Returning,
}

/// Outcome reported back to the edge device.
#[derive(Debug, Clone, Serialize)]
pub struct IdentifyOutcome {
    pub status: VisitStatus,
    pub customer_id: CustomerId,
    pub visit_count: i64,
    /// Present only for returning visitors.
    pub similarity: Option<f32>,
}

/// Metadata accompanying a submitted embedding. The captured image stays
/// base64 until the match decision: only a new enrollment persists it, so
/// returning visits never leave unreferenced files behind.
#[derive(Debug, Clone, Default)]
pub struct VisitorMeta {
    pub face_id: Option<String>,
    pub name: Option<String>,
    pub image_base64: Option<String>,
}

pub struct IdentityService {
    repo: Arc<dyn CustomerRepository>,
    matcher: IdentityMatcher,
    photos: Option<Arc<PhotoStore>>,
    // One entry per distinct location id ever submitted; entries are never
    // evicted (a lock for an empty location is a few words of memory).
    location_locks: Mutex<HashMap<LocationId, Arc<tokio::sync::Mutex<()>>>>,
}

impl IdentityService {
    pub fn new(repo: Arc<dyn CustomerRepository>, config: MatcherConfig) -> Self {
        Self {
            repo,
            matcher: IdentityMatcher::new(config),
            photos: None,
            location_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a photo sink; without one, captured images are ignored.
    pub fn with_photo_store(mut self, photos: Arc<PhotoStore>) -> Self {
        self.photos = Some(photos);
        self
    }

    pub fn repo(&self) -> &Arc<dyn CustomerRepository> {
        &self.repo
    }

    pub fn matcher_config(&self) -> &MatcherConfig {
        self.matcher.config()
    }

    fn location_lock(&self, location_id: LocationId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .location_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(location_id).or_default().clone()
    }

    /// Match `embedding` against the location's customers and persist the
    /// outcome: a visit increment for a returning visitor, a fresh record
    /// otherwise. Atomic per location — holds the location lock across the
    /// snapshot read, the decision, and the write.
    pub async fn identify(
        &self,
        location_id: LocationId,
        embedding: Embedding,
        meta: VisitorMeta,
    ) -> Result<IdentifyOutcome, IdentifyError> {
        let lock = self.location_lock(location_id);
        let _guard = lock.lock().await;

        let candidates = self.repo.list_by_location(location_id).await?;
        let decision = self.matcher.best_match(&embedding, &candidates)?;

        match decision {
            MatchDecision::Returning {
                customer_id,
                similarity,
            } => {
                let record = self.repo.record_visit(&customer_id, Utc::now()).await?;
                tracing::info!(
                    customer = %record.id,
                    location = location_id,
                    similarity,
                    visit_count = record.visit_count,
                    "returning visitor"
                );
                Ok(IdentifyOutcome {
                    status: VisitStatus::Returning,
                    customer_id: record.id,
                    visit_count: record.visit_count,
                    similarity: Some(similarity),
                })
            }
            MatchDecision::New => {
                let photo_url = match (&self.photos, meta.image_base64.as_deref()) {
                    (Some(photos), Some(b64)) => {
                        let key = format!("{location_id}-{}", Utc::now().timestamp_millis());
                        photos.save(&key, b64)
                    }
                    _ => None,
                };
                let record = self
                    .repo
                    .insert_new(NewCustomer {
                        location_id,
                        face_id: meta.face_id,
                        embedding,
                        name: meta.name,
                        photo_url,
                        seen_at: Utc::now(),
                    })
                    .await?;
                tracing::info!(
                    customer = %record.id,
                    location = location_id,
                    candidates = candidates.len(),
                    "new visitor enrolled"
                );
                Ok(IdentifyOutcome {
                    status: VisitStatus::New,
                    customer_id: record.id,
                    visit_count: record.visit_count,
                    similarity: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clientbridge_store::MemoryCustomerStore;

    fn service(dim: usize) -> Arc<IdentityService> {
        Arc::new(IdentityService::new(
            Arc::new(MemoryCustomerStore::new()),
            MatcherConfig {
                similarity_threshold: 0.45,
                embedding_dim: dim,
            },
        ))
    }

    #[tokio::test]
    async fn first_visit_enrolls_then_visits_increment_by_one() {
        let svc = service(3);
        let face = Embedding::new(vec![0.1, 0.8, -0.3]);

        let first = svc
            .identify(1, face.clone(), VisitorMeta::default())
            .await
            .unwrap();
        assert_eq!(first.status, VisitStatus::New);
        assert_eq!(first.visit_count, 1);
        assert_eq!(first.similarity, None);

        let second = svc
            .identify(1, face.clone(), VisitorMeta::default())
            .await
            .unwrap();
        assert_eq!(second.status, VisitStatus::Returning);
        assert_eq!(second.customer_id, first.customer_id);
        assert_eq!(second.visit_count, 2);
        assert!((second.similarity.unwrap() - 1.0).abs() < 1e-6);

        let third = svc.identify(1, face, VisitorMeta::default()).await.unwrap();
        assert_eq!(third.visit_count, 3);
    }

    #[tokio::test]
    async fn locations_are_isolated() {
        let svc = service(3);
        let face = Embedding::new(vec![0.5, 0.5, 0.5]);

        let at_a = svc
            .identify(1, face.clone(), VisitorMeta::default())
            .await
            .unwrap();
        let at_b = svc.identify(2, face, VisitorMeta::default()).await.unwrap();

        // Identical face, different location: never a cross-location match.
        assert_eq!(at_b.status, VisitStatus::New);
        assert_ne!(at_b.customer_id, at_a.customer_id);
    }

    #[tokio::test]
    async fn unknown_location_is_treated_as_new() {
        let svc = service(2);
        let outcome = svc
            .identify(42, Embedding::new(vec![1.0, 0.0]), VisitorMeta::default())
            .await
            .unwrap();
        assert_eq!(outcome.status, VisitStatus::New);
        assert_eq!(outcome.visit_count, 1);
    }

    #[tokio::test]
    async fn dimension_mismatch_fails_fast() {
        let svc = service(512);
        let err = svc
            .identify(1, Embedding::new(vec![1.0, 0.0]), VisitorMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IdentifyError::Matcher(MatcherError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn photo_persisted_only_on_enrollment() {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine;

        let dir = tempfile::tempdir().unwrap();
        let svc = Arc::new(
            IdentityService::new(
                Arc::new(MemoryCustomerStore::new()),
                MatcherConfig {
                    similarity_threshold: 0.45,
                    embedding_dim: 3,
                },
            )
            .with_photo_store(Arc::new(PhotoStore::new(dir.path().to_path_buf()))),
        );

        let face = Embedding::new(vec![0.1, 0.8, -0.3]);
        let meta = VisitorMeta {
            image_base64: Some(BASE64.encode(b"jpeg-bytes")),
            ..Default::default()
        };

        let first = svc.identify(1, face.clone(), meta.clone()).await.unwrap();
        assert_eq!(first.status, VisitStatus::New);
        let second = svc.identify(1, face, meta).await.unwrap();
        assert_eq!(second.status, VisitStatus::Returning);

        // The returning visit carried an image too, but only the enrollment
        // wrote one, and the record points at it.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        let record = svc.repo().get(&first.customer_id).await.unwrap().unwrap();
        assert!(record.photo_url.is_some());
    }

    #[tokio::test]
    async fn concurrent_burst_of_same_new_face_enrolls_once() {
        let svc = service(3);
        let face = Embedding::new(vec![0.2, 0.9, 0.1]);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let svc = Arc::clone(&svc);
            let face = face.clone();
            handles.push(tokio::spawn(async move {
                svc.identify(7, face, VisitorMeta::default()).await.unwrap()
            }));
        }

        let mut new_count = 0;
        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            let outcome = handle.await.unwrap();
            if outcome.status == VisitStatus::New {
                new_count += 1;
            }
            ids.insert(outcome.customer_id);
        }

        assert_eq!(new_count, 1, "exactly one submission may enroll");
        assert_eq!(ids.len(), 1, "all submissions resolve to one customer");

        let listed = svc.repo().list_by_location(7).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].visit_count, 8);
    }
}
