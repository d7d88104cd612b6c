//! SQLite-backed customer repository.
//!
//! Embeddings are stored as little-endian f32 blobs (dim * 4 bytes),
//! timestamps as RFC 3339 text. WAL mode with a busy timeout keeps
//! concurrent daemon/CLI access from tripping over "database is locked".

use crate::repo::{CustomerRepository, NewCustomer, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clientbridge_core::{CustomerId, CustomerRecord, Embedding, Flag, LocationId};
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use tokio_rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS customers (
    id          TEXT PRIMARY KEY,
    location_id INTEGER NOT NULL,
    face_id     TEXT,
    embedding   BLOB NOT NULL,
    visit_count INTEGER NOT NULL DEFAULT 1,
    first_seen  TEXT NOT NULL,
    last_seen   TEXT NOT NULL,
    flag        TEXT NOT NULL DEFAULT 'none',
    name        TEXT,
    photo_url   TEXT,
    UNIQUE (location_id, face_id)
);
CREATE INDEX IF NOT EXISTS idx_customers_location ON customers(location_id);
";

pub struct SqliteCustomerStore {
    conn: Connection,
}

/// Raw row as read from SQLite, decoded into a `CustomerRecord` outside the
/// connection closure so decode failures map to `StoreError::CorruptRecord`.
struct RawRow {
    id: String,
    location_id: i64,
    face_id: Option<String>,
    embedding: Vec<u8>,
    visit_count: i64,
    first_seen: String,
    last_seen: String,
    flag: String,
    name: Option<String>,
    photo_url: Option<String>,
}

const SELECT_COLS: &str =
    "id, location_id, face_id, embedding, visit_count, first_seen, last_seen, flag, name, photo_url";

fn raw_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        location_id: row.get(1)?,
        face_id: row.get(2)?,
        embedding: row.get(3)?,
        visit_count: row.get(4)?,
        first_seen: row.get(5)?,
        last_seen: row.get(6)?,
        flag: row.get(7)?,
        name: row.get(8)?,
        photo_url: row.get(9)?,
    })
}

pub(crate) fn encode_embedding(embedding: &Embedding) -> Vec<u8> {
    let mut buf = Vec::with_capacity(embedding.values.len() * 4);
    for v in &embedding.values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf
}

fn decode_embedding(blob: &[u8]) -> Result<Embedding, String> {
    if blob.len() % 4 != 0 {
        return Err(format!("embedding blob length {} not a multiple of 4", blob.len()));
    }
    let values = blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok(Embedding::new(values))
}

fn decode_row(raw: RawRow) -> Result<CustomerRecord, StoreError> {
    let corrupt = |detail: String| StoreError::CorruptRecord {
        customer_id: raw.id.clone(),
        detail,
    };

    let embedding = decode_embedding(&raw.embedding).map_err(&corrupt)?;
    let first_seen = parse_ts(&raw.first_seen).map_err(&corrupt)?;
    let last_seen = parse_ts(&raw.last_seen).map_err(&corrupt)?;
    let flag =
        Flag::parse(&raw.flag).ok_or_else(|| corrupt(format!("unknown flag {:?}", raw.flag)))?;

    Ok(CustomerRecord {
        id: raw.id,
        location_id: raw.location_id,
        face_id: raw.face_id,
        embedding,
        visit_count: raw.visit_count,
        first_seen,
        last_seen,
        flag,
        name: raw.name,
        photo_url: raw.photo_url,
    })
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp {s:?}: {e}"))
}

impl SqliteCustomerStore {
    /// Open (creating if needed) the customer database at `path` and apply
    /// the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    tokio_rusqlite::Error::Other(Box::new(e))
                })?;
            }
        }

        let conn = Connection::open(path.to_path_buf()).await?;
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        tracing::info!(path = %path.display(), "customer database opened");
        Ok(Self { conn })
    }
}

#[async_trait]
impl CustomerRepository for SqliteCustomerStore {
    async fn list_by_location(
        &self,
        location_id: LocationId,
    ) -> Result<Vec<CustomerRecord>, StoreError> {
        let raws = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {SELECT_COLS} FROM customers WHERE location_id = ?1"
                ))?;
                let rows = stmt.query_map(params![location_id], raw_from_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await?;

        raws.into_iter().map(decode_row).collect()
    }

    async fn get(&self, id: &CustomerId) -> Result<Option<CustomerRecord>, StoreError> {
        let id = id.clone();
        let raw = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {SELECT_COLS} FROM customers WHERE id = ?1"
                ))?;
                Ok(stmt.query_row(params![id], raw_from_row).optional()?)
            })
            .await?;

        raw.map(decode_row).transpose()
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

        let row = record.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO customers
                       (id, location_id, face_id, embedding, visit_count,
                        first_seen, last_seen, flag, name, photo_url)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        row.id,
                        row.location_id,
                        row.face_id,
                        encode_embedding(&row.embedding),
                        row.visit_count,
                        row.first_seen.to_rfc3339(),
                        row.last_seen.to_rfc3339(),
                        row.flag.as_str(),
                        row.name,
                        row.photo_url,
                    ],
                )?;
                Ok(())
            })
            .await?;

        tracing::info!(
            customer = %record.id,
            location = record.location_id,
            "customer enrolled"
        );
        Ok(record)
    }

    async fn record_visit(
        &self,
        id: &CustomerId,
        seen_at: DateTime<Utc>,
    ) -> Result<CustomerRecord, StoreError> {
        let id_owned = id.clone();
        let raw = self
            .conn
            .call(move |conn| {
                let updated = conn.execute(
                    "UPDATE customers
                     SET visit_count = visit_count + 1, last_seen = ?2
                     WHERE id = ?1",
                    params![id_owned, seen_at.to_rfc3339()],
                )?;
                if updated == 0 {
                    return Ok(None);
                }
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {SELECT_COLS} FROM customers WHERE id = ?1"
                ))?;
                Ok(stmt.query_row(params![id_owned], raw_from_row).optional()?)
            })
            .await?;

        match raw {
            Some(raw) => decode_row(raw),
            None => Err(StoreError::NotFound(id.clone())),
        }
    }

    async fn set_flag(&self, id: &CustomerId, flag: Flag) -> Result<(), StoreError> {
        let id_owned = id.clone();
        let updated = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE customers SET flag = ?2 WHERE id = ?1",
                    params![id_owned, flag.as_str()],
                )?)
            })
            .await?;

        if updated == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn delete(&self, id: &CustomerId) -> Result<(), StoreError> {
        let id_owned = id.clone();
        let deleted = self
            .conn
            .call(move |conn| {
                Ok(conn.execute("DELETE FROM customers WHERE id = ?1", params![id_owned])?)
            })
            .await?;

        if deleted == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        tracing::info!(customer = %id, "customer deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::NewCustomer;

    fn new_customer(location_id: i64, values: Vec<f32>) -> NewCustomer {
        NewCustomer {
            location_id,
            face_id: None,
            embedding: Embedding::new(values),
            name: None,
            photo_url: None,
            seen_at: Utc::now(),
        }
    }

    async fn temp_store() -> (tempfile::TempDir, SqliteCustomerStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteCustomerStore::open(dir.path().join("customers.db"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn insert_and_list_round_trip() {
        let (_dir, store) = temp_store().await;
        let created = store
            .insert_new(new_customer(1, vec![0.1, -0.2, 0.3]))
            .await
            .unwrap();
        assert_eq!(created.visit_count, 1);
        assert_eq!(created.flag, Flag::None);

        let listed = store.list_by_location(1).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
        assert_eq!(listed[0].embedding.values, vec![0.1, -0.2, 0.3]);
    }

    #[tokio::test]
    async fn list_scopes_to_location() {
        let (_dir, store) = temp_store().await;
        store.insert_new(new_customer(1, vec![1.0, 0.0])).await.unwrap();
        store.insert_new(new_customer(2, vec![1.0, 0.0])).await.unwrap();

        assert_eq!(store.list_by_location(1).await.unwrap().len(), 1);
        assert_eq!(store.list_by_location(2).await.unwrap().len(), 1);
        assert!(store.list_by_location(99).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_visit_increments_and_touches_last_seen() {
        let (_dir, store) = temp_store().await;
        let created = store.insert_new(new_customer(1, vec![1.0, 0.0])).await.unwrap();

        let later = created.last_seen + chrono::Duration::seconds(60);
        let updated = store.record_visit(&created.id, later).await.unwrap();
        assert_eq!(updated.visit_count, 2);
        assert_eq!(updated.last_seen, later);
        assert_eq!(updated.first_seen.timestamp(), created.first_seen.timestamp());
        // Embedding untouched by visits.
        assert_eq!(updated.embedding, created.embedding);

        let again = store.record_visit(&created.id, later).await.unwrap();
        assert_eq!(again.visit_count, 3);
    }

    #[tokio::test]
    async fn record_visit_missing_customer_is_not_found() {
        let (_dir, store) = temp_store().await;
        let err = store.record_visit(&"nope".to_string(), Utc::now()).await;
        assert!(matches!(err, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn set_flag_and_delete() {
        let (_dir, store) = temp_store().await;
        let created = store.insert_new(new_customer(1, vec![1.0, 0.0])).await.unwrap();

        store.set_flag(&created.id, Flag::Red).await.unwrap();
        let fetched = store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.flag, Flag::Red);

        store.delete(&created.id).await.unwrap();
        assert!(store.get(&created.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete(&created.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn face_id_unique_per_location() {
        let (_dir, store) = temp_store().await;
        let mut a = new_customer(1, vec![1.0, 0.0]);
        a.face_id = Some("cam0-7".into());
        store.insert_new(a.clone()).await.unwrap();

        // Same face_id at the same location violates the constraint.
        assert!(matches!(
            store.insert_new(a.clone()).await,
            Err(StoreError::Unavailable(_))
        ));

        // Same face_id at another location is fine.
        a.location_id = 2;
        store.insert_new(a).await.unwrap();
    }

    #[tokio::test]
    async fn embedding_blob_round_trips_exact_bits() {
        let values = vec![f32::MIN_POSITIVE, -0.0, 1.5e-7, 42.42];
        let blob = encode_embedding(&Embedding::new(values.clone()));
        let decoded = decode_embedding(&blob).unwrap();
        for (a, b) in decoded.values.iter().zip(values.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }
}
