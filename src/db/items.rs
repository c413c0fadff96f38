//! Durable item store
//!
//! The engine only sees the [`ItemStore`] trait: find by content hash (the
//! dedup key), find by id, insert, list. The sqlite implementation leans on
//! the UNIQUE constraint on `hash` to arbitrate concurrent finalizes racing
//! on identical content; the loser observes [`InsertOutcome::DuplicateHash`]
//! and converges on the winner's row.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::upload::{UploadError, UploadedItem};

/// Result of attempting to insert a new item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// An item with the same content hash already exists.
    DuplicateHash,
}

/// Keyed store of finalized upload records.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn insert(&self, item: &UploadedItem) -> Result<InsertOutcome, UploadError>;

    async fn find_by_hash(&self, hash: &str) -> Result<Option<UploadedItem>, UploadError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<UploadedItem>, UploadError>;

    async fn list(&self) -> Result<Vec<UploadedItem>, UploadError>;
}

/// SQLite-backed item store.
#[derive(Clone)]
pub struct SqliteItemStore {
    pool: SqlitePool,
}

impl SqliteItemStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ItemStore for SqliteItemStore {
    async fn insert(&self, item: &UploadedItem) -> Result<InsertOutcome, UploadError> {
        let result = sqlx::query(
            r#"
            INSERT INTO items (id, stream_id, extension, name, hash, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.stream_id)
        .bind(&item.extension)
        .bind(&item.name)
        .bind(&item.hash)
        .bind(&item.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Ok(InsertOutcome::DuplicateHash)
            }
            Err(e) => Err(UploadError::Store(e.to_string())),
        }
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<UploadedItem>, UploadError> {
        sqlx::query_as::<_, UploadedItem>(
            r#"
            SELECT id, stream_id, extension, name, hash, created_at
            FROM items WHERE hash = ?
            "#,
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| UploadError::Store(e.to_string()))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UploadedItem>, UploadError> {
        sqlx::query_as::<_, UploadedItem>(
            r#"
            SELECT id, stream_id, extension, name, hash, created_at
            FROM items WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| UploadError::Store(e.to_string()))
    }

    async fn list(&self) -> Result<Vec<UploadedItem>, UploadError> {
        sqlx::query_as::<_, UploadedItem>(
            r#"
            SELECT id, stream_id, extension, name, hash, created_at
            FROM items ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| UploadError::Store(e.to_string()))
    }
}
