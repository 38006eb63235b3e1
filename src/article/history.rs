//! Per-feed article history.
//!
//! Keys and comparison values are stored as SHA-256 hex digests, never raw.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::datetime::to_db;
use crate::db::DbPool;
use crate::{RelayError, Result};

/// SHA-256 of `value`, hex encoded.
pub fn hash_value(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Repository for seen article keys and comparison field values.
pub struct ArticleHistoryRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ArticleHistoryRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Whether any key was ever stored for the feed.
    pub async fn has_any(&self, feed_id: i64) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM article_keys WHERE feed_id = $1)")
                .bind(feed_id)
                .fetch_one(self.pool)
                .await
                .map_err(|e| RelayError::Database(e.to_string()))?;
        Ok(exists)
    }

    /// Whether keys were stored for the feed under `id_type`.
    pub async fn has_id_type(&self, feed_id: i64, id_type: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM article_keys WHERE feed_id = $1 AND id_type = $2)",
        )
        .bind(feed_id)
        .bind(id_type)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;
        Ok(exists)
    }

    pub async fn contains_key(&self, feed_id: i64, id_type: &str, key: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM article_keys
                WHERE feed_id = $1 AND id_type = $2 AND key_hash = $3
            )
            "#,
        )
        .bind(feed_id)
        .bind(id_type)
        .bind(hash_value(key))
        .fetch_one(self.pool)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;
        Ok(exists)
    }

    /// Store keys under `id_type`. Already known keys are ignored.
    pub async fn store_keys(
        &self,
        feed_id: i64,
        id_type: &str,
        keys: &[String],
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let at = to_db(&at);
        for key in keys.iter().filter(|k| !k.is_empty()) {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO article_keys (feed_id, id_type, key_hash, created_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(feed_id)
            .bind(id_type)
            .bind(hash_value(key))
            .bind(&at)
            .execute(&mut *tx)
            .await
            .map_err(|e| RelayError::Database(e.to_string()))?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn contains_field_value(
        &self,
        feed_id: i64,
        field_name: &str,
        value: &str,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM article_field_values
                WHERE feed_id = $1 AND field_name = $2 AND value_hash = $3
            )
            "#,
        )
        .bind(feed_id)
        .bind(field_name)
        .bind(hash_value(value))
        .fetch_one(self.pool)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;
        Ok(exists)
    }

    /// Store `(field_name, value)` pairs. Empty values are skipped.
    pub async fn store_field_values(
        &self,
        feed_id: i64,
        values: &[(String, String)],
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let at = to_db(&at);
        for (field_name, value) in values.iter().filter(|(_, v)| !v.is_empty()) {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO article_field_values (feed_id, field_name, value_hash, created_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(feed_id)
            .bind(field_name)
            .bind(hash_value(value))
            .bind(&at)
            .execute(&mut *tx)
            .await
            .map_err(|e| RelayError::Database(e.to_string()))?;
        }
        tx.commit().await?;
        Ok(())
    }
}
