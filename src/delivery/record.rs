//! Delivery record repository.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::types::{ArticleDeliveryState, ArticleDeliveryStatus, DeliveryRecord};
use crate::datetime::{parse_db_or_epoch, to_db};
use crate::db::DbPool;
use crate::{RelayError, Result};

#[derive(Debug, Clone, sqlx::FromRow)]
struct DeliveryRecordRow {
    id: String,
    feed_id: i64,
    medium_id: String,
    article_id: Option<String>,
    status: String,
    error_code: Option<String>,
    internal_message: Option<String>,
    created_at: String,
}

impl From<DeliveryRecordRow> for DeliveryRecord {
    fn from(row: DeliveryRecordRow) -> Self {
        DeliveryRecord {
            id: row.id,
            feed_id: row.feed_id,
            medium_id: row.medium_id,
            article_id: row.article_id,
            status: row.status.parse().unwrap_or(ArticleDeliveryStatus::Failed),
            error_code: row.error_code.and_then(|c| c.parse().ok()),
            internal_message: row.internal_message,
            created_at: parse_db_or_epoch(&row.created_at),
        }
    }
}

/// Store of delivery outcomes, one record per attempt.
///
/// Records are appended. A `sent` record reserved at admission is
/// overwritten once if the send does not succeed.
pub struct DeliveryRecordRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> DeliveryRecordRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Persist one outcome. Returns the record id.
    pub async fn store(
        &self,
        feed_id: i64,
        state: &ArticleDeliveryState,
        at: DateTime<Utc>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO delivery_records
                (id, feed_id, medium_id, article_id, status, error_code, internal_message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&id)
        .bind(feed_id)
        .bind(&state.medium_id)
        .bind(&state.article_id)
        .bind(state.status.as_str())
        .bind(state.error_code.map(|c| c.as_str()))
        .bind(&state.internal_message)
        .bind(to_db(&at))
        .execute(self.pool)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(id)
    }

    /// Most recent records of a feed, newest first.
    pub async fn list_by_feed(&self, feed_id: i64, limit: u32) -> Result<Vec<DeliveryRecord>> {
        let rows = sqlx::query_as::<_, DeliveryRecordRow>(
            r#"
            SELECT id, feed_id, medium_id, article_id, status, error_code, internal_message, created_at
            FROM delivery_records
            WHERE feed_id = $1
            ORDER BY created_at DESC, rowid DESC
            LIMIT $2
            "#,
        )
        .bind(feed_id)
        .bind(i64::from(limit))
        .fetch_all(self.pool)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(DeliveryRecord::from).collect())
    }

    /// Insert a `sent` record unless the feed already has `ceiling` other
    /// sent records after `since`. Insert and count share one transaction;
    /// the insert comes first so the transaction holds the write lock.
    ///
    /// Returns the new record id, or `None` at the ceiling.
    pub async fn reserve_sent(
        &self,
        feed_id: i64,
        medium_id: &str,
        article_id: Option<&str>,
        ceiling: u32,
        since: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RelayError::Database(e.to_string()))?;

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO delivery_records (id, feed_id, medium_id, article_id, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&id)
        .bind(feed_id)
        .bind(medium_id)
        .bind(article_id)
        .bind(ArticleDeliveryStatus::Sent.as_str())
        .bind(to_db(&at))
        .execute(&mut *tx)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

        let others: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM delivery_records
            WHERE feed_id = $1 AND status = $2 AND created_at > $3 AND id != $4
            "#,
        )
        .bind(feed_id)
        .bind(ArticleDeliveryStatus::Sent.as_str())
        .bind(to_db(&since))
        .bind(&id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

        if others >= i64::from(ceiling) {
            tx.rollback()
                .await
                .map_err(|e| RelayError::Database(e.to_string()))?;
            return Ok(None);
        }

        tx.commit()
            .await
            .map_err(|e| RelayError::Database(e.to_string()))?;
        Ok(Some(id))
    }

    /// Overwrite the outcome of record `id`.
    pub async fn update_outcome(&self, id: &str, state: &ArticleDeliveryState) -> Result<()> {
        let result = sqlx::query(
            "UPDATE delivery_records SET status = $1, error_code = $2, internal_message = $3 WHERE id = $4",
        )
        .bind(state.status.as_str())
        .bind(state.error_code.map(|c| c.as_str()))
        .bind(&state.internal_message)
        .bind(id)
        .execute(self.pool)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RelayError::NotFound(format!("delivery record {id}")));
        }
        Ok(())
    }

    /// Records of a feed with `status` since `since`.
    pub async fn count_since(
        &self,
        feed_id: i64,
        status: ArticleDeliveryStatus,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM delivery_records WHERE feed_id = $1 AND status = $2 AND created_at > $3",
        )
        .bind(feed_id)
        .bind(status.as_str())
        .bind(to_db(&since))
        .fetch_one(self.pool)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::delivery::DeliveryErrorCode;
    use chrono::Duration;

    #[tokio::test]
    async fn test_store_and_list_newest_first() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = DeliveryRecordRepository::new(db.pool());
        let t0 = Utc::now() - Duration::minutes(5);

        repo.store(1, &ArticleDeliveryState::sent("m1", Some("a1")), t0)
            .await
            .unwrap();
        repo.store(
            1,
            &ArticleDeliveryState::rejected(
                "m1",
                Some("a2"),
                DeliveryErrorCode::Forbidden,
                "Missing Access",
            ),
            t0 + Duration::minutes(1),
        )
        .await
        .unwrap();
        repo.store(2, &ArticleDeliveryState::filtered_out("m2", Some("a1")), t0)
            .await
            .unwrap();

        let records = repo.list_by_feed(1, 10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, ArticleDeliveryStatus::Rejected);
        assert_eq!(records[0].error_code, Some(DeliveryErrorCode::Forbidden));
        assert_eq!(records[0].internal_message.as_deref(), Some("Missing Access"));
        assert_eq!(records[1].article_id.as_deref(), Some("a1"));

        assert_eq!(repo.list_by_feed(1, 1).await.unwrap().len(), 1);
        assert_eq!(
            repo.count_since(1, ArticleDeliveryStatus::Sent, t0 - Duration::seconds(1))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_reserve_sent_stops_at_ceiling() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = DeliveryRecordRepository::new(db.pool());
        let now = Utc::now();
        let since = now - Duration::hours(24);

        let first = repo
            .reserve_sent(1, "m1", Some("a1"), 2, since, now)
            .await
            .unwrap();
        assert!(first.is_some());
        assert!(repo
            .reserve_sent(1, "m2", Some("a1"), 2, since, now)
            .await
            .unwrap()
            .is_some());
        assert!(repo
            .reserve_sent(1, "m1", Some("a2"), 2, since, now)
            .await
            .unwrap()
            .is_none());
        assert_eq!(repo.list_by_feed(1, 10).await.unwrap().len(), 2);

        repo.update_outcome(
            &first.unwrap(),
            &ArticleDeliveryState::rejected("m1", Some("a1"), DeliveryErrorCode::Forbidden, "no"),
        )
        .await
        .unwrap();
        assert_eq!(
            repo.count_since(1, ArticleDeliveryStatus::Sent, since).await.unwrap(),
            1
        );
        assert!(repo
            .reserve_sent(1, "m1", Some("a2"), 2, since, now)
            .await
            .unwrap()
            .is_some());

        assert!(matches!(
            repo.update_outcome("missing", &ArticleDeliveryState::sent("m1", None)).await,
            Err(RelayError::NotFound(_))
        ));
    }
}
