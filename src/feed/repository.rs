//! Feed, connection and schedule repositories.

use chrono::Utc;
use uuid::Uuid;

use super::types::{
    ConnectionDetails, ConnectionDisabledCode, Feed, FeedConnection, FeedDisabledCode,
    FeedHealthStatus, NewConnection, NewFeed,
};
use crate::datetime::{parse_db_or_epoch, to_db};
use crate::db::DbPool;
use crate::schedule::FeedSchedule;
use crate::{RelayError, Result};

/// Column list matching [`FeedRow`].
pub(crate) const FEED_COLUMNS: &str = "id, title, url, owner_id, health_status, disabled_code, \
     passing_comparisons, blocking_comparisons, created_at";

/// Row type for feeds.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct FeedRow {
    id: i64,
    title: String,
    url: String,
    owner_id: String,
    health_status: String,
    disabled_code: Option<String>,
    passing_comparisons: String,
    blocking_comparisons: String,
    created_at: String,
}

impl From<FeedRow> for Feed {
    fn from(row: FeedRow) -> Self {
        Feed {
            id: row.id,
            title: row.title,
            url: row.url,
            owner_id: row.owner_id,
            health_status: row.health_status.parse().unwrap_or(FeedHealthStatus::Failed),
            disabled_code: row.disabled_code.and_then(|c| c.parse().ok()),
            passing_comparisons: serde_json::from_str(&row.passing_comparisons).unwrap_or_default(),
            blocking_comparisons: serde_json::from_str(&row.blocking_comparisons)
                .unwrap_or_default(),
            created_at: parse_db_or_epoch(&row.created_at),
        }
    }
}

/// Repository for feeds.
pub struct FeedRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FeedRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new feed in the `ok` state.
    pub async fn create(&self, feed: &NewFeed) -> Result<Feed> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO feeds (title, url, owner_id, passing_comparisons, blocking_comparisons, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&feed.title)
        .bind(&feed.url)
        .bind(&feed.owner_id)
        .bind(serde_json::to_string(&feed.passing_comparisons)?)
        .bind(serde_json::to_string(&feed.blocking_comparisons)?)
        .bind(to_db(&Utc::now()))
        .fetch_one(self.pool)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| RelayError::NotFound("feed".into()))
    }

    /// Get a feed by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Feed>> {
        let query = format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = $1");
        let row = sqlx::query_as::<_, FeedRow>(&query)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(row.map(Feed::from))
    }

    /// List every feed subscribed to a URL.
    pub async fn list_by_url(&self, url: &str) -> Result<Vec<Feed>> {
        let query = format!("SELECT {FEED_COLUMNS} FROM feeds WHERE url = $1 ORDER BY id ASC");
        let rows = sqlx::query_as::<_, FeedRow>(&query)
            .bind(url)
            .fetch_all(self.pool)
            .await
            .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    /// List the feeds of one owner.
    pub async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Feed>> {
        let query =
            format!("SELECT {FEED_COLUMNS} FROM feeds WHERE owner_id = $1 ORDER BY id ASC");
        let rows = sqlx::query_as::<_, FeedRow>(&query)
            .bind(owner_id)
            .fetch_all(self.pool)
            .await
            .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    /// Count the feeds of one owner.
    pub async fn count_by_owner(&self, owner_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feeds WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(self.pool)
            .await
            .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(count)
    }

    /// Set health status and disable code of one feed.
    pub async fn update_status(
        &self,
        id: i64,
        health_status: FeedHealthStatus,
        disabled_code: Option<FeedDisabledCode>,
    ) -> Result<bool> {
        let result =
            sqlx::query("UPDATE feeds SET health_status = $1, disabled_code = $2 WHERE id = $3")
                .bind(health_status.as_str())
                .bind(disabled_code.map(|c| c.as_str()))
                .bind(id)
                .execute(self.pool)
                .await
                .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Set health status and disable code of every feed subscribed to a URL.
    pub async fn update_status_by_url(
        &self,
        url: &str,
        health_status: FeedHealthStatus,
        disabled_code: Option<FeedDisabledCode>,
    ) -> Result<u64> {
        let result =
            sqlx::query("UPDATE feeds SET health_status = $1, disabled_code = $2 WHERE url = $3")
                .bind(health_status.as_str())
                .bind(disabled_code.map(|c| c.as_str()))
                .bind(url)
                .execute(self.pool)
                .await
                .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    /// Delete a feed. Its delivery records are kept.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM feeds WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

/// Row type for connections.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ConnectionRow {
    id: String,
    feed_id: i64,
    name: String,
    details: String,
    filters: Option<String>,
    disabled_code: Option<String>,
    created_at: String,
}

impl TryFrom<ConnectionRow> for FeedConnection {
    type Error = RelayError;

    fn try_from(row: ConnectionRow) -> Result<Self> {
        let filters = match row.filters {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        };
        Ok(FeedConnection {
            id: row.id,
            feed_id: row.feed_id,
            name: row.name,
            details: serde_json::from_str(&row.details)?,
            filters,
            disabled_code: row.disabled_code.and_then(|c| c.parse().ok()),
            created_at: parse_db_or_epoch(&row.created_at),
        })
    }
}

/// Repository for feed connections.
pub struct ConnectionRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ConnectionRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a connection. The target must be exactly one of channel or webhook.
    pub async fn create(&self, connection: &NewConnection) -> Result<FeedConnection> {
        connection.details.validate_target()?;

        let id = Uuid::new_v4().to_string();
        let filters = match &connection.filters {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO feed_connections (id, feed_id, name, details, filters, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&id)
        .bind(connection.feed_id)
        .bind(&connection.name)
        .bind(serde_json::to_string(&connection.details)?)
        .bind(filters)
        .bind(to_db(&Utc::now()))
        .execute(self.pool)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

        self.get(connection.feed_id, &id)
            .await?
            .ok_or_else(|| RelayError::NotFound("connection".into()))
    }

    /// Get a connection of a feed.
    pub async fn get(&self, feed_id: i64, id: &str) -> Result<Option<FeedConnection>> {
        let row = sqlx::query_as::<_, ConnectionRow>(
            r#"
            SELECT id, feed_id, name, details, filters, disabled_code, created_at
            FROM feed_connections
            WHERE feed_id = $1 AND id = $2
            "#,
        )
        .bind(feed_id)
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

        row.map(FeedConnection::try_from).transpose()
    }

    /// List all connections of a feed.
    pub async fn list_by_feed(&self, feed_id: i64) -> Result<Vec<FeedConnection>> {
        let rows = sqlx::query_as::<_, ConnectionRow>(
            r#"
            SELECT id, feed_id, name, details, filters, disabled_code, created_at
            FROM feed_connections
            WHERE feed_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(feed_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

        rows.into_iter().map(FeedConnection::try_from).collect()
    }

    /// List the connections of a feed that are not disabled.
    pub async fn list_enabled_by_feed(&self, feed_id: i64) -> Result<Vec<FeedConnection>> {
        Ok(self
            .list_by_feed(feed_id)
            .await?
            .into_iter()
            .filter(|c| c.disabled_code.is_none())
            .collect())
    }

    /// Replace the details of a connection.
    pub async fn update_details(&self, id: &str, details: &ConnectionDetails) -> Result<bool> {
        let result = sqlx::query("UPDATE feed_connections SET details = $1 WHERE id = $2")
            .bind(serde_json::to_string(details)?)
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Set or clear the disable code of a connection.
    pub async fn set_disabled_code(
        &self,
        id: &str,
        code: Option<ConnectionDisabledCode>,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE feed_connections SET disabled_code = $1 WHERE id = $2")
            .bind(code.map(|c| c.as_str()))
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

/// Row type for schedule overrides.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ScheduleRow {
    name: String,
    keywords: String,
    feed_ids: String,
    refresh_rate_minutes: i64,
}

impl From<ScheduleRow> for FeedSchedule {
    fn from(row: ScheduleRow) -> Self {
        FeedSchedule {
            name: row.name,
            keywords: serde_json::from_str(&row.keywords).unwrap_or_default(),
            feed_ids: serde_json::from_str(&row.feed_ids).unwrap_or_default(),
            refresh_rate_minutes: u32::try_from(row.refresh_rate_minutes).unwrap_or(0),
        }
    }
}

/// Repository for cadence overrides.
pub struct ScheduleRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ScheduleRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert or replace an override by name.
    pub async fn upsert(&self, schedule: &FeedSchedule) -> Result<()> {
        if schedule.refresh_rate_minutes == 0 {
            return Err(RelayError::Validation(format!(
                "schedule {} needs a positive refresh rate",
                schedule.name
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO feed_schedules (name, keywords, feed_ids, refresh_rate_minutes)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT(name) DO UPDATE SET
                keywords = excluded.keywords,
                feed_ids = excluded.feed_ids,
                refresh_rate_minutes = excluded.refresh_rate_minutes
            "#,
        )
        .bind(&schedule.name)
        .bind(serde_json::to_string(&schedule.keywords)?)
        .bind(serde_json::to_string(&schedule.feed_ids)?)
        .bind(i64::from(schedule.refresh_rate_minutes))
        .execute(self.pool)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(())
    }

    /// List every override.
    pub async fn list_all(&self) -> Result<Vec<FeedSchedule>> {
        let rows = sqlx::query_as::<_, ScheduleRow>(
            "SELECT name, keywords, feed_ids, refresh_rate_minutes FROM feed_schedules ORDER BY id ASC",
        )
        .fetch_all(self.pool)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(FeedSchedule::from).collect())
    }

    /// Delete an override by name.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM feed_schedules WHERE name = $1")
            .bind(name)
            .execute(self.pool)
            .await
            .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
