//! Fetch history and failure streak repositories.

use chrono::{DateTime, Utc};

use super::types::{FailureStreak, FetchAttempt, FetchOutcome, FetchResponse, FetchStatus};
use crate::datetime::{parse_db, parse_db_or_epoch, to_db};
use crate::db::DbPool;
use crate::{RelayError, Result};

/// Row type for a fetch attempt joined with its response.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FetchAttemptRow {
    id: i64,
    url: String,
    status: String,
    error_message: Option<String>,
    created_at: String,
    status_code: Option<i64>,
    body: Option<String>,
    is_anti_block: Option<bool>,
}

impl From<FetchAttemptRow> for FetchAttempt {
    fn from(row: FetchAttemptRow) -> Self {
        let response = row.status_code.map(|code| FetchResponse {
            status_code: u16::try_from(code).unwrap_or(0),
            body: row.body,
            is_anti_block: row.is_anti_block.unwrap_or(false),
        });
        FetchAttempt {
            id: row.id,
            url: row.url,
            status: row.status.parse().unwrap_or(FetchStatus::FetchError),
            error_message: row.error_message,
            response,
            created_at: parse_db_or_epoch(&row.created_at),
        }
    }
}

/// Repository for fetch attempts and their responses.
pub struct FetchAttemptRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FetchAttemptRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Persist an attempt and its response. Returns the attempt id.
    pub async fn record(&self, url: &str, outcome: &FetchOutcome, at: DateTime<Utc>) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO fetch_requests (url, status, error_message, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(url)
        .bind(outcome.status.as_str())
        .bind(&outcome.error_message)
        .bind(to_db(&at))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

        if let Some(response) = &outcome.response {
            sqlx::query(
                r#"
                INSERT INTO fetch_responses (request_id, status_code, body, is_anti_block)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(id)
            .bind(i64::from(response.status_code))
            .bind(&response.body)
            .bind(response.is_anti_block)
            .execute(&mut *tx)
            .await
            .map_err(|e| RelayError::Database(e.to_string()))?;
        }

        tx.commit().await?;
        Ok(id)
    }

    /// Whether an attempt for `url` exists strictly after `cutoff`.
    pub async fn exists_after(&self, url: &str, cutoff: DateTime<Utc>) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM fetch_requests WHERE url = $1 AND created_at > $2)",
        )
        .bind(url)
        .bind(to_db(&cutoff))
        .fetch_one(self.pool)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(exists)
    }

    /// Timestamp of the most recent `ok` attempt.
    pub async fn latest_ok_at(&self, url: &str) -> Result<Option<DateTime<Utc>>> {
        let at: Option<String> = sqlx::query_scalar(
            "SELECT MAX(created_at) FROM fetch_requests WHERE url = $1 AND status = 'ok'",
        )
        .bind(url)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(at.and_then(|s| parse_db(&s)))
    }

    /// Timestamp of the earliest `failed` attempt strictly after `after`.
    pub async fn earliest_failed_after(
        &self,
        url: &str,
        after: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let at: Option<String> = sqlx::query_scalar(
            r#"
            SELECT MIN(created_at) FROM fetch_requests
            WHERE url = $1 AND status = 'failed' AND created_at > $2
            "#,
        )
        .bind(url)
        .bind(to_db(&after))
        .fetch_one(self.pool)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(at.and_then(|s| parse_db(&s)))
    }

    /// Timestamp of the first attempt ever recorded for `url`.
    pub async fn first_attempt_at(&self, url: &str) -> Result<Option<DateTime<Utc>>> {
        let at: Option<String> =
            sqlx::query_scalar("SELECT MIN(created_at) FROM fetch_requests WHERE url = $1")
                .bind(url)
                .fetch_one(self.pool)
                .await
                .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(at.and_then(|s| parse_db(&s)))
    }

    /// Body of the most recent `ok` response.
    pub async fn latest_ok_body(&self, url: &str) -> Result<Option<String>> {
        let body: Option<Option<String>> = sqlx::query_scalar(
            r#"
            SELECT r.body
            FROM fetch_requests q
            JOIN fetch_responses r ON r.request_id = q.id
            WHERE q.url = $1 AND q.status = 'ok'
            ORDER BY q.created_at DESC, q.id DESC
            LIMIT 1
            "#,
        )
        .bind(url)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(body.flatten())
    }

    /// Most recent attempts for `url`, newest first.
    pub async fn list_by_url(&self, url: &str, limit: i64) -> Result<Vec<FetchAttempt>> {
        let rows = sqlx::query_as::<_, FetchAttemptRow>(
            r#"
            SELECT q.id, q.url, q.status, q.error_message, q.created_at,
                   r.status_code, r.body, r.is_anti_block
            FROM fetch_requests q
            LEFT JOIN fetch_responses r ON r.request_id = q.id
            WHERE q.url = $1
            ORDER BY q.created_at DESC, q.id DESC
            LIMIT $2
            "#,
        )
        .bind(url)
        .bind(limit)
        .fetch_all(self.pool)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(FetchAttempt::from).collect())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct FailureStreakRow {
    url: String,
    streak_started_at: Option<String>,
    breached: bool,
}

impl From<FailureStreakRow> for FailureStreak {
    fn from(row: FailureStreakRow) -> Self {
        FailureStreak {
            url: row.url,
            started_at: row.streak_started_at.and_then(|s| parse_db(&s)),
            breached: row.breached,
        }
    }
}

/// Repository for the per-URL failure streak projection.
pub struct FailureStreakRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FailureStreakRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, url: &str) -> Result<Option<FailureStreak>> {
        let row = sqlx::query_as::<_, FailureStreakRow>(
            "SELECT url, streak_started_at, breached FROM url_failure_streaks WHERE url = $1",
        )
        .bind(url)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(row.map(FailureStreak::from))
    }

    /// Open a new streak starting at `started_at`.
    pub async fn begin(&self, url: &str, started_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO url_failure_streaks (url, streak_started_at, breached)
            VALUES ($1, $2, 0)
            ON CONFLICT(url) DO UPDATE SET
                streak_started_at = excluded.streak_started_at,
                breached = 0
            "#,
        )
        .bind(url)
        .bind(to_db(&started_at))
        .execute(self.pool)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(())
    }

    pub async fn mark_breached(&self, url: &str) -> Result<()> {
        sqlx::query("UPDATE url_failure_streaks SET breached = 1 WHERE url = $1")
            .bind(url)
            .execute(self.pool)
            .await
            .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(())
    }

    /// Close the streak after a success.
    pub async fn reset(&self, url: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO url_failure_streaks (url, streak_started_at, breached)
            VALUES ($1, NULL, 0)
            ON CONFLICT(url) DO UPDATE SET streak_started_at = NULL, breached = 0
            "#,
        )
        .bind(url)
        .execute(self.pool)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use chrono::{Duration, TimeZone};

    const URL: &str = "https://example.com/rss";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn ok_outcome(body: &str) -> FetchOutcome {
        FetchOutcome::from_response(FetchResponse {
            status_code: 200,
            body: Some(body.to_string()),
            is_anti_block: false,
        })
    }

    fn failed_outcome() -> FetchOutcome {
        FetchOutcome::from_response(FetchResponse {
            status_code: 503,
            body: Some("unavailable".to_string()),
            is_anti_block: true,
        })
    }

    #[tokio::test]
    async fn test_record_and_list() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = FetchAttemptRepository::new(db.pool());

        repo.record(URL, &ok_outcome("<rss/>"), t0()).await.unwrap();
        repo.record(URL, &FetchOutcome::fetch_error("timed out"), t0() + Duration::minutes(1))
            .await
            .unwrap();
        repo.record(URL, &failed_outcome(), t0() + Duration::minutes(2))
            .await
            .unwrap();

        let attempts = repo.list_by_url(URL, 10).await.unwrap();
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[0].status, FetchStatus::Failed);
        assert!(attempts[0].response.as_ref().unwrap().is_anti_block);
        assert_eq!(attempts[1].status, FetchStatus::FetchError);
        assert!(attempts[1].response.is_none());
        assert_eq!(attempts[1].error_message.as_deref(), Some("timed out"));
        assert_eq!(attempts[2].created_at, t0());
    }

    #[tokio::test]
    async fn test_exists_after_is_strict() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = FetchAttemptRepository::new(db.pool());
        repo.record(URL, &ok_outcome(""), t0()).await.unwrap();

        assert!(repo
            .exists_after(URL, t0() - Duration::seconds(1))
            .await
            .unwrap());
        assert!(!repo.exists_after(URL, t0()).await.unwrap());
        assert!(!repo
            .exists_after("https://other.example.com", t0() - Duration::hours(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_latest_ok_body() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = FetchAttemptRepository::new(db.pool());
        assert!(repo.latest_ok_body(URL).await.unwrap().is_none());

        repo.record(URL, &ok_outcome("first"), t0()).await.unwrap();
        repo.record(URL, &ok_outcome("second"), t0() + Duration::minutes(10))
            .await
            .unwrap();
        repo.record(URL, &failed_outcome(), t0() + Duration::minutes(20))
            .await
            .unwrap();

        assert_eq!(
            repo.latest_ok_body(URL).await.unwrap().as_deref(),
            Some("second")
        );
    }

    #[tokio::test]
    async fn test_streak_history_queries() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = FetchAttemptRepository::new(db.pool());

        repo.record(URL, &failed_outcome(), t0()).await.unwrap();
        repo.record(URL, &ok_outcome(""), t0() + Duration::hours(1))
            .await
            .unwrap();
        repo.record(URL, &failed_outcome(), t0() + Duration::hours(2))
            .await
            .unwrap();
        repo.record(URL, &failed_outcome(), t0() + Duration::hours(3))
            .await
            .unwrap();

        let ok_at = repo.latest_ok_at(URL).await.unwrap().unwrap();
        assert_eq!(ok_at, t0() + Duration::hours(1));
        assert_eq!(
            repo.earliest_failed_after(URL, ok_at).await.unwrap(),
            Some(t0() + Duration::hours(2))
        );
        assert_eq!(repo.first_attempt_at(URL).await.unwrap(), Some(t0()));
    }

    #[tokio::test]
    async fn test_failure_streak_lifecycle() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = FailureStreakRepository::new(db.pool());
        assert!(repo.get(URL).await.unwrap().is_none());

        repo.begin(URL, t0()).await.unwrap();
        repo.mark_breached(URL).await.unwrap();
        let streak = repo.get(URL).await.unwrap().unwrap();
        assert_eq!(streak.started_at, Some(t0()));
        assert!(streak.breached);

        repo.reset(URL).await.unwrap();
        let streak = repo.get(URL).await.unwrap().unwrap();
        assert!(streak.started_at.is_none());
        assert!(!streak.breached);
    }
}
