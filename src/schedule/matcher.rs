//! Feed selection per cadence.

use super::types::{is_due, FeedSchedule};
use crate::db::DbPool;
use crate::entitlement::AccountRefreshRate;
use crate::feed::repository::{FeedRow, FEED_COLUMNS};
use crate::feed::Feed;
use crate::{RelayError, Result};

/// Feeds eligible for polling at all.
const ACTIVE_PREDICATE: &str = "disabled_code IS NULL AND health_status = 'ok'";

/// Selects the feeds due at a cadence.
///
/// Overrides are evaluated in Rust with [`is_due`]: SQLite's `LOWER` folds
/// ASCII only, so keyword matching cannot happen in SQL.
pub struct ScheduleMatcher<'a> {
    pool: &'a DbPool,
}

impl<'a> ScheduleMatcher<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    async fn active_feeds(&self) -> Result<Vec<Feed>> {
        let query =
            format!("SELECT {FEED_COLUMNS} FROM feeds WHERE {ACTIVE_PREDICATE} ORDER BY id ASC");
        let rows = sqlx::query_as::<_, FeedRow>(&query)
            .fetch_all(self.pool)
            .await
            .map_err(|e| RelayError::Database(e.to_string()))?;
        Ok(rows.into_iter().map(Feed::from).collect())
    }

    /// Active feeds due at `cadence` seconds, in id order.
    ///
    /// A feed without an applicable override is due at `default_cadence`;
    /// one with overrides only at their cadences.
    pub async fn due_feeds(
        &self,
        cadence: u64,
        default_cadence: u64,
        schedules: &[FeedSchedule],
        accounts: &[AccountRefreshRate],
    ) -> Result<Vec<Feed>> {
        Ok(self
            .active_feeds()
            .await?
            .into_iter()
            .filter(|feed| is_due(feed, cadence, default_cadence, schedules, accounts))
            .collect())
    }
}

/// URLs of `feeds` with duplicates removed, first occurrence kept.
pub fn distinct_urls(feeds: &[Feed]) -> Vec<String> {
    let mut urls: Vec<String> = Vec::with_capacity(feeds.len());
    for feed in feeds {
        if !urls.contains(&feed.url) {
            urls.push(feed.url.clone());
        }
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::feed::{FeedDisabledCode, FeedHealthStatus, FeedRepository, NewFeed};

    async fn setup() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        let repo = FeedRepository::new(db.pool());
        for (owner, title, url) in [
            ("alice", "Tech News", "https://a.example/rss"),
            ("alice", "Cooking", "https://b.example/rss"),
            ("bob", "Sports", "https://c.example/rss"),
            ("carol", "Tech Mirror", "https://a.example/rss"),
        ] {
            repo.create(&NewFeed::new(owner, title, url)).await.unwrap();
        }
        db
    }

    fn ids(feeds: &[Feed]) -> Vec<i64> {
        feeds.iter().map(|f| f.id).collect()
    }

    #[tokio::test]
    async fn test_overrides_split_populations() {
        let db = setup().await;
        let matcher = ScheduleMatcher::new(db.pool());
        let schedules = vec![FeedSchedule::new("tech", 5).with_keywords(vec!["TECH".into()])];
        let accounts = vec![AccountRefreshRate {
            user_id: "bob".to_string(),
            refresh_rate_minutes: 5,
        }];

        let overridden = matcher.due_feeds(300, 600, &schedules, &accounts).await.unwrap();
        let default = matcher.due_feeds(600, 600, &schedules, &accounts).await.unwrap();
        assert_eq!(ids(&overridden), vec![1, 3, 4]);
        assert_eq!(ids(&default), vec![2]);
    }

    #[tokio::test]
    async fn test_no_overrides_means_default_population() {
        let db = setup().await;
        let matcher = ScheduleMatcher::new(db.pool());
        assert_eq!(matcher.due_feeds(600, 600, &[], &[]).await.unwrap().len(), 4);
        assert!(matcher.due_feeds(300, 600, &[], &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_due_feeds_by_cadence() {
        let db = setup().await;
        let matcher = ScheduleMatcher::new(db.pool());
        let schedules = vec![FeedSchedule::new("ids", 10).with_feed_ids(vec![2])];
        let accounts = vec![AccountRefreshRate {
            user_id: "bob".to_string(),
            refresh_rate_minutes: 2,
        }];

        // feed 2 is overridden at the default rate and still due exactly once
        let at_default = matcher.due_feeds(600, 600, &schedules, &accounts).await.unwrap();
        assert_eq!(ids(&at_default), vec![1, 2, 4]);

        let at_account = matcher.due_feeds(120, 600, &schedules, &accounts).await.unwrap();
        assert_eq!(ids(&at_account), vec![3]);

        assert!(matcher
            .due_feeds(300, 600, &schedules, &accounts)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_non_ascii_keyword_matches_any_case() {
        let db = setup().await;
        let feed = FeedRepository::new(db.pool())
            .create(&NewFeed::new("dave", "ÉCONOMIE Weekly", "https://d.example/rss"))
            .await
            .unwrap();
        let matcher = ScheduleMatcher::new(db.pool());
        let schedules =
            vec![FeedSchedule::new("economy", 2).with_keywords(vec!["économie".into()])];

        let fast = matcher.due_feeds(120, 600, &schedules, &[]).await.unwrap();
        assert_eq!(ids(&fast), vec![feed.id]);

        let default = matcher.due_feeds(600, 600, &schedules, &[]).await.unwrap();
        assert!(!ids(&default).contains(&feed.id));
    }

    #[tokio::test]
    async fn test_zero_rate_override_leaves_feed_at_default() {
        let db = setup().await;
        let matcher = ScheduleMatcher::new(db.pool());
        let schedules = vec![FeedSchedule::new("broken", 0).with_feed_ids(vec![2])];
        let accounts = vec![AccountRefreshRate {
            user_id: "bob".to_string(),
            refresh_rate_minutes: 0,
        }];

        let default = matcher.due_feeds(600, 600, &schedules, &accounts).await.unwrap();
        assert_eq!(ids(&default), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_distinct_urls_collapse_shared_url() {
        let db = setup().await;
        let feeds = ScheduleMatcher::new(db.pool())
            .due_feeds(600, 600, &[], &[])
            .await
            .unwrap();
        assert_eq!(
            distinct_urls(&feeds),
            vec![
                "https://a.example/rss".to_string(),
                "https://b.example/rss".to_string(),
                "https://c.example/rss".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_inactive_feeds_never_due() {
        let db = setup().await;
        let repo = FeedRepository::new(db.pool());
        repo.update_status(1, FeedHealthStatus::Failed, None).await.unwrap();
        repo.update_status(3, FeedHealthStatus::Ok, Some(FeedDisabledCode::Manual))
            .await
            .unwrap();

        let matcher = ScheduleMatcher::new(db.pool());
        let schedules = vec![FeedSchedule::new("all", 5).with_feed_ids(vec![1, 2, 3, 4])];
        let overridden = matcher.due_feeds(300, 600, &schedules, &[]).await.unwrap();
        assert_eq!(ids(&overridden), vec![2, 4]);
        assert_eq!(ids(&matcher.due_feeds(600, 600, &[], &[]).await.unwrap()), vec![2, 4]);
    }
}
