//! Feed state transitions.
//!
//! Health and disable fields of feeds and connections change only through
//! the methods of [`FeedService`].

use chrono::Utc;
use tracing::{info, warn};

use super::repository::{ConnectionRepository, FeedRepository};
use super::types::{
    ConnectionDisabledCode, ConnectionMessageUpdate, Feed, FeedConnection, FeedDisabledCode,
    FeedHealthStatus, NewFeed,
};
use crate::db::Database;
use crate::entitlement::EntitlementLookup;
use crate::fetcher::{FeedFetcher, FetchStatus};
use crate::{RelayError, Result};

/// Service for feed lifecycle operations.
pub struct FeedService<'a> {
    db: &'a Database,
}

impl<'a> FeedService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Add a feed, enforcing the owner's feed count entitlement.
    pub async fn add_feed(
        &self,
        feed: &NewFeed,
        entitlements: &dyn EntitlementLookup,
    ) -> Result<Feed> {
        url::Url::parse(&feed.url)
            .map_err(|e| RelayError::Validation(format!("invalid feed URL: {e}")))?;

        let repo = FeedRepository::new(self.db.pool());
        let max_feeds = entitlements.benefits_of(&feed.owner_id).max_feeds;
        let owned = repo.count_by_owner(&feed.owner_id).await?;
        if owned >= i64::from(max_feeds) {
            return Err(RelayError::FeedLimitReached(format!(
                "account {} already has {} of {} feeds",
                feed.owner_id, owned, max_feeds
            )));
        }

        repo.create(feed).await
    }

    /// Mark every feed subscribed to `url` as failed with `failed-requests`.
    ///
    /// Returns the number of feeds changed.
    pub async fn mark_failed_requests(&self, url: &str) -> Result<u64> {
        let count = FeedRepository::new(self.db.pool())
            .update_status_by_url(
                url,
                FeedHealthStatus::Failed,
                Some(FeedDisabledCode::FailedRequests),
            )
            .await?;

        if count > 0 {
            warn!(url = %url, feeds = count, "Disabled feeds after repeated request failures");
        }
        Ok(count)
    }

    /// Disable a feed on behalf of its owner.
    pub async fn disable_manually(&self, feed_id: i64) -> Result<Feed> {
        let feed = self.require_feed(feed_id).await?;
        FeedRepository::new(self.db.pool())
            .update_status(feed_id, feed.health_status, Some(FeedDisabledCode::Manual))
            .await?;
        self.require_feed(feed_id).await
    }

    /// Clear a feed's disable code. Health status is left as is.
    pub async fn clear_disable(&self, feed_id: i64) -> Result<Feed> {
        let feed = self.require_feed(feed_id).await?;
        FeedRepository::new(self.db.pool())
            .update_status(feed_id, feed.health_status, None)
            .await?;
        self.require_feed(feed_id).await
    }

    /// Fetch a failed feed's URL now and restore it when the fetch succeeds.
    ///
    /// A `failed-requests` disable code is cleared along with the health
    /// status; any other disable code is kept.
    pub async fn retry_failed_feed(&self, feed_id: i64, fetcher: &FeedFetcher) -> Result<Feed> {
        let feed = self.require_feed(feed_id).await?;
        if feed.health_status != FeedHealthStatus::Failed {
            return Err(RelayError::FeedNotFailed(feed_id));
        }

        let status = fetcher.fetch_and_record(&feed.url, Utc::now()).await?;
        if status != FetchStatus::Ok {
            return Err(RelayError::Fetch(format!(
                "retry of feed {} failed with status {}",
                feed_id, status
            )));
        }

        let disabled_code = match feed.disabled_code {
            Some(FeedDisabledCode::FailedRequests) => None,
            other => other,
        };
        FeedRepository::new(self.db.pool())
            .update_status(feed_id, FeedHealthStatus::Ok, disabled_code)
            .await?;

        info!(feed_id, url = %feed.url, "Feed restored after successful retry");
        self.require_feed(feed_id).await
    }

    /// Disable a connection whose message the platform rejected.
    pub async fn disable_connection_bad_format(
        &self,
        feed_id: i64,
        connection_id: &str,
    ) -> Result<bool> {
        let repo = ConnectionRepository::new(self.db.pool());
        if repo.get(feed_id, connection_id).await?.is_none() {
            warn!(
                feed_id,
                connection_id, "Rejected-article signal for unknown connection"
            );
            return Ok(false);
        }

        repo.set_disabled_code(connection_id, Some(ConnectionDisabledCode::BadFormat))
            .await?;
        info!(
            feed_id,
            connection_id, "Connection disabled after platform rejected a message"
        );
        Ok(true)
    }

    /// Edit a connection's message templates.
    ///
    /// Editing content or embeds re-enables a connection that was disabled
    /// with `bad-format`.
    pub async fn update_connection_message(
        &self,
        feed_id: i64,
        connection_id: &str,
        update: &ConnectionMessageUpdate,
    ) -> Result<FeedConnection> {
        let repo = ConnectionRepository::new(self.db.pool());
        let connection = repo
            .get(feed_id, connection_id)
            .await?
            .ok_or_else(|| RelayError::NotFound("connection".into()))?;

        let mut details = connection.details.clone();
        if let Some(content) = &update.content {
            details.content = Some(content.clone());
        }
        if let Some(embeds) = &update.embeds {
            details.embeds = embeds.clone();
        }
        repo.update_details(connection_id, &details).await?;

        if update.touches_message()
            && connection.disabled_code == Some(ConnectionDisabledCode::BadFormat)
        {
            repo.set_disabled_code(connection_id, None).await?;
            info!(feed_id, connection_id, "Connection re-enabled after message edit");
        }

        repo.get(feed_id, connection_id)
            .await?
            .ok_or_else(|| RelayError::NotFound("connection".into()))
    }

    async fn require_feed(&self, feed_id: i64) -> Result<Feed> {
        FeedRepository::new(self.db.pool())
            .get_by_id(feed_id)
            .await?
            .ok_or_else(|| RelayError::NotFound("feed".into()))
    }
}
