//! Per-feed article limit over a trailing window.
//!
//! Admissions are counted from the feed's persisted `sent` delivery records,
//! so the limit holds across restarts and across dispatchers sharing one
//! database.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use super::record::DeliveryRecordRepository;
use super::types::ArticleDeliveryStatus;
use crate::db::Database;
use crate::Result;

/// Daily window of the article limit.
pub const DAILY_WINDOW: Duration = Duration::from_secs(86_400);

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Admitted. The `sent` record reserved for the delivery.
    Allowed { record_id: String },
    Denied,
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }
}

/// Start of the trailing `window` ending at `now`.
fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|w| now.checked_sub_signed(w))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Limiter of delivered articles per feed.
///
/// An admission reserves a `sent` record in the same transaction as the
/// count. The dispatcher later overwrites the reservation when the send
/// does not succeed, which frees the slot.
#[derive(Debug)]
pub struct DeliveryRateLimiter {
    db: Database,
    admission: Mutex<()>,
}

impl DeliveryRateLimiter {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            admission: Mutex::new(()),
        }
    }

    /// Admit one delivery to `medium_id` if fewer than `ceiling` articles of
    /// the feed were sent within the trailing `window`.
    pub async fn check_and_consume(
        &self,
        feed_id: i64,
        medium_id: &str,
        article_id: Option<&str>,
        window: Duration,
        ceiling: u32,
    ) -> Result<RateLimitResult> {
        self.check_and_consume_at(feed_id, medium_id, article_id, window, ceiling, Utc::now())
            .await
    }

    pub async fn check_and_consume_at(
        &self,
        feed_id: i64,
        medium_id: &str,
        article_id: Option<&str>,
        window: Duration,
        ceiling: u32,
        now: DateTime<Utc>,
    ) -> Result<RateLimitResult> {
        if ceiling == 0 {
            return Ok(RateLimitResult::Denied);
        }

        let _guard = self.admission.lock().await;
        let reserved = DeliveryRecordRepository::new(self.db.pool())
            .reserve_sent(
                feed_id,
                medium_id,
                article_id,
                ceiling,
                window_start(now, window),
                now,
            )
            .await?;

        Ok(match reserved {
            Some(record_id) => RateLimitResult::Allowed { record_id },
            None => {
                debug!(feed_id, ceiling, "Article limit reached");
                RateLimitResult::Denied
            }
        })
    }

    /// Articles of the feed sent within the trailing `window`.
    pub async fn usage(&self, feed_id: i64, window: Duration) -> Result<u32> {
        self.usage_at(feed_id, window, Utc::now()).await
    }

    pub async fn usage_at(
        &self,
        feed_id: i64,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<u32> {
        let count = DeliveryRecordRepository::new(self.db.pool())
            .count_since(feed_id, ArticleDeliveryStatus::Sent, window_start(now, window))
            .await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}
