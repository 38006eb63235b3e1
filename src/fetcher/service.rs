//! Fetch gate, attempt bookkeeping and the failure threshold.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::client::HttpFeedClient;
use super::repository::{FailureStreakRepository, FetchAttemptRepository};
use super::types::{FetchOutcome, FetchStatus};
use crate::bus::{FetchRequest, MessageBroker, UrlFailedEvent, URL_FAILED_DISABLE_FEEDS};
use crate::config::FetcherConfig;
use crate::db::Database;
use crate::Result;

/// Upper bounds keeping chrono durations in range.
const MAX_THRESHOLD_HOURS: u64 = 24 * 365 * 100;
const MAX_RATE_SECONDS: u64 = 86_400 * 365 * 100;

/// Consumer of `url.fetch` requests.
#[derive(Clone)]
pub struct FeedFetcher {
    db: Database,
    client: HttpFeedClient,
    broker: MessageBroker,
    failed_threshold: Duration,
}

impl FeedFetcher {
    pub fn new(db: Database, config: &FetcherConfig, broker: MessageBroker) -> Result<Self> {
        let client = HttpFeedClient::new(config)?;
        let hours = config.failed_duration_threshold_hours.min(MAX_THRESHOLD_HOURS) as i64;
        Ok(Self {
            db,
            client,
            broker,
            failed_threshold: Duration::hours(hours),
        })
    }

    /// Handle a fetch request at the current time.
    pub async fn handle_fetch_request(&self, request: &FetchRequest) -> Result<Option<FetchStatus>> {
        self.handle_fetch_request_at(request, Utc::now()).await
    }

    /// Handle a fetch request as of `now`.
    ///
    /// Returns `None` when the request was skipped: the URL was fetched less
    /// than `rate_seconds` ago, or the request was malformed.
    pub async fn handle_fetch_request_at(
        &self,
        request: &FetchRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<FetchStatus>> {
        let url = request.url.trim();
        if url.is_empty() {
            warn!("Dropping fetch request without a URL");
            return Ok(None);
        }

        let rate = request.rate_seconds.min(MAX_RATE_SECONDS) as i64;
        let cutoff = now - Duration::seconds(rate);
        if FetchAttemptRepository::new(self.db.pool())
            .exists_after(url, cutoff)
            .await?
        {
            debug!(url, rate_seconds = request.rate_seconds, "Recently fetched, skipping");
            return Ok(None);
        }

        self.fetch_and_record(url, now).await.map(Some)
    }

    /// Fetch `url` and record the attempt as of `now`.
    pub async fn fetch_and_record(&self, url: &str, now: DateTime<Utc>) -> Result<FetchStatus> {
        let outcome = self.client.fetch(url).await;
        self.record_outcome(url, &outcome, now).await?;
        Ok(outcome.status)
    }

    /// Persist an outcome and update the failure streak.
    pub async fn record_outcome(
        &self,
        url: &str,
        outcome: &FetchOutcome,
        now: DateTime<Utc>,
    ) -> Result<()> {
        FetchAttemptRepository::new(self.db.pool())
            .record(url, outcome, now)
            .await?;

        match outcome.status {
            FetchStatus::Ok => {
                debug!(url, "Fetched feed");
                FailureStreakRepository::new(self.db.pool())
                    .reset(url)
                    .await?;
            }
            FetchStatus::Failed => {
                let code = outcome.response.as_ref().map(|r| r.status_code);
                let anti_block = outcome
                    .response
                    .as_ref()
                    .map(|r| r.is_anti_block)
                    .unwrap_or(false);
                info!(url, status_code = ?code, anti_block, "Feed request failed");
                self.evaluate_failure_threshold(url, now).await?;
            }
            FetchStatus::FetchError | FetchStatus::ParseError => {
                info!(
                    url,
                    status = %outcome.status,
                    error = outcome.error_message.as_deref().unwrap_or(""),
                    "Feed fetch did not produce a usable response"
                );
            }
        }

        Ok(())
    }

    /// Emit `url.failed.disable-feeds` once the current failure streak of
    /// `url` has lasted longer than the threshold.
    ///
    /// Returns whether the signal was emitted by this call.
    pub async fn evaluate_failure_threshold(&self, url: &str, now: DateTime<Utc>) -> Result<bool> {
        let streaks = FailureStreakRepository::new(self.db.pool());
        let streak = streaks.get(url).await?;

        if streak.as_ref().map(|s| s.breached).unwrap_or(false) {
            return Ok(false);
        }

        let started_at = match streak.and_then(|s| s.started_at) {
            Some(started_at) => started_at,
            None => {
                let started_at = self.streak_start_from_history(url).await?.unwrap_or(now);
                streaks.begin(url, started_at).await?;
                started_at
            }
        };

        if now - started_at <= self.failed_threshold {
            return Ok(false);
        }

        streaks.mark_breached(url).await?;
        self.broker
            .publish(
                URL_FAILED_DISABLE_FEEDS,
                &UrlFailedEvent {
                    url: url.to_string(),
                },
            )
            .await?;

        warn!(
            url,
            failing_since = %started_at,
            "URL exceeded the failure threshold, disabling its feeds"
        );
        Ok(true)
    }

    /// Start of the current streak derived from the attempt history: the
    /// first `failed` attempt after the most recent success, or the very
    /// first attempt when the URL never succeeded.
    async fn streak_start_from_history(&self, url: &str) -> Result<Option<DateTime<Utc>>> {
        let attempts = FetchAttemptRepository::new(self.db.pool());
        match attempts.latest_ok_at(url).await? {
            Some(ok_at) => attempts.earliest_failed_after(url, ok_at).await,
            None => attempts.first_attempt_at(url).await,
        }
    }
}
