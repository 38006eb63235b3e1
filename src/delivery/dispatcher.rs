//! Article delivery to every destination of a feed.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use super::client::{PlatformClient, SendResponse};
use super::filter::{passes_filters, FilterEvaluator};
use super::medium::{DeliveryTarget, MessagePayload};
use super::rate_limit::{DeliveryRateLimiter, RateLimitResult, DAILY_WINDOW};
use super::record::DeliveryRecordRepository;
use super::types::{ArticleDeliveryState, ArticleDeliveryStatus, DeliveryErrorCode};
use crate::article::Article;
use crate::bus::{
    DeliveryMedium, FeedRef, MediumRef, MessageBroker, RejectedArticleEvent,
    FEED_REJECTED_DISABLE_CONNECTION,
};
use crate::db::Database;

/// Longest platform body kept in a record's internal message.
const MAX_INTERNAL_MESSAGE_CHARS: usize = 1000;

/// Map a platform answer to a terminal state.
pub fn classify_response(
    medium_id: &str,
    article_id: Option<&str>,
    response: &SendResponse,
) -> ArticleDeliveryState {
    let message = || {
        let body: String = response.body.chars().take(MAX_INTERNAL_MESSAGE_CHARS).collect();
        format!("status {}: {}", response.status, body)
    };

    match response.status {
        200..=299 => ArticleDeliveryState::sent(medium_id, article_id),
        401 | 429 => ArticleDeliveryState::failed(
            medium_id,
            article_id,
            DeliveryErrorCode::Internal,
            message(),
        ),
        400..=499 => ArticleDeliveryState::rejected(
            medium_id,
            article_id,
            DeliveryErrorCode::from_rejected_status(response.status),
            message(),
        ),
        _ => ArticleDeliveryState::failed(
            medium_id,
            article_id,
            DeliveryErrorCode::Internal,
            message(),
        ),
    }
}

/// Delivers articles and records every attempt.
#[derive(Clone)]
pub struct DeliveryDispatcher {
    db: Database,
    broker: MessageBroker,
    client: Arc<dyn PlatformClient>,
    filter: Arc<dyn FilterEvaluator>,
    limiter: Arc<DeliveryRateLimiter>,
}

impl DeliveryDispatcher {
    pub fn new(
        db: Database,
        broker: MessageBroker,
        client: Arc<dyn PlatformClient>,
        filter: Arc<dyn FilterEvaluator>,
        limiter: Arc<DeliveryRateLimiter>,
    ) -> Self {
        Self {
            db,
            broker,
            client,
            filter,
            limiter,
        }
    }

    /// Deliver `articles` to every medium.
    ///
    /// Mediums are served concurrently; the articles of one medium go out in
    /// order. Returns every outcome, grouped by medium in input order.
    pub async fn dispatch(
        &self,
        feed_id: i64,
        article_day_limit: u32,
        mediums: &[DeliveryMedium],
        articles: &[Article],
    ) -> Vec<ArticleDeliveryState> {
        if articles.is_empty() || mediums.is_empty() {
            return Vec::new();
        }

        let per_medium = join_all(mediums.iter().map(|medium| {
            self.deliver_to_medium(feed_id, article_day_limit, medium, articles)
        }))
        .await;

        let states: Vec<ArticleDeliveryState> = per_medium.into_iter().flatten().collect();
        let sent = states
            .iter()
            .filter(|s| s.status == ArticleDeliveryStatus::Sent)
            .count();
        info!(
            feed_id,
            articles = articles.len(),
            mediums = mediums.len(),
            sent,
            "Delivered articles"
        );
        states
    }

    async fn deliver_to_medium(
        &self,
        feed_id: i64,
        article_day_limit: u32,
        medium: &DeliveryMedium,
        articles: &[Article],
    ) -> Vec<ArticleDeliveryState> {
        let mut states = Vec::with_capacity(articles.len());
        for article in articles {
            let attempt = self
                .attempt(feed_id, article_day_limit, medium, article)
                .await;
            self.finish(feed_id, &attempt).await;
            states.push(attempt.state);
        }
        states
    }

    /// Run one attempt: filter, then rate limit, then send.
    async fn attempt(
        &self,
        feed_id: i64,
        article_day_limit: u32,
        medium: &DeliveryMedium,
        article: &Article,
    ) -> Attempt {
        let article_id = article.id();

        if !passes_filters(self.filter.as_ref(), article, medium.filters.as_ref()) {
            return Attempt::unreserved(ArticleDeliveryState::filtered_out(&medium.id, article_id));
        }

        let admission = self
            .limiter
            .check_and_consume(feed_id, &medium.id, article_id, DAILY_WINDOW, article_day_limit)
            .await;
        let record_id = match admission {
            Ok(RateLimitResult::Allowed { record_id }) => record_id,
            Ok(RateLimitResult::Denied) => {
                debug!(feed_id, medium_id = %medium.id, "Daily article limit reached");
                return Attempt::unreserved(ArticleDeliveryState::rate_limited(
                    &medium.id, article_id,
                ));
            }
            Err(e) => {
                return Attempt::unreserved(ArticleDeliveryState::failed(
                    &medium.id,
                    article_id,
                    DeliveryErrorCode::Internal,
                    format!("rate limit check failed: {e}"),
                ));
            }
        };

        let state = match DeliveryTarget::resolve(&medium.details) {
            None => ArticleDeliveryState::failed(
                &medium.id,
                article_id,
                DeliveryErrorCode::NoChannelOrWebhook,
                "medium has neither a channel nor a webhook",
            ),
            Some(target) => {
                let payload = MessagePayload::build(&medium.details, &target, article);
                match self.client.send(&target, &payload).await {
                    Ok(response) => classify_response(&medium.id, article_id, &response),
                    Err(e) => ArticleDeliveryState::failed(
                        &medium.id,
                        article_id,
                        DeliveryErrorCode::Internal,
                        e.to_string(),
                    ),
                }
            }
        };
        Attempt {
            state,
            reserved: Some(record_id),
        }
    }

    /// Persist the outcome and signal rejections. Errors are logged only.
    async fn finish(&self, feed_id: i64, attempt: &Attempt) {
        let state = &attempt.state;
        let records = DeliveryRecordRepository::new(self.db.pool());
        let stored = match attempt.reserved.as_deref() {
            Some(_) if state.status == ArticleDeliveryStatus::Sent => Ok(()),
            Some(record_id) => records.update_outcome(record_id, state).await,
            None => records.store(feed_id, state, Utc::now()).await.map(|_| ()),
        };
        if let Err(e) = stored {
            error!(feed_id, medium_id = %state.medium_id, "Failed to store delivery record: {}", e);
        }

        match state.status {
            ArticleDeliveryStatus::Rejected => {
                warn!(
                    feed_id,
                    medium_id = %state.medium_id,
                    code = ?state.error_code,
                    "Platform rejected article"
                );
                let event = RejectedArticleEvent {
                    feed: FeedRef { id: feed_id },
                    medium: MediumRef {
                        id: state.medium_id.clone(),
                    },
                };
                if let Err(e) = self
                    .broker
                    .publish(FEED_REJECTED_DISABLE_CONNECTION, &event)
                    .await
                {
                    error!(feed_id, "Failed to publish rejection: {}", e);
                }
            }
            ArticleDeliveryStatus::Failed => {
                warn!(
                    feed_id,
                    medium_id = %state.medium_id,
                    code = ?state.error_code,
                    message = state.internal_message.as_deref().unwrap_or(""),
                    "Article delivery failed"
                );
            }
            _ => {}
        }
    }
}

/// Outcome of one attempt and the `sent` record reserved for it at
/// admission.
struct Attempt {
    state: ArticleDeliveryState,
    reserved: Option<String>,
}

impl Attempt {
    fn unreserved(state: ArticleDeliveryState) -> Self {
        Self {
            state,
            reserved: None,
        }
    }
}
