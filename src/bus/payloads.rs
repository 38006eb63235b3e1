//! Message payloads carried inside broker envelopes.

use serde::{Deserialize, Serialize};

use crate::feed::{ConnectionDetails, Feed, FeedConnection};

/// Request to fetch one URL, published on `url.fetch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub url: String,
    /// Cadence of the tick that produced the request.
    pub rate_seconds: u64,
}

/// A URL crossed the failure threshold, published on `url.failed.disable-feeds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlFailedEvent {
    pub url: String,
}

/// Feed section of a deliver-articles message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryFeed {
    pub id: i64,
    pub url: String,
    #[serde(default)]
    pub passing_comparisons: Vec<String>,
    #[serde(default)]
    pub blocking_comparisons: Vec<String>,
}

impl From<&Feed> for DeliveryFeed {
    fn from(feed: &Feed) -> Self {
        Self {
            id: feed.id,
            url: feed.url.clone(),
            passing_comparisons: feed.passing_comparisons.clone(),
            blocking_comparisons: feed.blocking_comparisons.clone(),
        }
    }
}

/// Platform a medium delivers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediumKey {
    Discord,
}

/// One destination of a deliver-articles message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryMedium {
    /// Connection id.
    pub id: String,
    pub key: MediumKey,
    #[serde(default)]
    pub filters: Option<serde_json::Value>,
    pub details: ConnectionDetails,
}

impl From<&FeedConnection> for DeliveryMedium {
    fn from(connection: &FeedConnection) -> Self {
        Self {
            id: connection.id.clone(),
            key: MediumKey::Discord,
            filters: connection.filters.clone(),
            details: connection.details.clone(),
        }
    }
}

/// Deliver new articles of a due feed, published on `feed.deliver-articles`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverArticlesEvent {
    /// Daily delivery ceiling for this feed.
    pub article_day_limit: u32,
    pub feed: DeliveryFeed,
    pub mediums: Vec<DeliveryMedium>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRef {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediumRef {
    pub id: String,
}

/// The platform rejected a message, published on
/// `feed.rejected-article.disable-connection`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedArticleEvent {
    pub feed: FeedRef,
    pub medium: MediumRef,
}
