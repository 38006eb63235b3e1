//! Delivery outcome types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal outcome of one (article, destination) attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArticleDeliveryStatus {
    Sent,
    Failed,
    Rejected,
    FilteredOut,
    RateLimited,
}

impl ArticleDeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleDeliveryStatus::Sent => "sent",
            ArticleDeliveryStatus::Failed => "failed",
            ArticleDeliveryStatus::Rejected => "rejected",
            ArticleDeliveryStatus::FilteredOut => "filtered-out",
            ArticleDeliveryStatus::RateLimited => "rate-limited",
        }
    }
}

impl fmt::Display for ArticleDeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ArticleDeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(ArticleDeliveryStatus::Sent),
            "failed" => Ok(ArticleDeliveryStatus::Failed),
            "rejected" => Ok(ArticleDeliveryStatus::Rejected),
            "filtered-out" => Ok(ArticleDeliveryStatus::FilteredOut),
            "rate-limited" => Ok(ArticleDeliveryStatus::RateLimited),
            _ => Err(format!("unknown delivery status: {s}")),
        }
    }
}

/// Error codes of `failed` and `rejected` outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryErrorCode {
    Internal,
    NoChannelOrWebhook,
    BadRequest,
    Forbidden,
    MediumNotFound,
    Other,
}

impl DeliveryErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryErrorCode::Internal => "internal",
            DeliveryErrorCode::NoChannelOrWebhook => "no-channel-or-webhook",
            DeliveryErrorCode::BadRequest => "bad-request",
            DeliveryErrorCode::Forbidden => "forbidden",
            DeliveryErrorCode::MediumNotFound => "medium-not-found",
            DeliveryErrorCode::Other => "other",
        }
    }

    /// Code of a rejecting 4xx status.
    pub fn from_rejected_status(status: u16) -> Self {
        match status {
            400 => DeliveryErrorCode::BadRequest,
            403 => DeliveryErrorCode::Forbidden,
            404 => DeliveryErrorCode::MediumNotFound,
            _ => DeliveryErrorCode::Other,
        }
    }
}

impl fmt::Display for DeliveryErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DeliveryErrorCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "internal" => Ok(DeliveryErrorCode::Internal),
            "no-channel-or-webhook" => Ok(DeliveryErrorCode::NoChannelOrWebhook),
            "bad-request" => Ok(DeliveryErrorCode::BadRequest),
            "forbidden" => Ok(DeliveryErrorCode::Forbidden),
            "medium-not-found" => Ok(DeliveryErrorCode::MediumNotFound),
            "other" => Ok(DeliveryErrorCode::Other),
            _ => Err(format!("unknown delivery error code: {s}")),
        }
    }
}

/// Outcome of one attempt before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleDeliveryState {
    pub medium_id: String,
    pub article_id: Option<String>,
    pub status: ArticleDeliveryStatus,
    pub error_code: Option<DeliveryErrorCode>,
    pub internal_message: Option<String>,
}

impl ArticleDeliveryState {
    fn new(medium_id: &str, article_id: Option<&str>, status: ArticleDeliveryStatus) -> Self {
        Self {
            medium_id: medium_id.to_string(),
            article_id: article_id.map(str::to_string),
            status,
            error_code: None,
            internal_message: None,
        }
    }

    pub fn sent(medium_id: &str, article_id: Option<&str>) -> Self {
        Self::new(medium_id, article_id, ArticleDeliveryStatus::Sent)
    }

    pub fn filtered_out(medium_id: &str, article_id: Option<&str>) -> Self {
        Self::new(medium_id, article_id, ArticleDeliveryStatus::FilteredOut)
    }

    pub fn rate_limited(medium_id: &str, article_id: Option<&str>) -> Self {
        Self::new(medium_id, article_id, ArticleDeliveryStatus::RateLimited)
    }

    pub fn failed(
        medium_id: &str,
        article_id: Option<&str>,
        code: DeliveryErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error_code: Some(code),
            internal_message: Some(message.into()),
            ..Self::new(medium_id, article_id, ArticleDeliveryStatus::Failed)
        }
    }

    pub fn rejected(
        medium_id: &str,
        article_id: Option<&str>,
        code: DeliveryErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error_code: Some(code),
            internal_message: Some(message.into()),
            ..Self::new(medium_id, article_id, ArticleDeliveryStatus::Rejected)
        }
    }
}

/// A persisted delivery record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    pub id: String,
    pub feed_id: i64,
    pub medium_id: String,
    pub article_id: Option<String>,
    pub status: ArticleDeliveryStatus,
    pub error_code: Option<DeliveryErrorCode>,
    pub internal_message: Option<String>,
    pub created_at: DateTime<Utc>,
}
