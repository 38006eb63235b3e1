//! Feed and connection types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{RelayError, Result};

/// Health of a feed's upstream URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedHealthStatus {
    #[default]
    Ok,
    Failed,
}

impl FeedHealthStatus {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedHealthStatus::Ok => "ok",
            FeedHealthStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for FeedHealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FeedHealthStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ok" => Ok(FeedHealthStatus::Ok),
            "failed" => Ok(FeedHealthStatus::Failed),
            _ => Err(format!("unknown health status: {s}")),
        }
    }
}

/// Reason a feed was disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedDisabledCode {
    /// The feed document could not be used.
    BadFormat,
    /// The URL kept failing past the failure threshold.
    FailedRequests,
    /// Disabled by the owner.
    Manual,
}

impl FeedDisabledCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedDisabledCode::BadFormat => "bad-format",
            FeedDisabledCode::FailedRequests => "failed-requests",
            FeedDisabledCode::Manual => "manual",
        }
    }
}

impl fmt::Display for FeedDisabledCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FeedDisabledCode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "bad-format" => Ok(FeedDisabledCode::BadFormat),
            "failed-requests" => Ok(FeedDisabledCode::FailedRequests),
            "manual" => Ok(FeedDisabledCode::Manual),
            _ => Err(format!("unknown feed disabled code: {s}")),
        }
    }
}

/// Reason a connection was disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionDisabledCode {
    /// The platform rejected a rendered message.
    BadFormat,
    Manual,
}

impl ConnectionDisabledCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionDisabledCode::BadFormat => "bad-format",
            ConnectionDisabledCode::Manual => "manual",
        }
    }
}

impl fmt::Display for ConnectionDisabledCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConnectionDisabledCode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "bad-format" => Ok(ConnectionDisabledCode::BadFormat),
            "manual" => Ok(ConnectionDisabledCode::Manual),
            _ => Err(format!("unknown connection disabled code: {s}")),
        }
    }
}

/// A subscription to one feed URL on behalf of one account.
#[derive(Debug, Clone, Serialize)]
pub struct Feed {
    pub id: i64,
    pub title: String,
    pub url: String,
    /// Owning account id.
    pub owner_id: String,
    pub health_status: FeedHealthStatus,
    pub disabled_code: Option<FeedDisabledCode>,
    /// Fields whose changed value re-delivers an already seen article.
    pub passing_comparisons: Vec<String>,
    /// Fields whose repeated value suppresses an otherwise new article.
    pub blocking_comparisons: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Feed {
    /// Whether the feed may be polled and delivered.
    pub fn is_active(&self) -> bool {
        self.disabled_code.is_none() && self.health_status == FeedHealthStatus::Ok
    }
}

/// New feed for creation.
#[derive(Debug, Clone)]
pub struct NewFeed {
    pub owner_id: String,
    pub title: String,
    pub url: String,
    pub passing_comparisons: Vec<String>,
    pub blocking_comparisons: Vec<String>,
}

impl NewFeed {
    pub fn new(
        owner_id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            title: title.into(),
            url: url.into(),
            passing_comparisons: Vec::new(),
            blocking_comparisons: Vec::new(),
        }
    }

    /// Set the passing comparison fields.
    pub fn with_passing_comparisons(mut self, fields: Vec<String>) -> Self {
        self.passing_comparisons = fields;
        self
    }

    /// Set the blocking comparison fields.
    pub fn with_blocking_comparisons(mut self, fields: Vec<String>) -> Self {
        self.blocking_comparisons = fields;
        self
    }
}

/// Channel target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: String,
}

/// Webhook target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRef {
    pub id: String,
    pub token: String,
    /// Display name override for messages sent through the webhook.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedAuthorTemplate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedFooterTemplate {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmbedFieldTemplate {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// Embed template; every string may contain `{{field}}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedTemplate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub color: Option<u32>,
    #[serde(default)]
    pub author: Option<EmbedAuthorTemplate>,
    #[serde(default)]
    pub footer: Option<EmbedFooterTemplate>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub fields: Vec<EmbedFieldTemplate>,
}

/// Target and message templates of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetails {
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub channel: Option<ChannelRef>,
    #[serde(default)]
    pub webhook: Option<WebhookRef>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub embeds: Vec<EmbedTemplate>,
}

impl ConnectionDetails {
    /// Details targeting a channel.
    pub fn channel(channel_id: impl Into<String>) -> Self {
        Self {
            channel: Some(ChannelRef {
                id: channel_id.into(),
            }),
            ..Default::default()
        }
    }

    /// Details targeting a webhook.
    pub fn webhook(id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            webhook: Some(WebhookRef {
                id: id.into(),
                token: token.into(),
                name: None,
                icon_url: None,
            }),
            ..Default::default()
        }
    }

    /// Set the content template.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set the embed templates.
    pub fn with_embeds(mut self, embeds: Vec<EmbedTemplate>) -> Self {
        self.embeds = embeds;
        self
    }

    /// Exactly one of channel and webhook must be set.
    pub fn validate_target(&self) -> Result<()> {
        match (&self.channel, &self.webhook) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            (Some(_), Some(_)) => Err(RelayError::Validation(
                "connection must target either a channel or a webhook, not both".to_string(),
            )),
            (None, None) => Err(RelayError::Validation(
                "connection must target a channel or a webhook".to_string(),
            )),
        }
    }
}

/// A delivery destination attached to a feed.
#[derive(Debug, Clone, Serialize)]
pub struct FeedConnection {
    /// UUID.
    pub id: String,
    pub feed_id: i64,
    pub name: String,
    pub details: ConnectionDetails,
    /// Opaque filter expression evaluated by the filter collaborator.
    pub filters: Option<serde_json::Value>,
    pub disabled_code: Option<ConnectionDisabledCode>,
    pub created_at: DateTime<Utc>,
}

/// New connection for creation.
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub feed_id: i64,
    pub name: String,
    pub details: ConnectionDetails,
    pub filters: Option<serde_json::Value>,
}

impl NewConnection {
    pub fn new(feed_id: i64, name: impl Into<String>, details: ConnectionDetails) -> Self {
        Self {
            feed_id,
            name: name.into(),
            details,
            filters: None,
        }
    }

    /// Set the filter expression.
    pub fn with_filters(mut self, filters: serde_json::Value) -> Self {
        self.filters = Some(filters);
        self
    }
}

/// Edit of a connection's message templates.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionMessageUpdate {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub embeds: Option<Vec<EmbedTemplate>>,
}

impl ConnectionMessageUpdate {
    /// Whether the edit touches the rendered message.
    pub fn touches_message(&self) -> bool {
        self.content.is_some() || self.embeds.is_some()
    }
}
