//! Destination resolution and platform payloads.

use serde::Serialize;

use super::template::{render, render_opt};
use crate::article::Article;
use crate::feed::{ConnectionDetails, EmbedTemplate};

/// Content used when a connection has neither content nor embeds.
pub const DEFAULT_CONTENT: &str = "{{title}}\n{{link}}";

const MAX_CONTENT_CHARS: usize = 2000;
const MAX_EMBED_TITLE_CHARS: usize = 256;
const MAX_EMBED_DESCRIPTION_CHARS: usize = 4096;
const MAX_EMBED_FIELD_VALUE_CHARS: usize = 1024;

/// Where a message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryTarget {
    Webhook {
        id: String,
        token: String,
        username: Option<String>,
        avatar_url: Option<String>,
    },
    Channel {
        id: String,
    },
}

impl DeliveryTarget {
    /// Target of a connection. A webhook wins over a channel.
    pub fn resolve(details: &ConnectionDetails) -> Option<Self> {
        if let Some(webhook) = details.webhook.as_ref().filter(|w| !w.id.is_empty()) {
            return Some(DeliveryTarget::Webhook {
                id: webhook.id.clone(),
                token: webhook.token.clone(),
                username: webhook.name.clone(),
                avatar_url: webhook.icon_url.clone(),
            });
        }
        details
            .channel
            .as_ref()
            .filter(|c| !c.id.is_empty())
            .map(|c| DeliveryTarget::Channel { id: c.id.clone() })
    }

    /// Send endpoint below `api_base`.
    pub fn endpoint(&self, api_base: &str) -> String {
        let base = api_base.trim_end_matches('/');
        match self {
            DeliveryTarget::Webhook { id, token, .. } => format!("{base}/webhooks/{id}/{token}"),
            DeliveryTarget::Channel { id } => format!("{base}/channels/{id}/messages"),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryTarget::Webhook { .. } => "webhook",
            DeliveryTarget::Channel { .. } => "channel",
        }
    }

    /// Whether requests need the bot authorization header.
    pub fn needs_bot_auth(&self) -> bool {
        matches!(self, DeliveryTarget::Channel { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedMedia {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Rendered embed with platform field names.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedMedia>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedMedia>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

/// Rendered message body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MessagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl MessagePayload {
    /// Render the message of `details` for `article` sent to `target`.
    pub fn build(details: &ConnectionDetails, target: &DeliveryTarget, article: &Article) -> Self {
        let content_template = match (&details.content, details.embeds.is_empty()) {
            (Some(content), _) => Some(content.as_str()),
            (None, true) => Some(DEFAULT_CONTENT),
            (None, false) => None,
        };
        let content = render_opt(content_template, article)
            .map(|c| truncate(&c, MAX_CONTENT_CHARS))
            .filter(|c| !c.trim().is_empty());

        let (username, avatar_url) = match target {
            DeliveryTarget::Webhook {
                username,
                avatar_url,
                ..
            } => (
                username.as_deref().map(|u| render(u, article)),
                avatar_url.as_deref().map(|a| render(a, article)),
            ),
            DeliveryTarget::Channel { .. } => (None, None),
        };

        Self {
            content,
            embeds: details
                .embeds
                .iter()
                .map(|e| render_embed(e, article))
                .collect(),
            username: username.filter(|u| !u.is_empty()),
            avatar_url: avatar_url.filter(|a| !a.is_empty()),
        }
    }
}

fn render_embed(template: &EmbedTemplate, article: &Article) -> Embed {
    let text = |value: &Option<String>| {
        render_opt(value.as_deref(), article).filter(|v| !v.is_empty())
    };

    Embed {
        title: text(&template.title).map(|t| truncate(&t, MAX_EMBED_TITLE_CHARS)),
        description: text(&template.description)
            .map(|d| truncate(&d, MAX_EMBED_DESCRIPTION_CHARS)),
        url: text(&template.url),
        color: template.color,
        author: template.author.as_ref().and_then(|a| {
            text(&a.name).map(|name| EmbedAuthor {
                name,
                icon_url: text(&a.icon_url),
            })
        }),
        footer: template.footer.as_ref().and_then(|f| {
            text(&f.text).map(|text_value| EmbedFooter {
                text: text_value,
                icon_url: text(&f.icon_url),
            })
        }),
        image: text(&template.image_url).map(|url| EmbedMedia { url }),
        thumbnail: text(&template.thumbnail_url).map(|url| EmbedMedia { url }),
        fields: template
            .fields
            .iter()
            .filter_map(|f| {
                let name = render(&f.name, article);
                let value = render(&f.value, article);
                if name.is_empty() || value.is_empty() {
                    return None;
                }
                Some(EmbedField {
                    name,
                    value: truncate(&value, MAX_EMBED_FIELD_VALUE_CHARS),
                    inline: f.inline,
                })
            })
            .collect(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{EmbedAuthorTemplate, EmbedFieldTemplate};
    use serde_json::json;

    fn article() -> Article {
        Article::from_fields([
            ("title", "Hello"),
            ("link", "https://example.com/1"),
            ("author", "Ann"),
        ])
    }

    #[test]
    fn test_webhook_preferred_over_channel() {
        let mut details = ConnectionDetails::channel("c1");
        details.webhook = ConnectionDetails::webhook("w1", "tok").webhook;

        let target = DeliveryTarget::resolve(&details).unwrap();
        assert_eq!(target.kind(), "webhook");
        assert_eq!(
            target.endpoint("https://discord.com/api/v10/"),
            "https://discord.com/api/v10/webhooks/w1/tok"
        );
    }

    #[test]
    fn test_channel_endpoint() {
        let target = DeliveryTarget::resolve(&ConnectionDetails::channel("c1")).unwrap();
        assert!(target.needs_bot_auth());
        assert_eq!(
            target.endpoint("https://discord.com/api/v10"),
            "https://discord.com/api/v10/channels/c1/messages"
        );
    }

    #[test]
    fn test_no_target() {
        assert!(DeliveryTarget::resolve(&ConnectionDetails::default()).is_none());
        assert!(DeliveryTarget::resolve(&ConnectionDetails::channel("")).is_none());
    }

    #[test]
    fn test_payload_uses_platform_field_names() {
        let details = ConnectionDetails::channel("c1")
            .with_content("New: {{title}}")
            .with_embeds(vec![EmbedTemplate {
                title: Some("{{title}}".to_string()),
                url: Some("{{link}}".to_string()),
                author: Some(EmbedAuthorTemplate {
                    name: Some("{{author}}".to_string()),
                    icon_url: Some("https://img.example/a.png".to_string()),
                }),
                image_url: Some("{{image}}".to_string()),
                fields: vec![EmbedFieldTemplate {
                    name: "By".to_string(),
                    value: "{{author}}".to_string(),
                    inline: true,
                }],
                ..Default::default()
            }]);
        let target = DeliveryTarget::resolve(&details).unwrap();
        let payload = MessagePayload::build(&details, &target, &article());

        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "content": "New: Hello",
                "embeds": [{
                    "title": "Hello",
                    "url": "https://example.com/1",
                    "author": { "name": "Ann", "icon_url": "https://img.example/a.png" },
                    "fields": [{ "name": "By", "value": "Ann", "inline": true }]
                }]
            })
        );
    }

    #[test]
    fn test_default_content_and_webhook_identity() {
        let mut details = ConnectionDetails::webhook("w1", "tok");
        if let Some(webhook) = details.webhook.as_mut() {
            webhook.name = Some("{{author}} bot".to_string());
        }
        let target = DeliveryTarget::resolve(&details).unwrap();
        let payload = MessagePayload::build(&details, &target, &article());

        assert_eq!(payload.content.as_deref(), Some("Hello\nhttps://example.com/1"));
        assert_eq!(payload.username.as_deref(), Some("Ann bot"));
        assert!(payload.embeds.is_empty());
    }

    #[test]
    fn test_content_truncated() {
        let long = "x".repeat(3000);
        let details = ConnectionDetails::channel("c1").with_content("{{title}}");
        let target = DeliveryTarget::resolve(&details).unwrap();
        let payload =
            MessagePayload::build(&details, &target, &Article::from_fields([("title", long)]));
        let content = payload.content.unwrap();
        assert_eq!(content.chars().count(), 2000);
        assert!(content.ends_with("..."));
    }
}
