//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use feedrelay::article::Article;
use feedrelay::bus::{DeliverArticlesEvent, DeliveryFeed, DeliveryMedium, MessageBroker};
use feedrelay::config::Config;
use feedrelay::delivery::{
    DeliveryDispatcher, DeliveryRateLimiter, DeliveryTarget, FeedArticleProcessor,
    FilterEvaluator, MessagePayload, PlatformClient, SendResponse,
};
use feedrelay::feed::{Feed, FeedConnection};
use feedrelay::fetcher::{FetchAttemptRepository, FetchOutcome, FetchResponse};
use feedrelay::{Database, Result};

/// Default timeout for waiting on background work.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed reference time.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Config usable against local mock servers.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.delivery.bot_token = "test-token".to_string();
    config.fetcher.allow_private_hosts = true;
    config.logging.file = String::new();
    config
}

/// One `<item>` of an RSS document.
pub struct Item<'a> {
    pub guid: &'a str,
    pub title: &'a str,
    pub pub_date: Option<&'a str>,
}

impl<'a> Item<'a> {
    pub fn new(guid: &'a str, title: &'a str) -> Self {
        Self {
            guid,
            title,
            pub_date: None,
        }
    }

    /// RFC 2822 publication date.
    pub fn published(mut self, pub_date: &'a str) -> Self {
        self.pub_date = Some(pub_date);
        self
    }
}

/// Render an RSS 2.0 document with the given items, in order.
pub fn rss(items: &[Item<'_>]) -> String {
    let mut body = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Test Feed</title><link>https://example.com</link><description>Test</description>"#,
    );
    for item in items {
        body.push_str("<item>");
        body.push_str(&format!("<guid>{}</guid>", item.guid));
        body.push_str(&format!("<title>{}</title>", item.title));
        body.push_str(&format!(
            "<link>https://example.com/articles/{}</link>",
            item.guid
        ));
        if let Some(date) = item.pub_date {
            body.push_str(&format!("<pubDate>{}</pubDate>", date));
        }
        body.push_str("</item>");
    }
    body.push_str("</channel></rss>");
    body
}

/// Store `body` as a successful response of `url` at `at`.
pub async fn store_ok_body(db: &Database, url: &str, body: String, at: DateTime<Utc>) {
    FetchAttemptRepository::new(db.pool())
        .record(
            url,
            &FetchOutcome::from_response(FetchResponse {
                status_code: 200,
                body: Some(body),
                is_anti_block: false,
            }),
            at,
        )
        .await
        .unwrap();
}

/// Deliver-articles message for `feed` to `connections`.
pub fn deliver_event(feed: &Feed, connections: &[FeedConnection], limit: u32) -> DeliverArticlesEvent {
    DeliverArticlesEvent {
        article_day_limit: limit,
        feed: DeliveryFeed::from(feed),
        mediums: connections.iter().map(DeliveryMedium::from).collect(),
    }
}

/// Platform client that records every message and answers with `status`.
pub struct CapturingClient {
    status: u16,
    sent: Mutex<Vec<(DeliveryTarget, MessagePayload)>>,
}

impl CapturingClient {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<(DeliveryTarget, MessagePayload)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlatformClient for CapturingClient {
    async fn send(&self, target: &DeliveryTarget, payload: &MessagePayload) -> Result<SendResponse> {
        self.sent
            .lock()
            .unwrap()
            .push((target.clone(), payload.clone()));
        Ok(SendResponse {
            status: self.status,
            body: String::new(),
        })
    }
}

/// Passes articles whose title contains `{"titleContains": "..."}`.
pub struct TitleContains;

impl FilterEvaluator for TitleContains {
    fn passes(&self, article: &Article, expression: &Value) -> bool {
        let needle = expression["titleContains"].as_str().unwrap_or_default();
        article
            .get("title")
            .map(|title| title.contains(needle))
            .unwrap_or(false)
    }
}

/// Processor wired to a capturing client and the title filter.
pub fn processor(db: &Database, client: Arc<CapturingClient>) -> FeedArticleProcessor {
    let dispatcher = DeliveryDispatcher::new(
        db.clone(),
        MessageBroker::new(64),
        client,
        Arc::new(TitleContains),
        Arc::new(DeliveryRateLimiter::new(db.clone())),
    );
    FeedArticleProcessor::new(
        db.clone(),
        dispatcher,
        vec!["guid".to_string(), "pubdate".to_string(), "title".to_string()],
    )
}

/// Poll `check` until it returns true or the timeout expires.
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + DEFAULT_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
