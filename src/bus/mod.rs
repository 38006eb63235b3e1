//! In-process message broker.
//!
//! Each topic is a bounded queue of JSON envelopes (`{"data": ...}`). A
//! topic may have many consumers; every message goes to exactly one of them.

mod payloads;

pub use payloads::{
    DeliverArticlesEvent, DeliveryFeed, DeliveryMedium, FeedRef, FetchRequest, MediumKey,
    MediumRef, RejectedArticleEvent, UrlFailedEvent,
};

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::trace;

use crate::{RelayError, Result};

/// Fetch one URL.
pub const URL_FETCH: &str = "url.fetch";
/// Disable every feed of a URL that crossed the failure threshold.
pub const URL_FAILED_DISABLE_FEEDS: &str = "url.failed.disable-feeds";
/// Deliver the new articles of a due feed.
pub const FEED_DELIVER_ARTICLES: &str = "feed.deliver-articles";
/// Disable a connection whose message was rejected.
pub const FEED_REJECTED_DISABLE_CONNECTION: &str = "feed.rejected-article.disable-connection";

/// All topics known to the broker.
pub const TOPICS: &[&str] = &[
    URL_FETCH,
    URL_FAILED_DISABLE_FEEDS,
    FEED_DELIVER_ARTICLES,
    FEED_REJECTED_DISABLE_CONNECTION,
];

/// Envelope wrapping every payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

type SharedReceiver = Arc<Mutex<mpsc::Receiver<String>>>;

/// Broker handle. Cloning is cheap; clones share the queues.
#[derive(Clone)]
pub struct MessageBroker {
    senders: Arc<HashMap<&'static str, mpsc::Sender<String>>>,
    receivers: Arc<HashMap<&'static str, SharedReceiver>>,
}

impl MessageBroker {
    /// Create a broker with one queue of `capacity` messages per topic.
    pub fn new(capacity: usize) -> Self {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for topic in TOPICS {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            senders.insert(*topic, tx);
            receivers.insert(*topic, Arc::new(Mutex::new(rx)));
        }
        Self {
            senders: Arc::new(senders),
            receivers: Arc::new(receivers),
        }
    }

    /// Publish a payload; waits while the topic queue is full.
    pub async fn publish<T: Serialize>(&self, topic: &str, data: &T) -> Result<()> {
        let sender = self
            .senders
            .get(topic)
            .ok_or_else(|| RelayError::Broker(format!("unknown topic: {topic}")))?;
        let message = serde_json::to_string(&Envelope { data })?;
        trace!(topic, message = %message, "Publishing message");
        sender
            .send(message)
            .await
            .map_err(|_| RelayError::Broker(format!("topic {topic} is closed")))
    }

    /// Consume from a topic.
    pub fn subscribe(&self, topic: &str) -> Result<Subscription> {
        let receiver = self
            .receivers
            .get(topic)
            .ok_or_else(|| RelayError::Broker(format!("unknown topic: {topic}")))?;
        Ok(Subscription {
            topic: topic.to_string(),
            receiver: Arc::clone(receiver),
        })
    }
}

/// Consumer side of a topic.
#[derive(Clone)]
pub struct Subscription {
    topic: String,
    receiver: SharedReceiver,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next raw message.
    pub async fn recv_raw(&self) -> Option<String> {
        self.receiver.lock().await.recv().await
    }

    /// Wait for the next message and decode its payload.
    ///
    /// `Some(Err(_))` is a malformed message; the consumer should drop it.
    pub async fn recv<T: DeserializeOwned>(&self) -> Option<Result<T>> {
        let raw = self.recv_raw().await?;
        Some(decode(&raw))
    }

    /// Take a message if one is queued.
    pub fn try_recv<T: DeserializeOwned>(&self) -> Option<Result<T>> {
        let mut receiver = self.receiver.try_lock().ok()?;
        let raw = receiver.try_recv().ok()?;
        Some(decode(&raw))
    }
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let envelope: Envelope<T> = serde_json::from_str(raw)?;
    Ok(envelope.data)
}
