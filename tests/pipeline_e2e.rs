//! End-to-end runs of the worker pipeline against mock feed and chat servers.

mod common;

use tokio::sync::watch;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{deliver_event, rss, test_config, wait_until, Item};
use feedrelay::article::ArticleHistoryRepository;
use feedrelay::bus::{FetchRequest, FEED_DELIVER_ARTICLES, URL_FETCH};
use feedrelay::delivery::{ArticleDeliveryStatus, DeliveryRecordRepository};
use feedrelay::feed::{
    ConnectionDetails, ConnectionDisabledCode, ConnectionRepository, Feed, FeedConnection,
    FeedRepository, NewConnection, NewFeed,
};
use feedrelay::fetcher::FetchAttemptRepository;
use feedrelay::{Collaborators, Database, Pipeline};

struct Harness {
    pipeline: Pipeline,
    db: Database,
    feed_server: MockServer,
    feed: Feed,
    shutdown: watch::Sender<bool>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl Harness {
    async fn start(chat_server: &MockServer) -> Self {
        let feed_server = MockServer::start().await;
        let mut config = test_config();
        config.delivery.api_base_url = chat_server.uri();

        let db = Database::open_in_memory().await.unwrap();
        let pipeline =
            Pipeline::new(&config, db.clone(), Collaborators::from_config(&config).unwrap())
                .unwrap();
        let feed = FeedRepository::new(db.pool())
            .create(&NewFeed::new(
                "alice",
                "News",
                format!("{}/rss", feed_server.uri()),
            ))
            .await
            .unwrap();

        let (shutdown, rx) = watch::channel(false);
        let handles = pipeline.spawn_workers(&rx).unwrap();
        Self {
            pipeline,
            db,
            feed_server,
            feed,
            shutdown,
            handles,
        }
    }

    async fn serve(&self, body: String) {
        self.feed_server.reset().await;
        Mock::given(method("GET"))
            .and(path("/rss"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&self.feed_server)
            .await;
    }

    async fn fetch(&self) {
        let before = self.attempts().await;
        self.pipeline
            .broker()
            .publish(
                URL_FETCH,
                &FetchRequest {
                    url: self.feed.url.clone(),
                    rate_seconds: 0,
                },
            )
            .await
            .unwrap();
        assert!(wait_until(move || async move { self.attempts().await > before }).await);
    }

    async fn attempts(&self) -> usize {
        FetchAttemptRepository::new(self.db.pool())
            .list_by_url(&self.feed.url, 100)
            .await
            .unwrap()
            .len()
    }

    async fn deliver(&self, connections: &[FeedConnection]) {
        self.pipeline
            .broker()
            .publish(
                FEED_DELIVER_ARTICLES,
                &deliver_event(&self.feed, connections, 50),
            )
            .await
            .unwrap();
    }

    async fn seed(&self, connections: &[FeedConnection]) {
        self.deliver(connections).await;
        let feed_id = self.feed.id;
        assert!(
            wait_until(move || async move {
                ArticleHistoryRepository::new(self.db.pool())
                    .has_any(feed_id)
                    .await
                    .unwrap()
            })
            .await
        );
    }

    async fn records(&self) -> usize {
        DeliveryRecordRepository::new(self.db.pool())
            .list_by_feed(self.feed.id, 100)
            .await
            .unwrap()
            .len()
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        for handle in self.handles {
            tokio::time::timeout(common::DEFAULT_TIMEOUT, handle)
                .await
                .unwrap()
                .unwrap();
        }
    }
}

#[tokio::test]
async fn test_new_article_reaches_channel() {
    let chat = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/channels/chan-1/messages"))
        .and(header("authorization", "Bot test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&chat)
        .await;

    let harness = Harness::start(&chat).await;
    let connection = ConnectionRepository::new(harness.db.pool())
        .create(&NewConnection::new(
            harness.feed.id,
            "main",
            ConnectionDetails::channel("chan-1"),
        ))
        .await
        .unwrap();
    let connections = vec![connection.clone()];

    harness.serve(rss(&[Item::new("1", "One")])).await;
    harness.fetch().await;
    harness.seed(&connections).await;
    assert_eq!(harness.records().await, 0);

    harness
        .serve(rss(&[Item::new("2", "Two"), Item::new("1", "One")]))
        .await;
    harness.fetch().await;
    harness.deliver(&connections).await;
    let h = &harness;
    assert!(wait_until(move || async move { h.records().await == 1 }).await);

    let records = DeliveryRecordRepository::new(harness.db.pool())
        .list_by_feed(harness.feed.id, 10)
        .await
        .unwrap();
    assert_eq!(records[0].status, ArticleDeliveryStatus::Sent);
    assert_eq!(records[0].article_id.as_deref(), Some("2"));
    assert_eq!(records[0].medium_id, connection.id);

    harness.stop().await;
    chat.verify().await;
}

#[tokio::test]
async fn test_rejected_message_disables_connection() {
    let chat = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhooks/hook-1/secret"))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"message":"Invalid Form Body"}"#))
        .mount(&chat)
        .await;

    let harness = Harness::start(&chat).await;
    let connection = ConnectionRepository::new(harness.db.pool())
        .create(&NewConnection::new(
            harness.feed.id,
            "hook",
            ConnectionDetails::webhook("hook-1", "secret"),
        ))
        .await
        .unwrap();
    let connections = vec![connection.clone()];

    harness.serve(rss(&[Item::new("1", "One")])).await;
    harness.fetch().await;
    harness.seed(&connections).await;

    harness
        .serve(rss(&[Item::new("2", "Two"), Item::new("1", "One")]))
        .await;
    harness.fetch().await;
    harness.deliver(&connections).await;

    let feed_id = harness.feed.id;
    let connection_id = connection.id.clone();
    let db = harness.db.clone();
    assert!(
        wait_until(|| {
            let db = db.clone();
            let connection_id = connection_id.clone();
            async move {
                ConnectionRepository::new(db.pool())
                    .get(feed_id, &connection_id)
                    .await
                    .unwrap()
                    .map(|c| c.disabled_code == Some(ConnectionDisabledCode::BadFormat))
                    .unwrap_or(false)
            }
        })
        .await
    );

    let records = DeliveryRecordRepository::new(harness.db.pool())
        .list_by_feed(feed_id, 10)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ArticleDeliveryStatus::Rejected);

    harness.stop().await;
}

#[tokio::test]
async fn test_refresh_tick_publishes_fetch_for_due_feed() {
    let chat = MockServer::start().await;
    let harness = Harness::start(&chat).await;
    harness.serve(rss(&[Item::new("1", "One")])).await;

    let summary = harness
        .pipeline
        .schedule()
        .handle_refresh_rate(harness.pipeline.schedule().default_cadence())
        .await
        .unwrap();
    assert_eq!(summary.urls, 1);
    assert_eq!(summary.feeds, 1);

    let h = &harness;
    assert!(wait_until(move || async move { h.attempts().await == 1 }).await);
    harness.stop().await;
}
