//! Worker pools wiring the broker topics to their consumers.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::bus::{
    DeliverArticlesEvent, FetchRequest, MessageBroker, RejectedArticleEvent, Subscription,
    UrlFailedEvent, FEED_DELIVER_ARTICLES, FEED_REJECTED_DISABLE_CONNECTION,
    URL_FAILED_DISABLE_FEEDS, URL_FETCH,
};
use crate::config::Config;
use crate::db::Database;
use crate::delivery::{
    AcceptAll, DeliveryDispatcher, DeliveryRateLimiter, DiscordRestClient, FeedArticleProcessor,
    FilterEvaluator, PlatformClient,
};
use crate::entitlement::{ConfiguredEntitlements, EntitlementLookup};
use crate::feed::FeedService;
use crate::fetcher::FeedFetcher;
use crate::schedule::{ScheduleHandler, Scheduler};
use crate::Result;

/// Single-consumer topics get one worker.
const SIGNAL_WORKERS: usize = 1;

/// External collaborators of the pipeline.
#[derive(Clone)]
pub struct Collaborators {
    pub platform: Arc<dyn PlatformClient>,
    pub filter: Arc<dyn FilterEvaluator>,
    pub entitlements: Arc<dyn EntitlementLookup>,
}

impl Collaborators {
    /// Discord client, accept-all filter and configured entitlements.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            platform: Arc::new(DiscordRestClient::new(&config.delivery)?),
            filter: Arc::new(AcceptAll),
            entitlements: Arc::new(ConfiguredEntitlements::new(&config.entitlements)),
        })
    }
}

/// The assembled ingestion and delivery pipeline.
#[derive(Clone)]
pub struct Pipeline {
    db: Database,
    broker: MessageBroker,
    fetcher: FeedFetcher,
    processor: FeedArticleProcessor,
    schedule: ScheduleHandler,
    limiter: Arc<DeliveryRateLimiter>,
    entitlements: Arc<dyn EntitlementLookup>,
    tick_secs: u64,
    fetch_workers: usize,
    delivery_workers: usize,
}

impl Pipeline {
    pub fn new(config: &Config, db: Database, collaborators: Collaborators) -> Result<Self> {
        let broker = MessageBroker::new(config.broker.queue_capacity);
        let fetcher = FeedFetcher::new(db.clone(), &config.fetcher, broker.clone())?;
        let limiter = Arc::new(DeliveryRateLimiter::new(db.clone()));
        let dispatcher = DeliveryDispatcher::new(
            db.clone(),
            broker.clone(),
            collaborators.platform,
            collaborators.filter,
            Arc::clone(&limiter),
        );
        let processor = FeedArticleProcessor::new(
            db.clone(),
            dispatcher,
            config.delivery.id_type_names.clone(),
        );
        let schedule = ScheduleHandler::new(
            db.clone(),
            broker.clone(),
            Arc::clone(&collaborators.entitlements),
            config.schedule.default_refresh_rate_secs,
        );

        Ok(Self {
            db,
            broker,
            fetcher,
            processor,
            schedule,
            limiter,
            entitlements: collaborators.entitlements,
            tick_secs: config.schedule.tick_secs,
            fetch_workers: config.fetcher.workers.max(1),
            delivery_workers: config.delivery.workers.max(1),
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn broker(&self) -> &MessageBroker {
        &self.broker
    }

    pub fn fetcher(&self) -> &FeedFetcher {
        &self.fetcher
    }

    pub fn processor(&self) -> &FeedArticleProcessor {
        &self.processor
    }

    pub fn schedule(&self) -> &ScheduleHandler {
        &self.schedule
    }

    pub fn limiter(&self) -> &Arc<DeliveryRateLimiter> {
        &self.limiter
    }

    pub fn entitlements(&self) -> &Arc<dyn EntitlementLookup> {
        &self.entitlements
    }

    /// Spawn the consumers of every topic. They stop when `shutdown` flips.
    pub fn spawn_workers(&self, shutdown: &watch::Receiver<bool>) -> Result<Vec<JoinHandle<()>>> {
        let mut handles = Vec::new();

        let fetcher = self.fetcher.clone();
        handles.extend(spawn_consumers(
            self.broker.subscribe(URL_FETCH)?,
            self.fetch_workers,
            shutdown,
            move |request: FetchRequest| {
                let fetcher = fetcher.clone();
                async move {
                    if let Err(e) = fetcher.handle_fetch_request(&request).await {
                        error!(url = %request.url, "Fetch request failed: {}", e);
                    }
                }
            },
        ));

        let processor = self.processor.clone();
        handles.extend(spawn_consumers(
            self.broker.subscribe(FEED_DELIVER_ARTICLES)?,
            self.delivery_workers,
            shutdown,
            move |event: DeliverArticlesEvent| {
                let processor = processor.clone();
                async move {
                    if let Err(e) = processor.handle_deliver_articles(&event).await {
                        error!(feed_id = event.feed.id, "Article delivery failed: {}", e);
                    }
                }
            },
        ));

        let db = self.db.clone();
        handles.extend(spawn_consumers(
            self.broker.subscribe(URL_FAILED_DISABLE_FEEDS)?,
            SIGNAL_WORKERS,
            shutdown,
            move |event: UrlFailedEvent| {
                let db = db.clone();
                async move {
                    if let Err(e) = FeedService::new(&db).mark_failed_requests(&event.url).await {
                        error!(url = %event.url, "Failed to disable feeds: {}", e);
                    }
                }
            },
        ));

        let db = self.db.clone();
        handles.extend(spawn_consumers(
            self.broker.subscribe(FEED_REJECTED_DISABLE_CONNECTION)?,
            SIGNAL_WORKERS,
            shutdown,
            move |event: RejectedArticleEvent| {
                let db = db.clone();
                async move {
                    if let Err(e) = FeedService::new(&db)
                        .disable_connection_bad_format(event.feed.id, &event.medium.id)
                        .await
                    {
                        error!(
                            feed_id = event.feed.id,
                            connection_id = %event.medium.id,
                            "Failed to disable connection: {}",
                            e
                        );
                    }
                }
            },
        ));

        info!(
            fetch_workers = self.fetch_workers,
            delivery_workers = self.delivery_workers,
            "Pipeline workers started"
        );
        Ok(handles)
    }

    /// Spawn the cadence scheduler.
    pub fn spawn_scheduler(&self, shutdown: &watch::Receiver<bool>) -> JoinHandle<()> {
        let scheduler = Scheduler::new(self.schedule.clone(), self.tick_secs);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { scheduler.run(shutdown).await })
    }

    /// Run workers and scheduler until `shutdown` flips, then wait for them.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut handles = self.spawn_workers(&shutdown)?;
        handles.push(self.spawn_scheduler(&shutdown));

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Pipeline task panicked: {}", e);
            }
        }
        info!("Pipeline stopped");
        Ok(())
    }
}

/// Spawn `count` workers consuming `subscription` with `handler`.
///
/// Malformed messages are logged and dropped. A worker finishes the
/// message in hand before honouring shutdown.
fn spawn_consumers<T, F, Fut>(
    subscription: Subscription,
    count: usize,
    shutdown: &watch::Receiver<bool>,
    handler: F,
) -> Vec<JoinHandle<()>>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    (0..count)
        .map(|_| {
            let subscription = subscription.clone();
            let handler = handler.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                        message = subscription.recv::<T>() => match message {
                            Some(Ok(payload)) => handler(payload).await,
                            Some(Err(e)) => {
                                warn!(topic = subscription.topic(), "Dropping malformed message: {}", e)
                            }
                            None => break,
                        },
                    }
                }
            })
        })
        .collect()
}
