//! Cadence ticks: publish fetch and delivery work for due feeds.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use super::matcher::{distinct_urls, ScheduleMatcher};
use crate::bus::{
    DeliverArticlesEvent, DeliveryFeed, DeliveryMedium, FetchRequest, MessageBroker,
    FEED_DELIVER_ARTICLES, URL_FETCH,
};
use crate::db::Database;
use crate::entitlement::EntitlementLookup;
use crate::feed::{ConnectionRepository, ScheduleRepository};
use crate::Result;

/// Messages published for one cadence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub urls: usize,
    pub feeds: usize,
}

/// Publishes the work of one cadence.
#[derive(Clone)]
pub struct ScheduleHandler {
    db: Database,
    broker: MessageBroker,
    entitlements: Arc<dyn EntitlementLookup>,
    default_cadence: u64,
}

impl ScheduleHandler {
    pub fn new(
        db: Database,
        broker: MessageBroker,
        entitlements: Arc<dyn EntitlementLookup>,
        default_cadence: u64,
    ) -> Self {
        Self {
            db,
            broker,
            entitlements,
            default_cadence,
        }
    }

    pub fn default_cadence(&self) -> u64 {
        self.default_cadence
    }

    /// Every cadence that currently has a population, ascending.
    pub async fn cadences(&self) -> Result<Vec<u64>> {
        let schedules = ScheduleRepository::new(self.db.pool()).list_all().await?;
        let mut cadences: Vec<u64> = std::iter::once(self.default_cadence)
            .chain(schedules.iter().map(|s| s.rate_seconds()))
            .chain(
                self.entitlements
                    .refresh_rate_overrides()
                    .iter()
                    .map(|a| a.rate_seconds()),
            )
            .filter(|c| *c > 0)
            .collect();
        cadences.sort_unstable();
        cadences.dedup();
        Ok(cadences)
    }

    /// Publish `url.fetch` per due URL and `feed.deliver-articles` per due
    /// feed at `cadence` seconds.
    pub async fn handle_refresh_rate(&self, cadence: u64) -> Result<RefreshSummary> {
        let schedules = ScheduleRepository::new(self.db.pool()).list_all().await?;
        let accounts = self.entitlements.refresh_rate_overrides();

        let feeds = ScheduleMatcher::new(self.db.pool())
            .due_feeds(cadence, self.default_cadence, &schedules, &accounts)
            .await?;
        let urls = distinct_urls(&feeds);

        for url in &urls {
            self.broker
                .publish(
                    URL_FETCH,
                    &FetchRequest {
                        url: url.clone(),
                        rate_seconds: cadence,
                    },
                )
                .await?;
        }

        let connections = ConnectionRepository::new(self.db.pool());
        for feed in &feeds {
            let mediums: Vec<DeliveryMedium> = connections
                .list_enabled_by_feed(feed.id)
                .await?
                .iter()
                .map(DeliveryMedium::from)
                .collect();
            let benefits = self.entitlements.benefits_of(&feed.owner_id);

            self.broker
                .publish(
                    FEED_DELIVER_ARTICLES,
                    &DeliverArticlesEvent {
                        article_day_limit: benefits.max_daily_articles,
                        feed: DeliveryFeed::from(feed),
                        mediums,
                    },
                )
                .await?;
        }

        debug!(cadence, urls = urls.len(), feeds = feeds.len(), "Published refresh work");
        Ok(RefreshSummary {
            urls: urls.len(),
            feeds: feeds.len(),
        })
    }
}

/// Background loop running each cadence when it comes due.
pub struct Scheduler {
    handler: ScheduleHandler,
    tick: Duration,
}

impl Scheduler {
    pub fn new(handler: ScheduleHandler, tick_secs: u64) -> Self {
        Self {
            handler,
            tick: Duration::from_secs(tick_secs.max(1)),
        }
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(tick_secs = self.tick.as_secs(), "Scheduler started");

        let mut timer = interval(self.tick);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_run: HashMap<u64, Instant> = HashMap::new();

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.run_due_cadences(&mut last_run, Instant::now()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// Run every cadence whose interval elapsed since its last run.
    pub async fn run_due_cadences(&self, last_run: &mut HashMap<u64, Instant>, now: Instant) {
        let cadences = match self.handler.cadences().await {
            Ok(cadences) => cadences,
            Err(e) => {
                error!("Failed to load cadences: {}", e);
                return;
            }
        };

        for cadence in cadences {
            let due = last_run
                .get(&cadence)
                .map(|at| now.duration_since(*at) >= Duration::from_secs(cadence))
                .unwrap_or(true);
            if !due {
                continue;
            }

            match self.handler.handle_refresh_rate(cadence).await {
                Ok(summary) => {
                    last_run.insert(cadence, now);
                    if summary.feeds > 0 {
                        info!(cadence, urls = summary.urls, feeds = summary.feeds, "Refresh tick");
                    }
                }
                Err(e) => error!(cadence, "Failed to handle refresh rate: {}", e),
            }
        }
    }
}
