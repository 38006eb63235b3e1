//! Consumer of `feed.deliver-articles`: select new articles and dispatch.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::dispatcher::DeliveryDispatcher;
use super::types::ArticleDeliveryState;
use crate::article::{parse_articles, Article, ArticleHistoryRepository, ArticleIdResolver};
use crate::bus::DeliverArticlesEvent;
use crate::db::Database;
use crate::feed::FeedRepository;
use crate::fetcher::FetchAttemptRepository;
use crate::Result;

/// What one deliver-articles message led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Nothing to do: missing or inactive feed, no response, unparsable body.
    Skipped(&'static str),
    /// History was (re)initialized; nothing was delivered.
    Seeded { id_type: String, articles: usize },
    /// New articles were dispatched.
    Delivered {
        id_type: String,
        states: Vec<ArticleDeliveryState>,
    },
}

/// Turns the latest response of a feed into deliveries.
#[derive(Clone)]
pub struct FeedArticleProcessor {
    db: Database,
    dispatcher: DeliveryDispatcher,
    id_type_names: Vec<String>,
}

impl FeedArticleProcessor {
    pub fn new(db: Database, dispatcher: DeliveryDispatcher, id_type_names: Vec<String>) -> Self {
        Self {
            db,
            dispatcher,
            id_type_names,
        }
    }

    pub async fn handle_deliver_articles(
        &self,
        event: &DeliverArticlesEvent,
    ) -> Result<ProcessOutcome> {
        self.handle_deliver_articles_at(event, Utc::now()).await
    }

    pub async fn handle_deliver_articles_at(
        &self,
        event: &DeliverArticlesEvent,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome> {
        let feed_id = event.feed.id;
        let feed = match FeedRepository::new(self.db.pool()).get_by_id(feed_id).await? {
            Some(feed) if feed.is_active() => feed,
            Some(_) => return Ok(ProcessOutcome::Skipped("feed inactive")),
            None => return Ok(ProcessOutcome::Skipped("feed not found")),
        };

        let Some(body) = FetchAttemptRepository::new(self.db.pool())
            .latest_ok_body(&feed.url)
            .await?
        else {
            debug!(feed_id, "No successful response yet");
            return Ok(ProcessOutcome::Skipped("no response"));
        };

        let mut articles = match parse_articles(body.as_bytes()) {
            Ok(articles) => articles,
            Err(e) => {
                warn!(feed_id, url = %feed.url, "Skipping unparsable feed: {}", e);
                return Ok(ProcessOutcome::Skipped("parse error"));
            }
        };
        if articles.is_empty() {
            return Ok(ProcessOutcome::Skipped("no articles"));
        }

        let mut resolver = ArticleIdResolver::new(&self.id_type_names);
        for article in &articles {
            resolver.record_article(article);
        }
        let Some(id_type) = resolver.id_type().map(str::to_string) else {
            return Ok(ProcessOutcome::Skipped("no identifier scheme"));
        };
        for article in &mut articles {
            let key = ArticleIdResolver::id_type_value(article, &id_type);
            article.set("id", key);
        }

        let comparison_fields: Vec<&String> = event
            .feed
            .passing_comparisons
            .iter()
            .chain(event.feed.blocking_comparisons.iter())
            .collect();
        let history = ArticleHistoryRepository::new(self.db.pool());

        let reseed = if !history.has_any(feed_id).await? {
            Some("seeding history")
        } else if !history.has_id_type(feed_id, &id_type).await? {
            Some("identifier scheme changed, reseeding history")
        } else {
            None
        };
        if let Some(reason) = reseed {
            info!(feed_id, id_type = %id_type, articles = articles.len(), "{}", reason);
            self.remember(feed_id, &id_type, &articles, &comparison_fields, now)
                .await?;
            return Ok(ProcessOutcome::Seeded {
                id_type,
                articles: articles.len(),
            });
        }

        let mut deliverable: Vec<(usize, &Article)> = Vec::new();
        let mut picked: HashSet<&str> = HashSet::new();
        for (index, article) in articles.iter().enumerate() {
            let Some(key) = article.id() else {
                continue;
            };
            if picked.contains(key) {
                continue;
            }

            let seen = history.contains_key(feed_id, &id_type, key).await?;
            let deliver = if seen {
                self.has_new_value(feed_id, article, &event.feed.passing_comparisons)
                    .await?
            } else {
                !self
                    .has_seen_value(feed_id, article, &event.feed.blocking_comparisons)
                    .await?
            };
            if deliver {
                picked.insert(key);
                deliverable.push((index, article));
            }
        }

        self.remember(feed_id, &id_type, &articles, &comparison_fields, now)
            .await?;

        let ordered = oldest_first(deliverable);
        if ordered.is_empty() {
            return Ok(ProcessOutcome::Delivered {
                id_type,
                states: Vec::new(),
            });
        }

        let states = self
            .dispatcher
            .dispatch(feed_id, event.article_day_limit, &event.mediums, &ordered)
            .await;
        Ok(ProcessOutcome::Delivered { id_type, states })
    }

    /// Store keys and comparison values of the whole batch.
    async fn remember(
        &self,
        feed_id: i64,
        id_type: &str,
        articles: &[Article],
        comparison_fields: &[&String],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let history = ArticleHistoryRepository::new(self.db.pool());
        let keys: Vec<String> = articles
            .iter()
            .filter_map(|a| a.id().map(str::to_string))
            .collect();
        history.store_keys(feed_id, id_type, &keys, now).await?;

        let values: Vec<(String, String)> = articles
            .iter()
            .flat_map(|article| {
                comparison_fields.iter().filter_map(move |field| {
                    article
                        .get(field)
                        .map(|value| (field.to_string(), value.to_string()))
                })
            })
            .collect();
        if !values.is_empty() {
            history.store_field_values(feed_id, &values, now).await?;
        }
        Ok(())
    }

    async fn has_seen_value(&self, feed_id: i64, article: &Article, fields: &[String]) -> Result<bool> {
        let history = ArticleHistoryRepository::new(self.db.pool());
        for field in fields {
            if let Some(value) = article.get(field) {
                if history.contains_field_value(feed_id, field, value).await? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn has_new_value(&self, feed_id: i64, article: &Article, fields: &[String]) -> Result<bool> {
        let history = ArticleHistoryRepository::new(self.db.pool());
        for field in fields {
            if let Some(value) = article.get(field) {
                if !history.contains_field_value(feed_id, field, value).await? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

/// Order `(feed index, article)` pairs oldest first: by `pubdate` when every
/// article has a valid one, otherwise by reversed feed order.
fn oldest_first(mut articles: Vec<(usize, &Article)>) -> Vec<Article> {
    let dates: Option<Vec<DateTime<Utc>>> = articles
        .iter()
        .map(|(_, a)| {
            a.get("pubdate")
                .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
                .map(|d| d.with_timezone(&Utc))
        })
        .collect();

    match dates {
        Some(dates) => {
            let mut dated: Vec<(DateTime<Utc>, usize, &Article)> = dates
                .into_iter()
                .zip(articles)
                .map(|(date, (index, article))| (date, index, article))
                .collect();
            dated.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
            dated.into_iter().map(|(_, _, a)| a.clone()).collect()
        }
        None => {
            articles.sort_by(|a, b| b.0.cmp(&a.0));
            articles.into_iter().map(|(_, a)| a.clone()).collect()
        }
    }
}
