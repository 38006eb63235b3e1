//! Article delivery.
//!
//! Every (article, destination) attempt passes the destination filter, then
//! the feed's daily limit, then goes to the platform. Each attempt ends in
//! exactly one delivery record.

pub mod client;
pub mod dispatcher;
pub mod filter;
pub mod medium;
pub mod processor;
pub mod rate_limit;
pub mod record;
pub mod template;
pub mod types;

pub use client::{DiscordRestClient, PlatformClient, SendResponse};
pub use dispatcher::{classify_response, DeliveryDispatcher};
pub use filter::{AcceptAll, FilterEvaluator};
pub use medium::{DeliveryTarget, MessagePayload};
pub use processor::{FeedArticleProcessor, ProcessOutcome};
pub use rate_limit::{DeliveryRateLimiter, RateLimitResult, DAILY_WINDOW};
pub use record::DeliveryRecordRepository;
pub use types::{ArticleDeliveryState, ArticleDeliveryStatus, DeliveryErrorCode, DeliveryRecord};
