//! Feeds, their delivery connections and cadence overrides.

pub mod repository;
pub mod service;
pub mod types;

pub use repository::{ConnectionRepository, FeedRepository, ScheduleRepository};
pub use service::FeedService;
pub use types::{
    ChannelRef, ConnectionDetails, ConnectionDisabledCode, ConnectionMessageUpdate,
    EmbedAuthorTemplate, EmbedFieldTemplate, EmbedFooterTemplate, EmbedTemplate, Feed,
    FeedConnection, FeedDisabledCode, FeedHealthStatus, NewConnection, NewFeed, WebhookRef,
};
