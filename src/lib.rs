//! feedrelay - RSS/Atom feed relay
//!
//! Polls feed URLs on per-account cadences, detects new articles and
//! delivers them to chat channels and webhooks.

pub mod api;
pub mod article;
pub mod bus;
pub mod config;
pub mod datetime;
pub mod db;
pub mod delivery;
pub mod entitlement;
pub mod error;
pub mod feed;
pub mod fetcher;
pub mod logging;
pub mod pipeline;
pub mod schedule;

pub use config::Config;
pub use db::Database;
pub use error::{RelayError, Result};
pub use pipeline::{Collaborators, Pipeline};
