//! Feed fetching.
//!
//! Requests for the same URL are gated by recency, every attempt is
//! persisted with its raw response, and a URL that keeps failing for longer
//! than the configured threshold gets its feeds disabled.

pub mod client;
pub mod repository;
pub mod service;
pub mod types;

pub use client::{validate_url, FetchStrategy, HttpFeedClient};
pub use repository::{FailureStreakRepository, FetchAttemptRepository};
pub use service::FeedFetcher;
pub use types::{FailureStreak, FetchAttempt, FetchOutcome, FetchResponse, FetchStatus};
