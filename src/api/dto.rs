//! Request and response bodies of the operations API.

use serde::{Deserialize, Serialize};

use crate::delivery::DeliveryRecord;
use crate::feed::{Feed, FeedConnection};
use crate::fetcher::FetchAttempt;

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// A feed together with its connections.
#[derive(Debug, Serialize)]
pub struct FeedResponse {
    #[serde(flatten)]
    pub feed: Feed,
    pub connections: Vec<FeedConnection>,
}

/// Query of the record listings (`delivery-records`, `fetch-attempts`).
#[derive(Debug, Default, Deserialize)]
pub struct RecordsQuery {
    pub limit: Option<u32>,
}

impl RecordsQuery {
    pub const DEFAULT_LIMIT: u32 = 25;
    pub const MAX_LIMIT: u32 = 100;

    /// Requested limit clamped to `1..=MAX_LIMIT`.
    pub fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

#[derive(Debug, Serialize)]
pub struct DeliveryRecordsResponse {
    pub records: Vec<DeliveryRecord>,
}

#[derive(Debug, Serialize)]
pub struct FetchAttemptsResponse {
    pub attempts: Vec<FetchAttempt>,
}

/// Daily article limit status of a feed.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResponse {
    pub window_seconds: u64,
    pub max: u32,
    pub progress: u32,
    pub remaining: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_query_limit() {
        assert_eq!(RecordsQuery::default().limit(), 25);
        assert_eq!(RecordsQuery { limit: Some(0) }.limit(), 1);
        assert_eq!(RecordsQuery { limit: Some(500) }.limit(), 100);
        assert_eq!(RecordsQuery { limit: Some(7) }.limit(), 7);
    }

    #[test]
    fn test_rate_limit_response_is_camel_case() {
        let value = serde_json::to_value(RateLimitResponse {
            window_seconds: 86400,
            max: 50,
            progress: 3,
            remaining: 47,
        })
        .unwrap();
        assert_eq!(value["windowSeconds"], 86400);
        assert_eq!(value["remaining"], 47);
    }
}
