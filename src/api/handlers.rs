//! Handlers of the operations API.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::db::Database;
use crate::delivery::{DeliveryRateLimiter, DeliveryRecordRepository, DAILY_WINDOW};
use crate::entitlement::EntitlementLookup;
use crate::feed::{
    ConnectionMessageUpdate, ConnectionRepository, Feed, FeedConnection, FeedRepository,
    FeedService,
};
use crate::fetcher::{FeedFetcher, FetchAttemptRepository};
use crate::pipeline::Pipeline;

use super::dto::{
    ApiResponse, DeliveryRecordsResponse, FeedResponse, FetchAttemptsResponse, RateLimitResponse,
    RecordsQuery,
};
use super::error::ApiError;

/// Shared state of the API handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub fetcher: FeedFetcher,
    pub limiter: Arc<DeliveryRateLimiter>,
    pub entitlements: Arc<dyn EntitlementLookup>,
}

impl AppState {
    /// State sharing the pipeline's database, fetcher and limiter.
    pub fn from_pipeline(pipeline: &Pipeline) -> Self {
        Self {
            db: pipeline.database().clone(),
            fetcher: pipeline.fetcher().clone(),
            limiter: Arc::clone(pipeline.limiter()),
            entitlements: Arc::clone(pipeline.entitlements()),
        }
    }
}

async fn load_feed(state: &AppState, id: i64) -> Result<Feed, ApiError> {
    FeedRepository::new(state.db.pool())
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("feed not found"))
}

/// GET /api/feeds/:id - Feed with its connections.
pub async fn get_feed(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<FeedResponse>>, ApiError> {
    let feed = load_feed(&state, id).await?;
    let connections = ConnectionRepository::new(state.db.pool())
        .list_by_feed(id)
        .await?;

    Ok(Json(ApiResponse::new(FeedResponse { feed, connections })))
}

/// GET /api/feeds/:id/delivery-records - Latest delivery records, newest first.
pub async fn list_delivery_records(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<ApiResponse<DeliveryRecordsResponse>>, ApiError> {
    load_feed(&state, id).await?;
    let records = DeliveryRecordRepository::new(state.db.pool())
        .list_by_feed(id, query.limit())
        .await?;

    Ok(Json(ApiResponse::new(DeliveryRecordsResponse { records })))
}

/// GET /api/feeds/:id/fetch-attempts - Latest fetches of the feed's URL.
pub async fn list_fetch_attempts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<ApiResponse<FetchAttemptsResponse>>, ApiError> {
    let feed = load_feed(&state, id).await?;
    let attempts = FetchAttemptRepository::new(state.db.pool())
        .list_by_url(&feed.url, i64::from(query.limit()))
        .await?;

    Ok(Json(ApiResponse::new(FetchAttemptsResponse { attempts })))
}

/// GET /api/feeds/:id/rate-limits - Daily article limit status.
pub async fn get_rate_limits(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<RateLimitResponse>>, ApiError> {
    let feed = load_feed(&state, id).await?;
    let max = state
        .entitlements
        .benefits_of(&feed.owner_id)
        .max_daily_articles;
    let progress = state.limiter.usage(id, DAILY_WINDOW).await?;

    Ok(Json(ApiResponse::new(RateLimitResponse {
        window_seconds: DAILY_WINDOW.as_secs(),
        max,
        progress,
        remaining: max.saturating_sub(progress),
    })))
}

/// POST /api/feeds/:id/retry - Fetch a failed feed now and restore it.
pub async fn retry_feed(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Feed>>, ApiError> {
    let feed = FeedService::new(&state.db)
        .retry_failed_feed(id, &state.fetcher)
        .await?;

    Ok(Json(ApiResponse::new(feed)))
}

/// PATCH /api/feeds/:feed_id/connections/:connection_id - Edit message templates.
pub async fn update_connection(
    State(state): State<Arc<AppState>>,
    Path((feed_id, connection_id)): Path<(i64, String)>,
    Json(update): Json<ConnectionMessageUpdate>,
) -> Result<Json<ApiResponse<FeedConnection>>, ApiError> {
    if !update.touches_message() {
        return Err(ApiError::bad_request("nothing to update"));
    }
    let connection = FeedService::new(&state.db)
        .update_connection_message(feed_id, &connection_id, &update)
        .await?;

    Ok(Json(ApiResponse::new(connection)))
}
