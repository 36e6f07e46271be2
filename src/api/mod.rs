//! HTTP surface over the statistics aggregator and the metadata provider.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::model::{parse_video_id, UserWatchRecord, VideoId, VideoStats};
use crate::service::stats::{DEFAULT_RANKING_LIMIT, MAX_RANKING_LIMIT};
use crate::service::youtube::{fetch_metadata, VideoMetadata};

pub use error::*;
pub use state::*;

mod error;
mod state;

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

pub fn create_router(app: App) -> Router {
    Router::new()
        .route("/watches", post(record_watch))
        .route("/videos/:video_id", get(video_metadata))
        .route("/videos/:video_id/stats", get(video_stats))
        .route("/rankings", get(rankings))
        .route("/stats/recompute", post(recompute))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(app)
}

/// Path segments may carry a bare id or a percent-encoded watch url.
fn parse_path_id(text: String) -> Result<VideoId> {
    parse_video_id(&text).context(InvalidVideoIdSnafu { text })
}

#[instrument(skip(app, payload))]
async fn record_watch(
    State(app): State<App>, payload: std::result::Result<Json<UserWatchRecord>, JsonRejection>,
) -> Result<Json<VideoStats>> {
    let Json(record) = payload.map_err(|rejection| ApiError::InvalidBody {
        message: rejection.body_text(),
    })?;

    let stats = app.aggregator.record_watch(record).await.context(AggregationSnafu)?;
    Ok(Json(stats))
}

#[instrument(skip(app))]
async fn video_stats(State(app): State<App>, Path(video_id): Path<String>) -> Result<Json<VideoStats>> {
    let video_id = parse_path_id(video_id)?;

    let stats = app
        .aggregator
        .stats(&video_id)
        .await
        .context(AggregationSnafu)?
        .context(StatsNotFoundSnafu { video_id })?;

    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
struct RankingQuery {
    limit: Option<usize>,
}

#[instrument(skip(app))]
async fn rankings(State(app): State<App>, Query(query): Query<RankingQuery>) -> Result<Json<Vec<VideoStats>>> {
    let limit = query.limit.unwrap_or(DEFAULT_RANKING_LIMIT).min(MAX_RANKING_LIMIT);

    let stats = app.aggregator.rankings(limit).await.context(AggregationSnafu)?;
    Ok(Json(stats))
}

#[derive(Debug, Serialize, Deserialize)]
struct Recomputed {
    videos: usize,
}

#[instrument(skip(app))]
async fn recompute(State(app): State<App>) -> Result<Json<Recomputed>> {
    let videos = app.aggregator.recompute().await.context(AggregationSnafu)?;
    Ok(Json(Recomputed { videos }))
}

#[instrument(skip(app))]
async fn video_metadata(State(app): State<App>, Path(video_id): Path<String>) -> Result<Json<VideoMetadata>> {
    let video_id = parse_path_id(video_id)?;
    let youtube = app.youtube.as_ref().context(MetadataUnavailableSnafu)?;

    let metadata = fetch_metadata(youtube, &video_id, app.metadata_timeout)
        .await
        .context(MetadataSnafu)?;

    Ok(Json(metadata))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::{json, Value};

    use super::*;
    use crate::service::stats::{StatsAggregator, StatsStore};

    fn server() -> TestServer {
        let app = App::new(
            StatsAggregator::new(StatsStore::memory()),
            None,
            Duration::from_secs(1),
        );
        TestServer::new(create_router(app)).unwrap()
    }

    async fn post_watch(server: &TestServer, user: &str, video: &str, liked: bool) -> VideoStats {
        let response = server
            .post("/watches")
            .json(&json!({ "userId": user, "videoId": video, "watchCount": 1, "liked": liked }))
            .await;
        response.assert_status_ok();
        response.json()
    }

    #[tokio::test]
    async fn posting_a_watch_returns_the_aggregate() {
        let server = server();

        let stats = post_watch(&server, "alice", "dQw4w9WgXcQ", true).await;
        assert_eq!(stats.total_views, 1);
        assert_eq!(stats.total_likes, 1);
        assert_eq!(stats.unique_viewers, 1);

        let response = server.get("/videos/dQw4w9WgXcQ/stats").await;
        response.assert_status_ok();
        assert_eq!(response.json::<VideoStats>(), stats);
    }

    #[tokio::test]
    async fn invalid_ids_are_rejected() {
        let server = server();

        let response = server
            .post("/watches")
            .json(&json!({ "userId": "alice", "videoId": "undefined" }))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

        let response = server.get("/videos/null/stats").await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["status"], 400);
    }

    #[tokio::test]
    async fn stats_accept_encoded_watch_urls() {
        let server = server();
        post_watch(&server, "alice", "dQw4w9WgXcQ", false).await;

        for path in [
            "/videos/https%3A%2F%2Fyoutu.be%2FdQw4w9WgXcQ/stats",
            "/videos/https%3A%2F%2Fwww.youtube.com%2Fwatch%3Fv%3DdQw4w9WgXcQ/stats",
        ] {
            let response = server.get(path).await;
            response.assert_status_ok();
            assert_eq!(response.json::<VideoStats>().video_id.as_str(), "dQw4w9WgXcQ");
        }

        let response = server.get("/videos/https%3A%2F%2Fexample.com%2Fwatch/stats").await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_video_is_not_found() {
        let response = server().get("/videos/missing/stats").await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rankings_respect_the_limit() {
        let server = server();
        post_watch(&server, "alice", "a", false).await;
        post_watch(&server, "alice", "b", false).await;
        post_watch(&server, "bob", "b", false).await;

        let ranked: Vec<VideoStats> = server.get("/rankings").await.json();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].video_id.as_str(), "b");

        let ranked: Vec<VideoStats> = server.get("/rankings").add_query_param("limit", 1).await.json();
        assert_eq!(ranked.len(), 1);
    }

    #[tokio::test]
    async fn recompute_reports_the_number_of_videos() {
        let server = server();
        post_watch(&server, "alice", "a", false).await;
        post_watch(&server, "alice", "a", false).await;
        post_watch(&server, "bob", "b", false).await;

        let response = server.post("/stats/recompute").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>(), json!({ "videos": 2 }));

        // the duplicate event for `a` is folded back into a single view
        let stats: VideoStats = server.get("/videos/a/stats").await.json();
        assert_eq!(stats.total_views, 1);
    }

    #[tokio::test]
    async fn metadata_requires_an_api_key() {
        let response = server().get("/videos/dQw4w9WgXcQ").await;
        assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
