use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use snafu::ResultExt;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::instrument;
use url::Url;

use crate::model::VideoId;
use crate::time::VideoDuration;

pub use error::*;

mod error;

pub const YOUTUBE_API_URL: &str = "https://www.googleapis.com/youtube/v3/";

/// Everything the watch core needs to know about a video, normalized once at ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub id: VideoId,
    pub title: String,
    pub channel_title: String,
    pub thumbnail_url: Option<String>,
    pub duration: VideoDuration,
    pub view_count: u64,
    pub like_count: u64,
}

pub trait MetadataProvider: Send + Sync {
    fn video(&self, video_id: &VideoId) -> impl Future<Output = Result<VideoMetadata>> + Send;
}

/// Fetch metadata, giving up after `timeout`.
pub async fn fetch_metadata<P: MetadataProvider>(
    provider: &P, video_id: &VideoId, timeout: Duration,
) -> Result<VideoMetadata> {
    match tokio::time::timeout(timeout, provider.video(video_id)).await {
        Ok(result) => result,
        Err(_) => TimeoutSnafu {
            video_id: video_id.clone(),
            timeout,
        }
        .fail(),
    }
}

/// The duration of a video, or zero when it cannot be fetched in time.
pub async fn fetch_duration_or_default<P: MetadataProvider>(
    provider: &P, video_id: &VideoId, timeout: Duration,
) -> VideoDuration {
    match fetch_metadata(provider, video_id, timeout).await {
        Ok(metadata) => metadata.duration,
        Err(error) => {
            tracing::warn!(%video_id, %error, "could not fetch video duration, falling back to 0:00");
            VideoDuration::zero()
        }
    }
}

/// YouTube Data API v3 client.
#[derive(Clone)]
pub struct YouTube {
    client: reqwest::Client,
    api_key: String,
    videos_url: Url,
}

impl std::fmt::Debug for YouTube {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YouTube")
            .field("videos_url", &self.videos_url)
            .finish_non_exhaustive()
    }
}

impl YouTube {
    pub fn new(api_key: impl Into<String>, base_url: &Url) -> Result<Self, url::ParseError> {
        Ok(Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            videos_url: base_url.join("videos")?,
        })
    }

    async fn fetch(&self, video_id: &VideoId) -> Result<VideoMetadata> {
        tracing::debug!("fetch video `{}` from the data api", video_id);

        let response = self
            .client
            .get(self.videos_url.clone())
            .query(&[
                ("part", "snippet,contentDetails,statistics"),
                ("id", video_id.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .context(RequestSnafu { video_id: video_id.clone() })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context(RequestSnafu { video_id: video_id.clone() })?;

        if !status.is_success() {
            return ApiSnafu {
                video_id: video_id.clone(),
                status: status.as_u16(),
                message: api_error_message(&body),
            }
            .fail();
        }

        let response: VideoListResponse =
            serde_json::from_str(&body).context(InvalidBodySnafu { video_id: video_id.clone() })?;

        response.into_metadata(video_id)
    }
}

impl MetadataProvider for YouTube {
    #[instrument(skip(self))]
    async fn video(&self, video_id: &VideoId) -> Result<VideoMetadata> {
        let strategy = ExponentialBackoff::from_millis(50).map(jitter).take(2);

        RetryIf::spawn(strategy, || self.fetch(video_id), MetadataError::is_transient).await
    }
}

fn api_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ApiErrorBody {
        error: ApiErrorDetail,
    }

    #[derive(Deserialize)]
    struct ApiErrorDetail {
        message: String,
    }

    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(body) => body.error.message,
        Err(_) => body.chars().take(200).collect(),
    }
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<RawVideo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVideo {
    #[serde(default)]
    snippet: Option<RawSnippet>,
    #[serde(default)]
    content_details: Option<RawContentDetails>,
    #[serde(default)]
    statistics: Option<RawStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    channel_title: String,
    #[serde(default)]
    thumbnails: HashMap<String, RawThumbnail>,
}

#[derive(Debug, Deserialize)]
struct RawThumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct RawContentDetails {
    #[serde(default)]
    duration: String,
}

/// The API sends counters as decimal strings.
#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStatistics {
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    view_count: Option<u64>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    like_count: Option<u64>,
}

const THUMBNAIL_PREFERENCE: [&str; 5] = ["maxres", "standard", "high", "medium", "default"];

impl VideoListResponse {
    fn into_metadata(self, video_id: &VideoId) -> Result<VideoMetadata> {
        let video = self
            .items
            .into_iter()
            .next()
            .ok_or_else(|| NotFoundSnafu { video_id: video_id.clone() }.build())?;

        let (title, channel_title, mut thumbnails) = match video.snippet {
            Some(snippet) => (snippet.title, snippet.channel_title, snippet.thumbnails),
            None => Default::default(),
        };

        let thumbnail_url = THUMBNAIL_PREFERENCE
            .iter()
            .find_map(|size| thumbnails.remove(*size))
            .map(|thumbnail| thumbnail.url);

        let duration = video
            .content_details
            .map(|details| VideoDuration::from_encoded(details.duration))
            .unwrap_or_default();

        let (view_count, like_count) = video
            .statistics
            .map(|stats| (stats.view_count.unwrap_or_default(), stats.like_count.unwrap_or_default()))
            .unwrap_or_default();

        Ok(VideoMetadata {
            id: video_id.clone(),
            title,
            channel_title,
            thumbnail_url,
            duration,
            view_count,
            like_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use tokio::time::sleep;

    use super::*;

    const SAMPLE: &str = r#"{
        "kind": "youtube#videoListResponse",
        "items": [{
            "kind": "youtube#video",
            "id": "dQw4w9WgXcQ",
            "snippet": {
                "title": "Never Gonna Give You Up",
                "channelTitle": "Rick Astley",
                "thumbnails": {
                    "default": { "url": "https://i.ytimg.com/vi/dQw4w9WgXcQ/default.jpg" },
                    "high": { "url": "https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg" }
                }
            },
            "contentDetails": { "duration": "PT3M33S" },
            "statistics": { "viewCount": "1500000000", "likeCount": "17000000" }
        }]
    }"#;

    fn id(text: &str) -> VideoId {
        text.parse().unwrap()
    }

    #[test]
    fn normalize_full_response() {
        let response: VideoListResponse = serde_json::from_str(SAMPLE).unwrap();
        let metadata = response.into_metadata(&id("dQw4w9WgXcQ")).unwrap();

        assert_eq!(metadata.title, "Never Gonna Give You Up");
        assert_eq!(metadata.channel_title, "Rick Astley");
        assert_eq!(
            metadata.thumbnail_url.as_deref(),
            Some("https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg")
        );
        assert_eq!(metadata.duration.seconds, 213);
        assert_eq!(metadata.duration.encoded, "PT3M33S");
        assert_eq!(metadata.view_count, 1_500_000_000);
        assert_eq!(metadata.like_count, 17_000_000);
    }

    #[test]
    fn normalize_sparse_response() {
        let response: VideoListResponse =
            serde_json::from_str(r#"{ "items": [{ "statistics": { "viewCount": "12" } }] }"#).unwrap();
        let metadata = response.into_metadata(&id("sparse")).unwrap();

        assert_eq!(metadata.title, "");
        assert_eq!(metadata.thumbnail_url, None);
        assert_eq!(metadata.duration, VideoDuration::zero());
        assert_eq!(metadata.view_count, 12);
        assert_eq!(metadata.like_count, 0);
    }

    #[test]
    fn empty_response_is_not_found() {
        let response: VideoListResponse = serde_json::from_str(r#"{ "items": [] }"#).unwrap();
        let error = response.into_metadata(&id("gone")).unwrap_err();

        assert!(matches!(error, MetadataError::NotFound { .. }));
        assert!(!error.is_transient());
    }

    #[test]
    fn google_error_message_is_extracted() {
        let body = r#"{ "error": { "code": 403, "message": "quota exceeded" } }"#;
        assert_eq!(api_error_message(body), "quota exceeded");
        assert_eq!(api_error_message("bad gateway"), "bad gateway");
    }

    struct Slow;

    impl MetadataProvider for Slow {
        async fn video(&self, video_id: &VideoId) -> Result<VideoMetadata> {
            sleep(Duration::from_secs(60)).await;
            NotFoundSnafu { video_id: video_id.clone() }.fail()
        }
    }

    struct Broken;

    impl MetadataProvider for Broken {
        async fn video(&self, video_id: &VideoId) -> Result<VideoMetadata> {
            ApiSnafu {
                video_id: video_id.clone(),
                status: 500u16,
                message: "backend error",
            }
            .fail()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out_to_zero() {
        let error = fetch_metadata(&Slow, &id("a"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(error, MetadataError::Timeout { .. }));

        let duration = fetch_duration_or_default(&Slow, &id("a"), Duration::from_secs(5)).await;
        assert_eq!(duration.display(), "0:00");
    }

    #[tokio::test]
    async fn failing_provider_falls_back_to_zero() {
        let duration = fetch_duration_or_default(&Broken, &id("a"), Duration::from_secs(5)).await;
        assert_eq!(duration, VideoDuration::zero());
    }

    async fn serve(router: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        Url::parse(&format!("http://{address}/youtube/v3/")).unwrap()
    }

    #[tokio::test]
    async fn client_reads_the_videos_endpoint() {
        let router = Router::new().route(
            "/youtube/v3/videos",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("id").map(String::as_str), Some("dQw4w9WgXcQ"));
                assert_eq!(params.get("key").map(String::as_str), Some("secret"));
                Json(serde_json::from_str::<serde_json::Value>(SAMPLE).unwrap())
            }),
        );

        let youtube = YouTube::new("secret", &serve(router).await).unwrap();
        let metadata = youtube.video(&id("dQw4w9WgXcQ")).await.unwrap();

        assert_eq!(metadata.duration.seconds, 213);
        assert_eq!(metadata.channel_title, "Rick Astley");
    }

    #[tokio::test]
    async fn client_surfaces_api_errors() {
        let router = Router::new().route(
            "/youtube/v3/videos",
            get(|| async {
                (
                    StatusCode::FORBIDDEN,
                    Json(serde_json::json!({ "error": { "code": 403, "message": "quota exceeded" } })),
                )
            }),
        );

        let youtube = YouTube::new("secret", &serve(router).await).unwrap();
        let error = youtube.video(&id("a")).await.unwrap_err();

        match error {
            MetadataError::Api { status, message, .. } => {
                assert_eq!(status, 403);
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
