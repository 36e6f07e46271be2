use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use snafu::Snafu;

use crate::model::{ParseVideoId, VideoId};
use crate::service::stats::AggregationError;
use crate::service::youtube::MetadataError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ApiError {
    #[snafu(display("`{text}` is not a valid video id: {source}"))]
    InvalidVideoId { text: String, source: ParseVideoId },

    #[snafu(display("invalid request body: {message}"))]
    InvalidBody { message: String },

    #[snafu(display("no statistics recorded for video `{video_id}`"))]
    StatsNotFound { video_id: VideoId },

    /// metadata lookups need a YouTube API key
    MetadataUnavailable,

    #[snafu(display("{source}"))]
    Aggregation { source: AggregationError },

    #[snafu(display("{source}"))]
    Metadata { source: MetadataError },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidVideoId { .. } | ApiError::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            ApiError::StatsNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::MetadataUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Aggregation { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Metadata { source } => match source {
                MetadataError::NotFound { .. } => StatusCode::NOT_FOUND,
                MetadataError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: u16,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            status: status.as_u16(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
