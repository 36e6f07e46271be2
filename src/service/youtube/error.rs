use std::time::Duration;

use snafu::Snafu;

use crate::model::VideoId;

pub type Result<T, E = MetadataError> = ::std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetadataError {
    #[snafu(display("error occurred while fetching video `{video_id}`: {source}"))]
    Request {
        video_id: VideoId,
        source: reqwest::Error,
    },

    #[snafu(display("API returned {status} while fetching video `{video_id}`: {message}"))]
    Api {
        video_id: VideoId,
        status: u16,
        message: String,
    },

    #[snafu(display("video `{video_id}` doesn't exist or is private"))]
    NotFound { video_id: VideoId },

    #[snafu(display("malformed response for video `{video_id}`: {source}"))]
    InvalidBody {
        video_id: VideoId,
        source: serde_json::Error,
    },

    #[snafu(display("fetching video `{video_id}` took longer than {timeout:?}"))]
    Timeout { video_id: VideoId, timeout: Duration },
}

impl MetadataError {
    /// Whether trying the same request again could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            MetadataError::Request { .. } | MetadataError::Timeout { .. } => true,
            MetadataError::Api { status, .. } => *status == 429 || *status >= 500,
            MetadataError::NotFound { .. } | MetadataError::InvalidBody { .. } => false,
        }
    }
}
