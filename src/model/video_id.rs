use snafu::{OptionExt as _, Snafu};

use super::*;

/// Ids the frontend writes when no video is selected yet.
const PLACEHOLDER_IDS: [&str; 2] = ["undefined", "null"];

/// A YouTube video id.
///
/// Construction rejects empty, whitespace-only and placeholder ids so that every
/// `VideoId` in circulation can be used as a storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VideoId(String);

impl VideoId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for VideoId {
    type Err = ParseVideoId;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let id = input.trim();

        if id.is_empty() {
            return EmptySnafu.fail();
        }

        if PLACEHOLDER_IDS.contains(&id) {
            return PlaceholderSnafu { text: id }.fail();
        }

        Ok(VideoId(id.to_string()))
    }
}

impl TryFrom<String> for VideoId {
    type Error = ParseVideoId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VideoId> for String {
    fn from(value: VideoId) -> Self {
        value.0
    }
}

impl std::fmt::Display for VideoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::convert::AsRef<str> for VideoId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ParseVideoId {
    /// video id is empty
    Empty,

    #[snafu(display("`{text}` is a placeholder, not a video id"))]
    Placeholder { text: String },

    #[snafu(display("`{text}` is a valid url, but it's missing the video id"))]
    MissingIdFragment { text: String },

    #[snafu(display("`{text}` is a url, but it doesn't point to youtube"))]
    ExpectYouTubeUrl { text: String },
}

/// Accept either a bare video id or a YouTube watch/short url.
pub fn parse_video_id(text: &str) -> Result<VideoId, ParseVideoId> {
    let Ok(url) = url::Url::parse(text.trim()) else {
        return text.parse();
    };

    match url.host_str() {
        Some("youtu.be") => url
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|segment| !segment.is_empty())
            .context(MissingIdFragmentSnafu { text })?
            .parse(),

        Some("www.youtube.com" | "youtube.com" | "m.youtube.com") => url
            .query_pairs()
            .find_map(|(key, value)| (key == "v").then(|| value.to_string()))
            .context(MissingIdFragmentSnafu { text })?
            .parse(),

        _ => ExpectYouTubeUrlSnafu { text }.fail(),
    }
}
