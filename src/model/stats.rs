use std::collections::BTreeSet;

use super::*;

/// One user's watch document for one video. The aggregator consumes writes of these.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, new)]
#[serde(rename_all = "camelCase")]
pub struct UserWatchRecord {
    pub user_id: String,
    pub video_id: VideoId,
    #[serde(default)]
    pub watch_count: i64,
    #[serde(default)]
    pub liked: bool,
    #[serde(default)]
    #[new(default)]
    pub last_watched_at: Option<i64>,
}

impl UserWatchRecord {
    /// Storage key, unique per `(user, video)` pair.
    ///
    /// Both ids may contain `/`, so the user id is length-prefixed to keep the split unambiguous.
    pub fn key(&self) -> String {
        Self::key_for(&self.user_id, &self.video_id)
    }

    pub fn key_for(user_id: &str, video_id: &VideoId) -> String {
        format!("{}:{}/{}", user_id.len(), user_id, video_id)
    }
}

/// Cross-user aggregate for a single video.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStats {
    pub video_id: VideoId,
    pub total_views: i64,
    pub total_likes: i64,
    pub unique_viewers: i64,
    #[serde(default)]
    pub viewer_ids: BTreeSet<String>,
    pub last_updated: i64,
}

impl VideoStats {
    pub fn empty(video_id: VideoId, last_updated: i64) -> Self {
        Self {
            video_id,
            total_views: 0,
            total_likes: 0,
            unique_viewers: 0,
            viewer_ids: BTreeSet::new(),
            last_updated,
        }
    }

    pub fn add_viewer(&mut self, user_id: &str) {
        self.viewer_ids.insert(user_id.to_string());
        self.unique_viewers = self.viewer_ids.len() as i64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watch(user: &str, video: &str) -> UserWatchRecord {
        UserWatchRecord::new(user.to_string(), video.parse().unwrap(), 1, false)
    }

    #[test]
    fn keys_do_not_collide_across_separators() {
        assert_ne!(watch("a", "b/c").key(), watch("a/b", "c").key());
        assert_eq!(watch("alice", "v1").key(), watch("alice", "v1").key());
        assert_eq!(watch("alice", "v1").key(), "5:alice/v1");
    }
}
