use std::collections::VecDeque;

use crate::time::Timestamp;

use super::*;

/// How many completion timestamps are retained per video.
pub const WATCH_HISTORY_LIMIT: usize = 10;

/// Per-video watch bookkeeping kept in local storage.
///
/// Timestamps are milliseconds since the unix epoch. `watch_count` keeps growing after the
/// history is capped, so it can exceed `watch_history.len()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRecord {
    #[serde(default)]
    pub watch_count: u64,
    #[serde(default)]
    pub last_watched_at: Option<i64>,
    #[serde(default)]
    pub watch_history: VecDeque<i64>,
}

impl WatchRecord {
    /// Register a completion at `at` (ms), evicting the oldest history entries past the limit.
    pub fn record_completion(&mut self, at: i64) {
        self.watch_count += 1;
        self.last_watched_at = Some(at);
        self.watch_history.push_back(at);

        while self.watch_history.len() > WATCH_HISTORY_LIMIT {
            self.watch_history.pop_front();
        }
    }

    pub fn last_watched(&self) -> Option<Timestamp> {
        self.last_watched_at
            .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
    }

    /// Number of history entries inside `[start, end)`.
    pub fn watched_between(&self, start: i64, end: i64) -> usize {
        self.watch_history
            .iter()
            .filter(|&&at| at >= start && at < end)
            .count()
    }
}
