use std::sync::Arc;

use dashmap::DashMap;

use super::surreal::SurrealStats;
use super::BackendError;
use crate::model::{UserWatchRecord, VideoId, VideoStats};

pub(crate) type Result<T, E = BackendError> = std::result::Result<T, E>;

/// Where per-user watch records and per-video aggregates live.
#[derive(Debug, Clone)]
pub enum StatsStore {
    Memory(MemoryStats),
    Surreal(SurrealStats),
}

impl StatsStore {
    pub fn memory() -> Self {
        StatsStore::Memory(MemoryStats::default())
    }

    pub async fn stats(&self, video_id: &VideoId) -> Result<Option<VideoStats>> {
        match self {
            StatsStore::Memory(store) => Ok(store.stats(video_id)),
            StatsStore::Surreal(store) => store.stats(video_id).await,
        }
    }

    pub async fn all_stats(&self) -> Result<Vec<VideoStats>> {
        match self {
            StatsStore::Memory(store) => Ok(store.all_stats()),
            StatsStore::Surreal(store) => store.all_stats().await,
        }
    }

    pub async fn put_stats(&self, stats: &VideoStats) -> Result<()> {
        match self {
            StatsStore::Memory(store) => store.put_stats(stats),
            StatsStore::Surreal(store) => store.put_stats(stats).await,
        }
    }

    /// The stored watch record of `user_id` for `video_id`.
    pub async fn watch(&self, user_id: &str, video_id: &VideoId) -> Result<Option<UserWatchRecord>> {
        match self {
            StatsStore::Memory(store) => Ok(store.watch(user_id, video_id)),
            StatsStore::Surreal(store) => store.watch(user_id, video_id).await,
        }
    }

    pub async fn put_watch(&self, record: &UserWatchRecord) -> Result<()> {
        match self {
            StatsStore::Memory(store) => {
                store.put_watch(record);
                Ok(())
            }
            StatsStore::Surreal(store) => store.put_watch(record).await,
        }
    }

    pub async fn watches(&self) -> Result<Vec<UserWatchRecord>> {
        match self {
            StatsStore::Memory(store) => Ok(store.watches()),
            StatsStore::Surreal(store) => store.watches().await,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStats {
    stats: Arc<DashMap<VideoId, VideoStats>>,
    watches: Arc<DashMap<(String, VideoId), UserWatchRecord>>,
    #[cfg(test)]
    pub(super) stats_offline: Arc<std::sync::atomic::AtomicBool>,
}

impl MemoryStats {
    fn stats(&self, video_id: &VideoId) -> Option<VideoStats> {
        self.stats.get(video_id).map(|entry| entry.value().clone())
    }

    fn all_stats(&self) -> Vec<VideoStats> {
        self.stats.iter().map(|entry| entry.value().clone()).collect()
    }

    fn put_stats(&self, stats: &VideoStats) -> Result<()> {
        #[cfg(test)]
        if self.stats_offline.load(std::sync::atomic::Ordering::SeqCst) {
            return super::MemoryUnavailableSnafu.fail();
        }

        self.stats.insert(stats.video_id.clone(), stats.clone());
        Ok(())
    }

    fn watch(&self, user_id: &str, video_id: &VideoId) -> Option<UserWatchRecord> {
        self.watches
            .get(&(user_id.to_string(), video_id.clone()))
            .map(|entry| entry.value().clone())
    }

    fn put_watch(&self, record: &UserWatchRecord) {
        let key = (record.user_id.clone(), record.video_id.clone());
        self.watches.insert(key, record.clone());
    }

    fn watches(&self) -> Vec<UserWatchRecord> {
        self.watches.iter().map(|entry| entry.value().clone()).collect()
    }
}
