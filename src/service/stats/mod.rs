//! Cross-user watch statistics.
//!
//! Every per-user watch write is folded into the video's aggregate as it arrives. The
//! incremental path counts every event as a view, so replays over-count; [StatsAggregator::recompute]
//! rebuilds the aggregates from the per-user records and is the source of truth.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use snafu::ResultExt;
use tokio::sync::Mutex;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::instrument;

use crate::model::{UserWatchRecord, VideoId, VideoStats};
use crate::time::{Clock, SystemClock};

pub use error::*;
pub use recompute::*;
pub use store::*;
pub use surreal::*;

mod error;
mod recompute;
mod store;
mod surreal;

pub const DEFAULT_RANKING_LIMIT: usize = 10;
pub const MAX_RANKING_LIMIT: usize = 100;

#[derive(Clone)]
pub struct StatsAggregator {
    store: StatsStore,
    locks: Arc<DashMap<VideoId, Arc<Mutex<()>>>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for StatsAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsAggregator")
            .field("store", &self.store)
            .field("locked_videos", &self.locks.len())
            .finish()
    }
}

impl StatsAggregator {
    pub fn new(store: StatsStore) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: StatsStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            locks: Arc::default(),
            clock,
        }
    }

    /// Store a user's watch record and fold it into the video's aggregate.
    ///
    /// Views go up by one for every call, the user joins the viewer set and likes follow
    /// the change between the stored record and this one. The aggregate is written before
    /// the per-user record, so a failed call leaves the previous record in place for the
    /// redelivered event.
    #[instrument(skip(self, record), fields(video_id = %record.video_id, user_id = %record.user_id))]
    pub async fn record_watch(&self, record: UserWatchRecord) -> Result<VideoStats, AggregationError> {
        let video_id = record.video_id.clone();
        self.locked(&video_id, self.apply_watch(record)).await
    }

    async fn apply_watch(&self, record: UserWatchRecord) -> Result<VideoStats, AggregationError> {
        let previous = self
            .store
            .watch(&record.user_id, &record.video_id)
            .await
            .context(ReadSnafu)?;

        let now = self.clock.now_millis();
        let mut stats = self
            .store
            .stats(&record.video_id)
            .await
            .context(ReadSnafu)?
            .unwrap_or_else(|| VideoStats::empty(record.video_id.clone(), now));

        stats.total_views += 1;
        stats.add_viewer(&record.user_id);

        let was_liked = previous.as_ref().is_some_and(|previous| previous.liked);
        match (was_liked, record.liked) {
            (false, true) => stats.total_likes += 1,
            (true, false) => stats.total_likes = (stats.total_likes - 1).max(0),
            _ => {}
        }

        stats.last_updated = now;
        retry_write(|| self.store.put_stats(&stats)).await?;
        retry_write(|| self.store.put_watch(&record)).await?;

        tracing::info!(
            total_views = stats.total_views,
            total_likes = stats.total_likes,
            unique_viewers = stats.unique_viewers,
            "recorded watch"
        );

        Ok(stats)
    }

    /// Rebuild every aggregate from the stored per-user records, overwriting what was there.
    ///
    /// Returns the number of videos written.
    #[instrument(skip(self))]
    pub async fn recompute(&self) -> Result<usize, AggregationError> {
        let watches = self.store.watches().await.context(ReadSnafu)?;
        let now = self.clock.now_millis();

        let mut aggregates: BTreeMap<VideoId, VideoStats> = BTreeMap::new();
        for watch in watches {
            let stats = aggregates
                .entry(watch.video_id.clone())
                .or_insert_with(|| VideoStats::empty(watch.video_id.clone(), now));

            stats.total_views += watch.watch_count.max(1);
            if watch.liked {
                stats.total_likes += 1;
            }
            stats.add_viewer(&watch.user_id);
        }

        futures::future::try_join_all(aggregates.values().map(|stats| self.overwrite(stats))).await?;

        tracing::info!(videos = aggregates.len(), "recomputed watch statistics");
        Ok(aggregates.len())
    }

    pub async fn stats(&self, video_id: &VideoId) -> Result<Option<VideoStats>, AggregationError> {
        self.store.stats(video_id).await.context(ReadSnafu)
    }

    /// Most viewed videos first, ties broken by unique viewers.
    pub async fn rankings(&self, limit: usize) -> Result<Vec<VideoStats>, AggregationError> {
        let mut stats = self.store.all_stats().await.context(ReadSnafu)?;

        stats.sort_by(|a, b| {
            b.total_views
                .cmp(&a.total_views)
                .then(b.unique_viewers.cmp(&a.unique_viewers))
                .then_with(|| a.video_id.cmp(&b.video_id))
        });
        stats.truncate(limit);

        Ok(stats)
    }

    async fn overwrite(&self, stats: &VideoStats) -> Result<(), AggregationError> {
        self.locked(&stats.video_id, retry_write(|| self.store.put_stats(stats))).await
    }

    /// Run `action` while holding the lock of `video_id`. The lock entry is dropped again
    /// once nobody else holds or waits for it.
    async fn locked<T>(&self, video_id: &VideoId, action: impl Future<Output = T>) -> T {
        let lock = self.locks.entry(video_id.clone()).or_default().clone();

        let output = {
            let _guard = lock.lock().await;
            action.await
        };

        drop(lock);
        self.locks.remove_if(video_id, |_, lock| Arc::strong_count(lock) == 1);

        output
    }
}

async fn retry_write<T, F, Fut>(action: F) -> Result<T, AggregationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let strategy = ExponentialBackoff::from_millis(10).map(jitter).take(3);

    Retry::spawn(strategy, action).await.map_err(|source| {
        tracing::error!(error = %source, "giving up on statistics write");
        AggregationError::Write { source }
    })
}
