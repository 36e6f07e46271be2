use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone as _, Timelike as _};
use tracing::instrument;

use crate::model::{VideoId, WatchRecord};
use crate::storage::{self, LocalStorage};
use crate::time::{Clock, SystemClock};

pub const WATCH_COUNTS_KEY: &str = "youcra.watch_counts";

/// Every watch record, keyed by the raw video id.
pub type WatchCounts = HashMap<String, WatchRecord>;

/// Durable per-video watch counters.
///
/// Every mutation rewrites the whole map. Clones share the same critical section so that
/// concurrent increments never lose an update.
#[derive(Clone)]
pub struct WatchCountStore<S> {
    storage: S,
    clock: Arc<dyn Clock>,
    lock: Arc<Mutex<()>>,
}

impl<S: LocalStorage> WatchCountStore<S> {
    pub fn new(storage: S) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock))
    }

    pub fn with_clock(storage: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn load(&self) -> WatchCounts {
        storage::load_or_default(&self.storage, WATCH_COUNTS_KEY)
    }

    #[instrument(skip(self))]
    pub fn increment_watch_count(&self, video_id: &str) -> WatchRecord {
        let Ok(video_id) = video_id.parse::<VideoId>() else {
            tracing::debug!("ignoring watch count increment for an invalid video id");
            return WatchRecord::default();
        };

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut counts = self.load();
        let record = counts.entry(video_id.to_string()).or_default();
        record.record_completion(self.clock.now_millis());
        let record = record.clone();

        if let Err(error) = storage::save(&self.storage, WATCH_COUNTS_KEY, &counts) {
            tracing::error!(%video_id, %error, "could not persist watch counts");
        }

        tracing::debug!(%video_id, watch_count = record.watch_count, "recorded watch completion");
        record
    }

    pub fn get_watch_count(&self, video_id: &str) -> WatchRecord {
        if video_id.parse::<VideoId>().is_err() {
            return WatchRecord::default();
        }

        self.load().remove(video_id.trim()).unwrap_or_default()
    }

    /// Completions recorded since local midnight, across every video.
    pub fn get_today_watch_count(&self) -> usize {
        let now = self.clock.now().with_timezone(&Local);
        let today = now.date_naive();

        let start = local_midnight(today).unwrap_or_else(|| {
            now - chrono::Duration::seconds(now.num_seconds_from_midnight() as i64)
        });
        let end = today
            .succ_opt()
            .and_then(local_midnight)
            .unwrap_or_else(|| start + chrono::Duration::days(1));

        let (start, end) = (start.timestamp_millis(), end.timestamp_millis());

        self.load()
            .values()
            .map(|record| record.watched_between(start, end))
            .sum()
    }

    #[instrument(skip(self))]
    pub fn reset(&self) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Err(error) = storage::save(&self.storage, WATCH_COUNTS_KEY, &WatchCounts::new()) {
            tracing::error!(%error, "could not reset watch counts");
        }
    }
}

fn local_midnight(date: NaiveDate) -> Option<DateTime<Local>> {
    Local
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::storage::MemoryStorage;
    use crate::time::ManualClock;

    fn store() -> (WatchCountStore<MemoryStorage>, MemoryStorage, ManualClock) {
        let storage = MemoryStorage::new();
        let clock = ManualClock::new(crate::time::now());
        let store = WatchCountStore::with_clock(storage.clone(), Arc::new(clock.clone()));
        (store, storage, clock)
    }

    #[test]
    fn increment_caps_history_at_ten() {
        let (store, _, _) = store();

        for _ in 0..15 {
            store.increment_watch_count("video");
        }

        let record = store.get_watch_count("video");
        assert_eq!(record.watch_count, 15);
        assert_eq!(record.watch_history.len(), 10);
    }

    #[test]
    fn increment_sets_last_watched_to_now() {
        let (store, _, clock) = store();
        clock.advance(chrono::Duration::minutes(5));

        let record = store.increment_watch_count("video");
        assert_eq!(record.last_watched_at, Some(clock.now_millis()));
        assert_eq!(record.watch_history.back().copied(), Some(clock.now_millis()));
    }

    #[test]
    fn increments_survive_a_new_store_instance() {
        let (store, storage, _) = store();
        store.increment_watch_count("video");
        store.increment_watch_count("video");

        let reopened = WatchCountStore::new(storage);
        assert_eq!(reopened.get_watch_count("video").watch_count, 2);
    }

    #[test]
    fn missing_record_is_zero_valued() {
        let (store, _, _) = store();

        let record = store.get_watch_count("never-watched");
        assert_eq!(record, WatchRecord::default());
        assert_eq!(record.last_watched_at, None);
    }

    #[test]
    fn corrupt_store_loads_empty() {
        let (store, storage, _) = store();
        storage.set(WATCH_COUNTS_KEY, "{not json").unwrap();

        assert!(store.load().is_empty());
        assert_eq!(store.get_watch_count("video").watch_count, 0);

        // the next increment replaces the corrupt document
        assert_eq!(store.increment_watch_count("video").watch_count, 1);
        assert_eq!(store.load().len(), 1);
    }

    #[test]
    fn invalid_ids_are_no_ops() {
        let (store, storage, _) = store();

        for id in ["", "  ", "undefined", "null"] {
            assert_eq!(store.increment_watch_count(id), WatchRecord::default());
            assert_eq!(store.get_watch_count(id), WatchRecord::default());
        }

        assert_eq!(storage.get(WATCH_COUNTS_KEY).unwrap(), None);
    }

    #[test]
    fn today_count_ignores_yesterday() {
        let storage = MemoryStorage::new();
        let noon = Local::now()
            .date_naive()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_local_timezone(Local)
            .unwrap()
            .with_timezone(&chrono::Utc);
        let clock = ManualClock::new(noon);
        let store = WatchCountStore::with_clock(storage.clone(), Arc::new(clock));

        let at = |hours: i64| (noon - chrono::Duration::hours(hours)).timestamp_millis();
        let counts = WatchCounts::from([
            (
                "first".to_string(),
                WatchRecord {
                    watch_count: 2,
                    last_watched_at: Some(at(1)),
                    watch_history: [at(20), at(1)].into(),
                },
            ),
            (
                "second".to_string(),
                WatchRecord {
                    watch_count: 1,
                    last_watched_at: Some(at(13)),
                    watch_history: [at(13)].into(),
                },
            ),
        ]);
        storage::save(&storage, WATCH_COUNTS_KEY, &counts).unwrap();

        assert_eq!(store.get_today_watch_count(), 1);
    }

    #[test]
    fn reset_clears_everything() {
        let (store, _, _) = store();
        store.increment_watch_count("a");
        store.increment_watch_count("b");

        store.reset();
        assert!(store.load().is_empty());
        assert_eq!(store.get_today_watch_count(), 0);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let (store, _, _) = store();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        store.increment_watch_count("shared");
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get_watch_count("shared").watch_count, 200);
    }
}
