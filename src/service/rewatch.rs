use std::sync::Arc;

use serde::Serialize;

use crate::model::{VideoId, WatchRecord};
use crate::service::watch_count::WatchCountStore;
use crate::storage::LocalStorage;
use crate::time::Clock;

/// A certified video can be certified again one hour after its last completion.
pub const REWATCH_COOLDOWN_MS: i64 = 3_600_000;

const MINUTE_MS: i64 = 60_000;

/// The boundary is inclusive: exactly one hour later the video is available again.
pub fn can_rewatch(record: &WatchRecord, now: i64) -> bool {
    remaining_cooldown(record, now) == 0
}

/// Whole minutes left on the cooldown, rounded up. `0` once rewatching is allowed.
pub fn minutes_until_rewatch(record: &WatchRecord, now: i64) -> u64 {
    let remaining = remaining_cooldown(record, now);
    remaining.div_ceil(MINUTE_MS as u64)
}

/// Milliseconds left on the cooldown. Stored timestamps are untrusted, so a completion in
/// the future never blocks for longer than one full cooldown.
fn remaining_cooldown(record: &WatchRecord, now: i64) -> u64 {
    let Some(last) = record.last_watched_at else {
        return 0;
    };

    let elapsed = now.saturating_sub(last);
    REWATCH_COOLDOWN_MS
        .saturating_sub(elapsed)
        .clamp(0, REWATCH_COOLDOWN_MS) as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Rewatch {
    Allowed,
    CoolingDown { minutes: u64 },
}

impl Rewatch {
    pub fn evaluate(record: &WatchRecord, now: i64) -> Self {
        if can_rewatch(record, now) {
            Rewatch::Allowed
        } else {
            Rewatch::CoolingDown {
                minutes: minutes_until_rewatch(record, now),
            }
        }
    }

    pub fn is_allowed(self) -> bool {
        matches!(self, Rewatch::Allowed)
    }
}

/// Cooldown decisions for stored watch records.
#[derive(Clone)]
pub struct RewatchPolicy<S> {
    store: WatchCountStore<S>,
    clock: Arc<dyn Clock>,
}

impl<S: LocalStorage> RewatchPolicy<S> {
    pub fn new(store: WatchCountStore<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn check(&self, video_id: &str) -> Rewatch {
        if video_id.parse::<VideoId>().is_err() {
            return Rewatch::Allowed;
        }

        let record = self.store.get_watch_count(video_id);
        Rewatch::evaluate(&record, self.clock.now_millis())
    }
}
