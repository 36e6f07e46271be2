use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::instrument;

use crate::model::VideoId;
use crate::storage::{self, LocalStorage};

pub const CERTIFIED_VIDEOS_KEY: &str = "youcra.certified_videos";

/// The persisted `video id -> certified` map. Kept apart from the watch counts.
#[derive(Clone)]
pub struct CertifiedStore<S> {
    storage: S,
    lock: Arc<Mutex<()>>,
}

impl<S: LocalStorage> CertifiedStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn load(&self) -> HashMap<String, bool> {
        storage::load_or_default(&self.storage, CERTIFIED_VIDEOS_KEY)
    }

    pub fn is_certified(&self, video_id: &str) -> bool {
        if video_id.parse::<VideoId>().is_err() {
            return false;
        }

        self.load()
            .get(video_id.trim())
            .copied()
            .unwrap_or_default()
    }

    #[instrument(skip(self))]
    pub fn set_certified(&self, video_id: &str, certified: bool) {
        let Ok(video_id) = video_id.parse::<VideoId>() else {
            tracing::debug!("ignoring certified flag for an invalid video id");
            return;
        };

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut videos = self.load();
        videos.insert(video_id.to_string(), certified);

        if let Err(error) = storage::save(&self.storage, CERTIFIED_VIDEOS_KEY, &videos) {
            tracing::error!(%video_id, %error, "could not persist certified videos");
        }
    }

    pub fn reset(&self) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Err(error) = self.storage.remove(CERTIFIED_VIDEOS_KEY) {
            tracing::error!(%error, "could not reset certified videos");
        }
    }
}
