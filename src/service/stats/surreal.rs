use snafu::ResultExt;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::instrument;

use super::store::Result;
use super::{DatabaseConnectionSnafu, DatabaseQuerySnafu};
use crate::model::{UserWatchRecord, VideoId, VideoStats};

const STATS_TABLE: &str = "video_stats";
const WATCHES_TABLE: &str = "user_watches";

/// SurrealDB-backed statistics, reachable through any engine `surrealdb::engine::any` accepts.
#[derive(Debug, Clone)]
pub struct SurrealStats {
    database: Surreal<Any>,
}

impl SurrealStats {
    pub async fn connect(url: &str, namespace: &str, database: &str) -> Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .context(DatabaseConnectionSnafu {
                url,
                namespace,
                database,
            })?;

        db.use_ns(namespace)
            .use_db(database)
            .await
            .context(DatabaseConnectionSnafu {
                url,
                namespace,
                database,
            })?;

        Ok(Self { database: db })
    }

    pub(super) async fn stats(&self, video_id: &VideoId) -> Result<Option<VideoStats>> {
        self.database
            .select((STATS_TABLE, video_id.as_str()))
            .await
            .context(DatabaseQuerySnafu)
    }

    pub(super) async fn all_stats(&self) -> Result<Vec<VideoStats>> {
        self.database
            .select(STATS_TABLE)
            .await
            .context(DatabaseQuerySnafu)
    }

    #[instrument(skip(self, stats), fields(video_id = %stats.video_id))]
    pub(super) async fn put_stats(&self, stats: &VideoStats) -> Result<()> {
        let _: Option<VideoStats> = self
            .database
            .update((STATS_TABLE, stats.video_id.as_str()))
            .content(stats)
            .await
            .context(DatabaseQuerySnafu)?;

        Ok(())
    }

    pub(super) async fn watch(&self, user_id: &str, video_id: &VideoId) -> Result<Option<UserWatchRecord>> {
        self.database
            .select((WATCHES_TABLE, UserWatchRecord::key_for(user_id, video_id)))
            .await
            .context(DatabaseQuerySnafu)
    }

    pub(super) async fn put_watch(&self, record: &UserWatchRecord) -> Result<()> {
        let _: Option<UserWatchRecord> = self
            .database
            .update((WATCHES_TABLE, record.key()))
            .content(record)
            .await
            .context(DatabaseQuerySnafu)?;

        Ok(())
    }

    pub(super) async fn watches(&self) -> Result<Vec<UserWatchRecord>> {
        self.database
            .select(WATCHES_TABLE)
            .await
            .context(DatabaseQuerySnafu)
    }
}
