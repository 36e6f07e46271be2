use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use snafu::ResultExt;
use url::Url;

use crate::error::{ApplicationError, ConfigLoadSnafu};
use crate::service::stats::{BackendError, StatsStore, SurrealStats};
use crate::service::youtube::{YouTube, YOUTUBE_API_URL};

pub const ENV_PREFIX: &str = "YOUCRA_";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_host_address")]
    pub host_address: SocketAddr,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default, deserialize_with = "comma_separated")]
    pub log_muted_targets: Vec<String>,
    #[serde(default = "default_recompute_interval", deserialize_with = "human_duration")]
    pub recompute_interval: Duration,
    #[serde(flatten)]
    pub surreal: SurrealConfig,
    #[serde(flatten)]
    pub youtube: YouTubeConfig,
}

/// Read `YOUCRA_*` variables, after loading `.env` if there is one.
pub fn load() -> Result<Config, ApplicationError> {
    dotenvy::dotenv().ok();

    envy::prefixed(ENV_PREFIX)
        .from_env::<Config>()
        .context(ConfigLoadSnafu)
}

#[derive(Debug, Deserialize, Clone)]
pub struct SurrealConfig {
    /// no url means statistics are only kept in memory
    #[serde(rename = "surreal_url", default)]
    pub url: Option<String>,
    #[serde(rename = "surreal_namespace", default = "default_namespace")]
    pub namespace: String,
    #[serde(rename = "surreal_database", default = "default_database")]
    pub database: String,
}

impl SurrealConfig {
    pub async fn connect(&self) -> Result<StatsStore, BackendError> {
        let Some(url) = &self.url else {
            tracing::warn!("no surreal url configured, statistics are kept in memory");
            return Ok(StatsStore::memory());
        };

        let store = SurrealStats::connect(url, &self.namespace, &self.database).await?;
        tracing::info!(%url, namespace = %self.namespace, database = %self.database, "connected to surreal");

        Ok(StatsStore::Surreal(store))
    }
}

#[derive(Deserialize, Clone)]
pub struct YouTubeConfig {
    #[serde(rename = "youtube_api_key", default)]
    pub api_key: Option<String>,
    #[serde(rename = "youtube_api_url", default = "default_youtube_api_url")]
    pub api_url: String,
    #[serde(default = "default_metadata_timeout", deserialize_with = "human_duration")]
    pub metadata_timeout: Duration,
}

impl std::fmt::Debug for YouTubeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YouTubeConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .field("metadata_timeout", &self.metadata_timeout)
            .finish()
    }
}

impl YouTubeConfig {
    pub fn client(&self) -> Result<Option<YouTube>, url::ParseError> {
        let Some(api_key) = &self.api_key else {
            return Ok(None);
        };

        let base_url = Url::parse(&self.api_url)?;
        YouTube::new(api_key.clone(), &base_url).map(Some)
    }
}

fn default_host_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_recompute_interval() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_namespace() -> String {
    "youcra".to_string()
}

fn default_database() -> String {
    "stats".to_string()
}

fn default_youtube_api_url() -> String {
    YOUTUBE_API_URL.to_string()
}

fn default_metadata_timeout() -> Duration {
    Duration::from_secs(5)
}

fn human_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let text = String::deserialize(deserializer)?;
    humantime::parse_duration(&text).map_err(serde::de::Error::custom)
}

fn comma_separated<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let text = String::deserialize(deserializer)?;

    Ok(text
        .split(',')
        .map(str::trim)
        .filter(|target| !target.is_empty())
        .map(str::to_string)
        .collect())
}
