use snafu::ResultExt;
use tokio::net::TcpListener;

use youcra::api::{self, App};
use youcra::error::{ApplicationError, BindAddressSnafu, ConnectDatabaseSnafu, WebServerSnafu, YouTubeUrlSnafu};
use youcra::service::stats::{RecomputeTask, StatsAggregator};
use youcra::{config, logger};

#[tokio::main]
async fn main() -> Result<(), ApplicationError> {
    let config = config::load()?;

    let _guard = logger::init(&config)?;

    let store = config.surreal.connect().await.context(ConnectDatabaseSnafu)?;
    let aggregator = StatsAggregator::new(store);
    let recompute = RecomputeTask::spawn(aggregator.clone(), config.recompute_interval);

    let youtube = config.youtube.client().context(YouTubeUrlSnafu)?;
    if youtube.is_none() {
        tracing::warn!("no youtube api key configured, metadata lookups are disabled");
    }

    let app = App::new(aggregator, youtube, config.youtube.metadata_timeout);

    let address = config.host_address;
    let listener = TcpListener::bind(address)
        .await
        .context(BindAddressSnafu { address })?;

    tracing::info!(%address, "listening");

    axum::serve(listener, api::create_router(app))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context(WebServerSnafu)?;

    recompute.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }

    tracing::info!("shutting down");
}
