use std::time::Duration;

use tokio::select;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::StatsAggregator;

#[derive(Debug, Clone, Copy)]
struct Quit;

/// Background task that periodically rebuilds every aggregate from the per-user records.
#[derive(Debug)]
pub struct RecomputeTask {
    tx: oneshot::Sender<Quit>,
    handle: JoinHandle<()>,
}

impl RecomputeTask {
    /// The first pass runs one `period` after spawning.
    pub fn spawn(aggregator: StatsAggregator, period: Duration) -> Self {
        let (tx, mut signal) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                select! {
                    _ = &mut signal => {
                        tracing::info!("stopped recompute task");
                        break;
                    }

                    _ = timer.tick() => {
                        if let Err(error) = aggregator.recompute().await {
                            tracing::error!(%error, "could not recompute watch statistics");
                        }
                    }
                }
            }
        });

        Self { tx, handle }
    }

    pub async fn shutdown(self) {
        let _ = self.tx.send(Quit);
        let _ = self.handle.await;
    }
}
