use std::time::Duration;

use derive_new::new;

use crate::service::stats::StatsAggregator;
use crate::service::youtube::YouTube;

#[derive(Debug, Clone, new)]
pub struct App {
    pub aggregator: StatsAggregator,
    pub youtube: Option<YouTube>,
    pub metadata_timeout: Duration,
}
