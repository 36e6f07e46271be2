use std::result::Result;

use snafu::ResultExt;
use tracing::Metadata;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{filter_fn, EnvFilter};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry;

use crate::config::Config;
use crate::error::{ApplicationError, InitializeLoggerSnafu, LogFilterSnafu};

/// Which events reach the log outputs.
///
/// `directives` uses the `EnvFilter` syntax. Targets in `muted_targets` are dropped along
/// with all of their submodules, whatever level the directives allow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPolicy {
    pub directives: String,
    pub muted_targets: Vec<String>,
}

impl LogPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            directives: config.log_filter.clone(),
            muted_targets: config.log_muted_targets.clone(),
        }
    }

    pub fn env_filter(&self) -> Result<EnvFilter, ApplicationError> {
        EnvFilter::try_new(&self.directives).context(LogFilterSnafu)
    }

    pub fn is_muted(&self, target: &str) -> bool {
        self.muted_targets.iter().any(|muted| {
            target
                .strip_prefix(muted.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
        })
    }

    fn allows(&self, metadata: &Metadata<'_>) -> bool {
        !self.is_muted(metadata.target())
    }
}

pub fn init(config: &Config) -> Result<WorkerGuard, ApplicationError> {
    let policy = LogPolicy::from_config(config);
    let env_filter = policy.env_filter()?;

    let (file_layer, guard) = {
        let file_appender = tracing_appender::rolling::daily(&config.log_dir, "youcra.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let layer = layer().with_ansi(false).json().with_writer(non_blocking);

        (layer, guard)
    };

    let console_layer = layer().pretty().with_writer(std::io::stdout);

    let subscriber = registry()
        .with(env_filter)
        .with(filter_fn(move |metadata| policy.allows(metadata)))
        .with(console_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber).context(InitializeLoggerSnafu)?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(muted: &[&str]) -> LogPolicy {
        LogPolicy {
            directives: "debug".to_string(),
            muted_targets: muted.iter().map(|target| target.to_string()).collect(),
        }
    }

    #[test]
    fn mutes_targets_and_their_submodules() {
        let policy = policy(&["hyper", "surrealdb::core"]);

        assert!(policy.is_muted("hyper"));
        assert!(policy.is_muted("hyper::proto::h1"));
        assert!(policy.is_muted("surrealdb::core::kvs"));

        assert!(!policy.is_muted("hyper_util"));
        assert!(!policy.is_muted("surrealdb::api"));
        assert!(!policy.is_muted("youcra::service::stats"));
    }

    #[test]
    fn nothing_is_muted_by_default() {
        assert!(!policy(&[]).is_muted("youcra"));
    }

    #[test]
    fn invalid_directives_are_reported() {
        let mut policy = policy(&[]);
        assert!(policy.env_filter().is_ok());

        policy.directives = "youcra=notalevel".to_string();
        assert!(policy.env_filter().is_err());
    }
}
