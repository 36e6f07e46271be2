use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BackendError {
    #[snafu(display("cannot connect to the database `{url}` [{namespace}/{database}]: {source}"))]
    DatabaseConnection {
        url: String,
        namespace: String,
        database: String,
        source: surrealdb::Error,
    },
    #[snafu(display("failed to query the database: {source}"))]
    DatabaseQuery { source: surrealdb::Error },

    /// the in-memory store is not accepting writes
    #[snafu(visibility(pub))]
    MemoryUnavailable,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AggregationError {
    #[snafu(display("could not read watch statistics: {source}"))]
    Read { source: BackendError },

    #[snafu(display("could not write watch statistics: {source}"))]
    Write { source: BackendError },
}
