//! Database-session errors

use thiserror::Error;

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("failed to connect to database ({0}): {1}")]
    Connect(String, #[source] tokio_postgres::Error),

    #[error("database query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("{0} environment variable not set")]
    EnvMissing(&'static str),

    #[error("{0} failed: {1}")]
    Subprocess(String, String),

    #[error("unrecognized server version string: {0}")]
    VersionParse(String),
}
