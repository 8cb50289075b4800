//! Restore errors
//!
//! Setup and selection errors are fatal. Per-table copy failures and
//! per-DDL replay failures are captured in the restore report instead.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::db::DbError;
use crate::fanout::FanoutError;
use crate::manifest::ManifestError;
use crate::object_store::ObjectStoreError;

/// Result type for restore operations
pub type RestoreResult<T> = Result<T, RestoreError>;

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("{0} environment variable not set")]
    EnvMissing(&'static str),

    #[error("the s3 contains unknown files: {0}")]
    UnknownObject(String),

    #[error("metafile dbname ({0}) not equal to the dbname in the command line arguments")]
    DbNameMismatch(String),

    #[error("restore backup task status is warning")]
    BackupWarning,

    #[error("row-check report exists, please check the log file")]
    RowCheckPending,

    #[error("previous restore failed, please check the log file")]
    PriorRestoreFailed,

    #[error("no timestamp directory found under restore state date {0}")]
    NoTimestampDir(String),

    #[error("required users are missing from the target database")]
    MissingUsers,

    #[error("full restore must be into an empty database")]
    NotEmptyDatabase,

    #[error("sql execution failed: {0}")]
    Sql(#[from] tokio_postgres::Error),

    #[error("file operation failed on {0}: {1}")]
    Io(String, std::io::Error),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Fanout(#[from] FanoutError),

    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("internal error: {0}")]
    Internal(String),
}
