//! Backup errors
//!
//! Fatal setup errors abort the run; errors raised inside the worker loop
//! are captured per table and recorded in the manifest's `failtables`
//! instead of propagating.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::db::DbError;
use crate::fanout::FanoutError;
use crate::manifest::ManifestError;
use crate::object_store::ObjectStoreError;

/// Result type for backup operations
pub type BackupResult<T> = Result<T, BackupError>;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("{0} environment variable not set")]
    EnvMissing(&'static str),

    #[error("the s3 contains unknown files: {0}")]
    UnknownObject(String),

    #[error("metafile dbname ({0}) not equal to the dbname in the command line arguments")]
    DbNameMismatch(String),

    #[error("previous backup job status is warning")]
    PriorWarning,

    #[error("unparseable mtime from {0}: {1:?}")]
    MtimeParse(String, String),

    #[error("pg_dump failed: {0}")]
    Dump(String),

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
