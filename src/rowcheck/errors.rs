//! Row-check errors

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::db::DbError;
use crate::manifest::ManifestError;
use crate::object_store::ObjectStoreError;
use crate::restore::RestoreError;

/// Result type for row-check operations
pub type RowCheckResult<T> = Result<T, RowCheckError>;

#[derive(Debug, Error)]
pub enum RowCheckError {
    #[error("{0} environment variable not set")]
    EnvMissing(&'static str),

    #[error("restore failed, skip row check")]
    RestoreNotSuccessful,

    #[error("metafile dbname ({0}) not equal to the dbname in the command line arguments")]
    DbNameMismatch(String),

    #[error("backup task status is warning, skip row check")]
    BackupWarning,

    #[error("file operation failed on {0}: {1}")]
    Io(String, std::io::Error),

    #[error(transparent)]
    State(#[from] RestoreError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}
