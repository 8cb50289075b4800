//! CLI-level errors
//!
//! Every fatal subsystem error funnels through here so `main` has a single
//! error type to log and exit on.

use thiserror::Error;

use crate::backup::BackupError;
use crate::object_store::ObjectStoreError;
use crate::restore::RestoreError;
use crate::rowcheck::RowCheckError;

/// Result type for CLI dispatch
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("the s3 bucket ({0}) does not exist")]
    BucketMissing(String),

    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Restore(#[from] RestoreError),

    #[error(transparent)]
    RowCheck(#[from] RowCheckError),
}
