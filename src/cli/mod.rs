//! Command-line interface
//!
//! Single binary with mutually exclusive modes:
//! - `gpdbbr --type backup …`
//! - `gpdbbr --type restore …`
//! - `gpdbbr --type check …`
//!
//! Arguments are validated here; the S3 bucket is probed before any mode
//! runs so a misconfigured store fails fast.

mod args;
mod errors;

pub use args::{Cli, Mode};
pub use errors::{CliError, CliResult};

use tracing::info;

use crate::backup::BackupOrchestrator;
use crate::object_store::ObjectStore;
use crate::restore::RestoreOrchestrator;
use crate::rowcheck::RowChecker;

/// Validated run configuration shared by all three modes.
#[derive(Debug, Clone)]
pub struct Config {
    pub dbname: String,
    pub jobs: usize,
    pub s3: S3Params,
}

/// Object-store connection parameters taken from the command line.
#[derive(Debug, Clone)]
pub struct S3Params {
    pub endpoint: String,
    pub id: String,
    pub key: String,
    pub bucket: String,
    pub folder: String,
}

/// Run the mode selected on the command line.
///
/// This is the only function `main` calls after parsing.
pub async fn run_command(cli: Cli) -> CliResult<()> {
    info!("gpdbbr version = {}", env!("CARGO_PKG_VERSION"));
    info!("job type = {}", cli.mode);

    let mode = cli.mode;
    let config = cli.into_config();

    let store = ObjectStore::connect(&config.s3);
    if !store.bucket_exists().await? {
        return Err(CliError::BucketMissing(config.s3.bucket.clone()));
    }

    match mode {
        Mode::Backup => BackupOrchestrator::new(&config, &store).run().await?,
        Mode::Restore => RestoreOrchestrator::new(&config, &store).run().await?,
        Mode::Check => RowChecker::new(&config, &store).run().await?,
    }

    Ok(())
}
