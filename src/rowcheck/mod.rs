//! Post-restore row-count verification
//!
//! Runs against the most recently restored backup: waits for statistics
//! collection to settle, reads live-tuple estimates and diffs them against
//! the manifest's row map. A clean check writes nothing; findings are
//! written as `rowcheck_<T>_report` next to the restore report.

mod diff;
mod errors;

pub use diff::{diff_table_rows, RowDiff};
pub use errors::{RowCheckError, RowCheckResult};

use std::time::Duration;

use tracing::{info, warn};

use crate::catalog;
use crate::cli::Config;
use crate::db;
use crate::manifest::layout;
use crate::manifest::{BackupManifest, JobStatus, RestoreReport, RestoreStatus, RowCheckReport};
use crate::object_store::ObjectStore;
use crate::restore::{latest_local_run, RestoreError};

/// Settle probe: analyze must be quiet on two reads this far apart.
const SETTLE_PROBE: Duration = Duration::from_secs(3);
/// Poll interval while analyze cycles are still running.
const POLL_INTERVAL: Duration = Duration::from_secs(10);

pub struct RowChecker<'a> {
    config: &'a Config,
    store: &'a ObjectStore,
}

impl<'a> RowChecker<'a> {
    pub fn new(config: &'a Config, store: &'a ObjectStore) -> Self {
        Self { config, store }
    }

    pub async fn run(&self) -> RowCheckResult<()> {
        info!("getting restore information");

        let cn_dir = std::env::var("COORDINATOR_DATA_DIRECTORY")
            .map_err(|_| RowCheckError::EnvMissing("COORDINATOR_DATA_DIRECTORY"))?;
        let state_dir = layout::restore_state_dir(&cn_dir, &self.config.dbname);

        let (date, time) = match latest_local_run(&state_dir) {
            Ok(Some(run)) => run,
            Ok(None) | Err(RestoreError::NoTimestampDir(_)) => {
                info!("restore info directory not found, skip row check");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let run_dir = state_dir.join(&date).join(&time);
        let report_path = run_dir.join(layout::restore_report_name(&time));
        info!("report file = {}", report_path.display());
        info!("check key = {}", time);

        let data = std::fs::read(&report_path)
            .map_err(|e| RowCheckError::Io(report_path.display().to_string(), e))?;
        let restore_report = RestoreReport::from_yaml(&data)?;
        if restore_report.status != RestoreStatus::Success {
            return Err(RowCheckError::RestoreNotSuccessful);
        }

        let key = layout::jobinfo_key(&self.config.s3.folder, &date, &time);
        info!("metafile = {}", key);
        let manifest = BackupManifest::from_yaml(&self.store.get_bytes(&key).await?)?;

        if manifest.jobinfo.dbname != self.config.dbname {
            return Err(RowCheckError::DbNameMismatch(manifest.jobinfo.dbname));
        }
        if manifest.jobinfo.status == JobStatus::Warning {
            return Err(RowCheckError::BackupWarning);
        }

        let client = db::connect(&self.config.dbname).await?;

        self.wait_for_analyze(&client).await?;

        let db_rows = catalog::live_tuple_counts(&client).await?;
        let diff = diff_table_rows(&manifest.tablerows, &db_rows);

        for table in &diff.only_backup {
            warn!("table row count check failed, only in backup: {}", table);
        }
        for table in &diff.only_db {
            warn!("table row count check failed, only in database: {}", table);
        }
        for row in &diff.diff_rows {
            warn!(
                "table row count check failed, diff in backup and database: {}, bk: {:.0}, db: {:.0}",
                row.tabname, row.bkrow, row.dbrow
            );
        }

        if diff.is_clean() {
            info!("row check success");
            return Ok(());
        }

        let report = RowCheckReport {
            onlybk: diff.only_backup,
            onlydb: diff.only_db,
            diffrow: diff.diff_rows,
        };
        let report_path = run_dir.join(layout::rowcheck_report_name(&time));
        report.write_file(&report_path)?;
        info!("row check report: {}", report_path.display());
        info!("row check complete, but some table has problem");
        Ok(())
    }

    /// Wait until no analyze cycle is in flight for two consecutive reads,
    /// so the estimates are not sampled mid-refresh.
    async fn wait_for_analyze(&self, client: &tokio_postgres::Client) -> RowCheckResult<()> {
        loop {
            if catalog::analyze_in_progress(client).await? == 0 {
                tokio::time::sleep(SETTLE_PROBE).await;
                if catalog::analyze_in_progress(client).await? == 0 {
                    return Ok(());
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
