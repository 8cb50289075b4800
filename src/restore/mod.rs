//! Restore orchestration
//!
//! Each run replays exactly one backup: the smallest `(D, T)` strictly
//! greater than the last restored one. A full restore targets an empty
//! database and applies the complete schema dump; an incremental restore
//! drops every changed table with cascade, recreates it from the
//! incremental schema dump, streams data back in per segment and replays
//! the captured DDL deltas.
//!
//! A prior failed restore or a row-check report alongside it blocks further
//! replay until an operator intervenes.

mod errors;
mod picker;

pub use errors::{RestoreError, RestoreResult};
pub use picker::{latest_local_run, min_greater_than};

use std::sync::{Arc, Mutex};

use chrono::Local;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::catalog;
use crate::cli::Config;
use crate::db;
use crate::fanout::PluginConfig;
use crate::manifest::layout;
use crate::manifest::{BackupManifest, DataEntry, JobStatus, RestoreReport, RestoreStatus};
use crate::mover;
use crate::object_store::ObjectStore;

const WORK_QUEUE_CAPACITY: usize = 1_000_000;

fn end_time_stamp() -> String {
    Local::now().format("%Y%m%d%H%M%S%3f").to_string()
}

enum RestoreType {
    Full,
    Incremental {
        prior_date: String,
        prior_time: String,
    },
}

pub struct RestoreOrchestrator<'a> {
    config: &'a Config,
    store: &'a ObjectStore,
}

impl<'a> RestoreOrchestrator<'a> {
    pub fn new(config: &'a Config, store: &'a ObjectStore) -> Self {
        Self { config, store }
    }

    /// Select and replay the next unreplayed backup, if any.
    pub async fn run(&self) -> RestoreResult<()> {
        info!("checking restore type");
        let cn_dir = std::env::var("COORDINATOR_DATA_DIRECTORY")
            .map_err(|_| RestoreError::EnvMissing("COORDINATOR_DATA_DIRECTORY"))?;

        let restore_type = self.determine_restore_type(&cn_dir)?;
        match restore_type {
            RestoreType::Full => info!("restore type = full restore"),
            RestoreType::Incremental { .. } => info!("restore type = incremental restore"),
        }

        let Some((date, time)) = self.select_target(&restore_type).await? else {
            info!("no backup found");
            info!("restore completed successfully");
            return Ok(());
        };

        let key = layout::jobinfo_key(&self.config.s3.folder, &date, &time);
        info!("metafile = {}", key);
        let manifest = BackupManifest::from_yaml(&self.store.get_bytes(&key).await?)?;

        if manifest.jobinfo.dbname != self.config.dbname {
            return Err(RestoreError::DbNameMismatch(manifest.jobinfo.dbname));
        }
        if manifest.jobinfo.status == JobStatus::Warning {
            return Err(RestoreError::BackupWarning);
        }
        info!("restore key = {}", time);

        let report = self
            .replay(&restore_type, &manifest, &date, &time)
            .await?;

        let run_dir = layout::restore_run_dir(&cn_dir, &self.config.dbname, &date, &time);
        std::fs::create_dir_all(&run_dir)
            .map_err(|e| RestoreError::Io(run_dir.display().to_string(), e))?;
        let report_path = run_dir.join(layout::restore_report_name(&time));
        report.write_file(&report_path)?;
        info!("restore report: {}", report_path.display());

        match report.status {
            RestoreStatus::Success => info!("restore completed successfully"),
            RestoreStatus::Failed => info!("restore completed with some errors"),
        }
        Ok(())
    }

    /// Full when nothing was ever restored locally; incremental otherwise.
    /// An incremental chain is blocked by a failed prior restore or by a
    /// row-check report sitting next to it.
    fn determine_restore_type(&self, cn_dir: &str) -> RestoreResult<RestoreType> {
        let state_dir = layout::restore_state_dir(cn_dir, &self.config.dbname);

        let Some((prior_date, prior_time)) = latest_local_run(&state_dir)? else {
            return Ok(RestoreType::Full);
        };

        let run_dir = state_dir.join(&prior_date).join(&prior_time);

        if run_dir.join(layout::rowchk_block_name(&prior_time)).exists() {
            return Err(RestoreError::RowCheckPending);
        }

        let report_path = run_dir.join(layout::restore_report_name(&prior_time));
        let data = std::fs::read(&report_path)
            .map_err(|e| RestoreError::Io(report_path.display().to_string(), e))?;
        let report = RestoreReport::from_yaml(&data)?;
        if report.status != RestoreStatus::Success {
            return Err(RestoreError::PriorRestoreFailed);
        }

        Ok(RestoreType::Incremental {
            prior_date,
            prior_time,
        })
    }

    /// Forward-only scan of `<folder>/backups/` for the next `(D, T)`.
    async fn select_target(
        &self,
        restore_type: &RestoreType,
    ) -> RestoreResult<Option<(String, String)>> {
        match restore_type {
            RestoreType::Incremental {
                prior_date,
                prior_time,
            } => {
                // Same date first: the smallest timestamp after the prior one.
                let times = self.list_times(prior_date).await?;
                if let Some(time) = min_greater_than(Some(prior_time.as_str()), times) {
                    return Ok(Some((prior_date.clone(), time)));
                }

                // Otherwise the first timestamp of the next date.
                let dates = self.list_dates().await?;
                let Some(date) = min_greater_than(Some(prior_date.as_str()), dates) else {
                    return Ok(None);
                };
                let times = self.list_times(&date).await?;
                Ok(min_greater_than(None, times).map(|time| (date, time)))
            }
            RestoreType::Full => {
                let dates = self.list_dates().await?;
                let Some(date) = min_greater_than(None, dates) else {
                    return Ok(None);
                };
                let times = self.list_times(&date).await?;
                Ok(min_greater_than(None, times).map(|time| (date, time)))
            }
        }
    }

    async fn list_dates(&self) -> RestoreResult<Vec<String>> {
        let names = self
            .store
            .list_dir(&layout::backups_prefix(&self.config.s3.folder))
            .await?;
        for name in &names {
            if !layout::is_date_name(name) {
                return Err(RestoreError::UnknownObject(name.clone()));
            }
        }
        Ok(names)
    }

    async fn list_times(&self, date: &str) -> RestoreResult<Vec<String>> {
        let names = self
            .store
            .list_dir(&layout::date_prefix(&self.config.s3.folder, date))
            .await?;
        for name in &names {
            if !layout::is_timestamp_name(name) {
                return Err(RestoreError::UnknownObject(name.clone()));
            }
        }
        Ok(names)
    }

    /// Apply schema and data for the selected backup, collecting per-table
    /// and per-DDL failures into the report.
    async fn replay(
        &self,
        restore_type: &RestoreType,
        manifest: &BackupManifest,
        date: &str,
        time: &str,
    ) -> RestoreResult<RestoreReport> {
        let client = db::connect(&self.config.dbname).await?;

        let db_version = db::database_version(&client).await?;
        info!("greenplum database version = {}", db_version);
        info!("checking basic restore environment");

        if !manifest.userlist.is_empty() {
            let count = catalog::existing_user_count(&client, &manifest.userlist).await?;
            if count != manifest.userlist.len() as i64 {
                return Err(RestoreError::MissingUsers);
            }
        }

        if matches!(restore_type, RestoreType::Full)
            && catalog::user_table_count(&client).await? != 0
        {
            return Err(RestoreError::NotEmptyDatabase);
        }

        let mut report = RestoreReport::begin(&end_time_stamp());

        if matches!(restore_type, RestoreType::Incremental { .. }) {
            if manifest.dataentries.is_empty() && manifest.ddls.is_empty() {
                info!("no table data need to restore");
            }
            info!("dropping incremental restore tables");

            for entry in &manifest.dataentries {
                client
                    .batch_execute(&format!("drop table if exists {} cascade", entry.name))
                    .await?;
            }

            // Childless parents are dropped too so the schema SQL can
            // recreate them cleanly.
            for parent in catalog::leafless_parent_partitions(&client).await? {
                client
                    .batch_execute(&format!("drop table if exists {} cascade", parent))
                    .await?;
            }
        }

        info!("distributing s3 configuration file to all hosts");
        let gphome = std::env::var("GPHOME").map_err(|_| RestoreError::EnvMissing("GPHOME"))?;
        let hosts = catalog::segment_hosts(&client).await?;
        PluginConfig::new(&self.config.s3, &gphome)
            .write_and_distribute(time, &hosts)
            .await?;

        info!("restoring pre-data metadata");
        let metadata_key = match restore_type {
            RestoreType::Incremental { .. } => {
                layout::incr_metadata_key(&self.config.s3.folder, date, time)
            }
            RestoreType::Full => layout::all_metadata_key(&self.config.s3.folder, date, time),
        };

        if !self.store.exists(&metadata_key).await? {
            // An absent metadata file means the backup carried no schema
            // changes and no data; the run is recorded as replayed.
            info!("no data need to restore");
            report.seal(&end_time_stamp());
            return Ok(report);
        }

        info!("reading backup metadata file: {}", metadata_key);
        let script = self.store.get_bytes(&metadata_key).await?;
        let script = String::from_utf8_lossy(&script).to_string();
        client.batch_execute(&script).await?;
        info!("pre-data metadata restore complete");

        info!("restoring table data");
        self.restore_data(manifest, date, time, &gphome, &mut report)
            .await?;
        info!("data restore complete");

        if matches!(restore_type, RestoreType::Incremental { .. }) && !manifest.ddls.is_empty() {
            info!("restoring incremental ddl sql");
            self.replay_ddls(&manifest.ddls, &mut report).await?;
            info!("incremental ddl restore complete");
        }

        report.seal(&end_time_stamp());
        Ok(report)
    }

    /// Stream every data entry back in over the worker pool.
    async fn restore_data(
        &self,
        manifest: &BackupManifest,
        date: &str,
        time: &str,
        gphome: &str,
        report: &mut RestoreReport,
    ) -> RestoreResult<()> {
        let (tx, rx) = mpsc::channel(WORK_QUEUE_CAPACITY);
        for entry in &manifest.dataentries {
            tx.send(entry.clone())
                .await
                .map_err(|e| RestoreError::Internal(e.to_string()))?;
        }
        drop(tx);
        let queue = Arc::new(tokio::sync::Mutex::new(rx));

        let failed = Arc::new(Mutex::new(Vec::new()));

        let mut workers = Vec::with_capacity(self.config.jobs);
        for _ in 0..self.config.jobs {
            workers.push(tokio::spawn(restore_worker(
                self.config.dbname.clone(),
                gphome.to_string(),
                date.to_string(),
                time.to_string(),
                Arc::clone(&queue),
                Arc::clone(&failed),
            )));
        }
        for worker in workers {
            worker
                .await
                .map_err(|e| RestoreError::Internal(e.to_string()))??;
        }

        report.failtables = Arc::try_unwrap(failed)
            .map_err(|_| RestoreError::Internal("worker still holds failure list".into()))?
            .into_inner()
            .map_err(|_| RestoreError::Internal("failure list mutex poisoned".into()))?;
        Ok(())
    }

    /// Replay the captured DDL deltas; ordering is whatever the channel
    /// yields, no total order is promised.
    async fn replay_ddls(
        &self,
        ddls: &[String],
        report: &mut RestoreReport,
    ) -> RestoreResult<()> {
        let (tx, rx) = mpsc::channel(WORK_QUEUE_CAPACITY);
        for ddl in ddls {
            tx.send(ddl.clone())
                .await
                .map_err(|e| RestoreError::Internal(e.to_string()))?;
        }
        drop(tx);
        let queue = Arc::new(tokio::sync::Mutex::new(rx));

        let failed = Arc::new(Mutex::new(Vec::new()));

        let mut workers = Vec::with_capacity(self.config.jobs);
        for _ in 0..self.config.jobs {
            workers.push(tokio::spawn(ddl_worker(
                self.config.dbname.clone(),
                Arc::clone(&queue),
                Arc::clone(&failed),
            )));
        }
        for worker in workers {
            worker
                .await
                .map_err(|e| RestoreError::Internal(e.to_string()))??;
        }

        report.failddl = Arc::try_unwrap(failed)
            .map_err(|_| RestoreError::Internal("worker still holds failure list".into()))?
            .into_inner()
            .map_err(|_| RestoreError::Internal("failure list mutex poisoned".into()))?;
        Ok(())
    }
}

async fn restore_worker(
    dbname: String,
    gphome: String,
    date: String,
    time: String,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<DataEntry>>>,
    failed: Arc<Mutex<Vec<String>>>,
) -> RestoreResult<()> {
    let client = db::connect(&dbname).await?;

    loop {
        let entry = { queue.lock().await.recv().await };
        let Some(entry) = entry else {
            break;
        };

        let sql = mover::restore_copy_sql(
            &entry.name,
            &entry.attributestring,
            &gphome,
            &date,
            &time,
            entry.oid,
        );
        match mover::run_copy(&client, &sql).await {
            Ok(duration) => info!(
                "restore table {} success, duration: {:.2}s",
                entry.name,
                duration.as_secs_f64()
            ),
            Err(e) => {
                warn!("failed to restore table {}: {}", entry.name, e);
                failed
                    .lock()
                    .map_err(|_| RestoreError::Internal("failure list mutex poisoned".into()))?
                    .push(entry.name);
            }
        }
    }

    Ok(())
}

async fn ddl_worker(
    dbname: String,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<String>>>,
    failed: Arc<Mutex<Vec<String>>>,
) -> RestoreResult<()> {
    let client = db::connect(&dbname).await?;

    loop {
        let ddl = { queue.lock().await.recv().await };
        let Some(ddl) = ddl else {
            break;
        };

        if let Err(e) = client.batch_execute(&ddl).await {
            warn!("failed to execute ddl, {}: {}", ddl, e);
            failed
                .lock()
                .map_err(|_| RestoreError::Internal("failure list mutex poisoned".into()))?
                .push(ddl);
        }
    }

    Ok(())
}
