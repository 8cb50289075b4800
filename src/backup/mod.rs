//! Backup orchestration
//!
//! A run decides full vs incremental from prior job artifacts in the object
//! store, opens the snapshot transaction, locks every user table
//! coordinator-only, and drives change detection and data copy over a
//! worker pool while a parallel task dumps the schema. The manifest is
//! sealed and uploaded last; an aborted run leaves partial objects but no
//! manifest, so the next run ignores the debris.
//!
//! Per-table failures never abort the run; they surface as manifest status
//! `warning`, which the next incremental refuses to chain onto.

mod detect;
mod errors;
mod schema;

pub use detect::{decide_ao, heap_max_stat, heap_mtime_advanced, stat_command, TableAction};
pub use errors::{BackupError, BackupResult};

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::Local;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::catalog::{self, TableInfo};
use crate::cli::Config;
use crate::db::{self, RunContext, SnapshotTxn};
use crate::fanout::{PluginConfig, SshPool};
use crate::manifest::layout;
use crate::manifest::{AoTableState, BackupManifest, DataEntry, HeapTableState, JobStatus};
use crate::mover;
use crate::object_store::ObjectStore;

/// Work-queue bound; effectively unbounded for realistic catalog sizes but
/// a stop on runaway memory if enumeration ever surprises.
const WORK_QUEUE_CAPACITY: usize = 1_000_000;

/// Local end-time stamp, same shape as the run timestamp.
fn end_time_stamp() -> String {
    Local::now().format("%Y%m%d%H%M%S%3f").to_string()
}

enum BackupType {
    Full,
    Incremental(Box<BackupManifest>),
}

/// Shared accumulators the workers merge into, once per table.
#[derive(Default)]
struct Accumulator {
    data_entries: Vec<DataEntry>,
    ddls: Vec<String>,
    fail_tables: Vec<String>,
    ao: BTreeMap<String, AoTableState>,
    heap: BTreeMap<String, HeapTableState>,
}

/// What one worker concluded about one table.
enum TableOutcome {
    Ao {
        modcount: i64,
        last_ddl_time: String,
        entry: Option<DataEntry>,
        ddl: Option<String>,
    },
    Heap {
        max_stat: i64,
        entry: Option<DataEntry>,
    },
}

pub struct BackupOrchestrator<'a> {
    config: &'a Config,
    store: &'a ObjectStore,
}

impl<'a> BackupOrchestrator<'a> {
    pub fn new(config: &'a Config, store: &'a ObjectStore) -> Self {
        Self { config, store }
    }

    /// Drive a full or incremental backup end to end.
    pub async fn run(&self) -> BackupResult<()> {
        info!("checking backup type");
        let backup_type = self.determine_backup_type().await?;
        match backup_type {
            BackupType::Full => info!("backup type = full backup"),
            BackupType::Incremental(_) => info!("backup type = incremental backup"),
        }

        let client = db::connect(&self.config.dbname).await?;

        let db_version = db::database_version(&client).await?;
        info!("greenplum database version = {}", db_version);
        info!("starting backup of database {}", self.config.dbname);
        info!("gathering backup base information");

        let db_oid = db::database_oid(&client, &self.config.dbname).await?;

        let cn_dir = std::env::var("COORDINATOR_DATA_DIRECTORY")
            .map_err(|_| BackupError::EnvMissing("COORDINATOR_DATA_DIRECTORY"))?;
        let catalog_version = db::catalog_version_number(&cn_dir).await?;

        let gphome = std::env::var("GPHOME").map_err(|_| BackupError::EnvMissing("GPHOME"))?;

        let txn = SnapshotTxn::open(&self.config.dbname).await?;
        info!("backup timestamp = {}", txn.timestamp);

        info!("initializing ssh sessions");
        let hosts = catalog::segment_hosts(&client).await?;
        let pool = Arc::new(SshPool::new());
        {
            let pool = Arc::clone(&pool);
            let hosts = hosts.clone();
            tokio::task::spawn_blocking(move || pool.warm(&hosts))
                .await
                .map_err(|e| BackupError::Internal(e.to_string()))??;
        }

        info!("distributing s3 configuration file to all hosts");
        PluginConfig::new(&self.config.s3, &gphome)
            .write_and_distribute(&txn.timestamp, &hosts)
            .await?;

        info!("gathering table state information");
        let all_tables = catalog::list_user_tables(txn.client()).await?;
        let all_names: Vec<String> = all_tables.iter().map(|t| t.name.clone()).collect();

        info!("acquiring access share locks on all tables");
        txn.lock_tables(&all_names).await?;

        let ctx = Arc::new(RunContext {
            timestamp: txn.timestamp.clone(),
            date: txn.date.clone(),
            unix_time: txn.unix_time,
            snapshot: txn.snapshot.clone(),
            db_oid,
            catalog_version,
            gphome,
            hosts,
        });

        let dump_task = tokio::spawn(schema::dump_all_metadata(
            self.config.clone(),
            Arc::clone(&ctx),
            self.store.clone(),
        ));

        info!("gathering additional table metadata");
        let work_list = self.build_work_list(&txn, &ctx, &backup_type).await?;

        info!("writing table data to s3");
        let accumulator = Arc::new(Mutex::new(Accumulator::default()));
        self.run_worker_pool(&ctx, &backup_type, work_list, &accumulator, &pool)
            .await?;

        dump_task
            .await
            .map_err(|e| BackupError::Internal(e.to_string()))??;

        let acc = Arc::try_unwrap(accumulator)
            .map_err(|_| BackupError::Internal("worker still holds accumulator".into()))?
            .into_inner()
            .map_err(|_| BackupError::Internal("accumulator mutex poisoned".into()))?;

        if matches!(backup_type, BackupType::Incremental(_)) {
            self.dump_changed_table_ddl(&client, &ctx, &acc).await?;
        }

        let users = catalog::user_list(&client).await?;

        info!("cleaning up ddl log table data");
        client
            .execute(
                "delete from logddl.ddl_log \
                 where timestamp < to_timestamp($1, 'YYYYMMDDHH24MISSMS')",
                &[&ctx.timestamp],
            )
            .await?;

        info!("getting table row statistics");
        let table_rows = catalog::live_tuple_counts(&client).await?;

        txn.commit().await?;

        self.seal_and_upload(&ctx, acc, users, table_rows).await
    }

    /// Inspect prior artifacts under `<folder>/backups/` to pick the run
    /// kind. A prior manifest that fails to fetch or parse degrades to a
    /// full backup; a prior `warning` manifest is fatal.
    async fn determine_backup_type(&self) -> BackupResult<BackupType> {
        let folder = &self.config.s3.folder;

        let dates = match self.store.list_dir(&layout::backups_prefix(folder)).await {
            Ok(names) => names,
            Err(_) => return Ok(BackupType::Full),
        };
        for name in &dates {
            if !layout::is_date_name(name) {
                return Err(BackupError::UnknownObject(name.clone()));
            }
        }

        let Some(max_date) = dates.into_iter().max() else {
            return Ok(BackupType::Full);
        };

        let times = self
            .store
            .list_dir(&layout::date_prefix(folder, &max_date))
            .await?;
        for name in &times {
            if !layout::is_timestamp_name(name) {
                return Err(BackupError::UnknownObject(name.clone()));
            }
        }
        let Some(max_time) = times.into_iter().max() else {
            return Ok(BackupType::Full);
        };

        let key = layout::jobinfo_key(folder, &max_date, &max_time);
        let manifest = match self.store.get_bytes(&key).await {
            Ok(bytes) => match BackupManifest::from_yaml(&bytes) {
                Ok(manifest) => manifest,
                Err(_) => return Ok(BackupType::Full),
            },
            Err(_) => return Ok(BackupType::Full),
        };

        if manifest.jobinfo.dbname != self.config.dbname {
            return Err(BackupError::DbNameMismatch(manifest.jobinfo.dbname));
        }
        if manifest.jobinfo.status == JobStatus::Warning {
            return Err(BackupError::PriorWarning);
        }

        Ok(BackupType::Incremental(Box::new(manifest)))
    }

    /// Merge the per-concern catalog views into one record per physical
    /// table, all observed under the snapshot.
    async fn build_work_list(
        &self,
        txn: &SnapshotTxn,
        ctx: &RunContext,
        backup_type: &BackupType,
    ) -> BackupResult<Vec<TableInfo>> {
        let tables = catalog::list_physical_tables(txn.client()).await?;
        let columns = catalog::list_columns(txn.client()).await?;
        let ddl_times = catalog::ao_last_ddl_times(txn.client()).await?;
        let seg_relations = catalog::ao_seg_relations(txn.client()).await?;

        let alters = match backup_type {
            BackupType::Incremental(_) => {
                catalog::recent_non_rewriting_alters(txn.client(), &ctx.timestamp).await?
            }
            BackupType::Full => Default::default(),
        };

        Ok(catalog::build_work_list(
            tables,
            &columns,
            &ddl_times,
            &seg_relations,
            &alters,
        ))
    }

    async fn run_worker_pool(
        &self,
        ctx: &Arc<RunContext>,
        backup_type: &BackupType,
        work_list: Vec<TableInfo>,
        accumulator: &Arc<Mutex<Accumulator>>,
        pool: &Arc<SshPool>,
    ) -> BackupResult<()> {
        let (tx, rx) = mpsc::channel(WORK_QUEUE_CAPACITY);
        for table in work_list {
            tx.send(table)
                .await
                .map_err(|e| BackupError::Internal(e.to_string()))?;
        }
        drop(tx);
        let queue = Arc::new(tokio::sync::Mutex::new(rx));

        let prev: Arc<Option<BackupManifest>> = Arc::new(match backup_type {
            BackupType::Incremental(manifest) => Some((**manifest).clone()),
            BackupType::Full => None,
        });

        let mut workers = Vec::with_capacity(self.config.jobs);
        for _ in 0..self.config.jobs {
            workers.push(tokio::spawn(worker_loop(
                self.config.dbname.clone(),
                Arc::clone(ctx),
                Arc::clone(&prev),
                Arc::clone(&queue),
                Arc::clone(accumulator),
                Arc::clone(pool),
            )));
        }

        for worker in workers {
            worker
                .await
                .map_err(|e| BackupError::Internal(e.to_string()))??;
        }
        Ok(())
    }

    /// Incremental only: schema-dump every data-copied table, plus parents
    /// whose leaves all copied, plus parents with no leaves at all.
    async fn dump_changed_table_ddl(
        &self,
        client: &tokio_postgres::Client,
        ctx: &RunContext,
        acc: &Accumulator,
    ) -> BackupResult<()> {
        let copied: Vec<String> = acc.data_entries.iter().map(|e| e.name.clone()).collect();

        let mut tables = copied.clone();
        if !copied.is_empty() {
            tables.extend(catalog::parent_partitions_fully_copied(client, &copied).await?);
        }
        tables.extend(catalog::leafless_parent_partitions(client).await?);

        if tables.is_empty() {
            info!("no table need to backup");
            return Ok(());
        }

        schema::dump_incremental_metadata(self.config, ctx, self.store, &tables).await
    }

    async fn seal_and_upload(
        &self,
        ctx: &RunContext,
        acc: Accumulator,
        users: Vec<String>,
        table_rows: BTreeMap<String, f64>,
    ) -> BackupResult<()> {
        let mut manifest = BackupManifest::begin(&self.config.dbname, &ctx.timestamp);
        manifest.dataentries = acc.data_entries;
        manifest.ddls = acc.ddls;
        manifest.failtables = acc.fail_tables;
        manifest.incrementalmetadata.ao = acc.ao;
        manifest.incrementalmetadata.heap = acc.heap;
        manifest.userlist = users;
        manifest.tablerows = table_rows;
        manifest.seal(&end_time_stamp());

        let staging = layout::manifest_staging_path(&ctx.timestamp);
        manifest.write_file(&staging)?;

        let key = layout::jobinfo_key(&self.config.s3.folder, &ctx.date, &ctx.timestamp);
        info!("write backup job information to {}", key);
        self.store.put_file(&staging, &key).await?;

        match manifest.jobinfo.status {
            JobStatus::Success => info!("backup completed successfully"),
            JobStatus::Warning => info!("backup completed with failed tables"),
        }
        Ok(())
    }
}

/// One data worker: own session, joins the snapshot per table, merges its
/// outcome into the shared accumulators once per table. Per-table errors
/// are recorded, never propagated.
async fn worker_loop(
    dbname: String,
    ctx: Arc<RunContext>,
    prev: Arc<Option<BackupManifest>>,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<TableInfo>>>,
    accumulator: Arc<Mutex<Accumulator>>,
    pool: Arc<SshPool>,
) -> BackupResult<()> {
    let client = db::connect(&dbname).await?;

    loop {
        let table = { queue.lock().await.recv().await };
        let Some(table) = table else {
            break;
        };

        let outcome = process_table(&client, &ctx, prev.as_ref().as_ref(), &pool, &table).await;

        let mut acc = accumulator
            .lock()
            .map_err(|_| BackupError::Internal("accumulator mutex poisoned".into()))?;
        match outcome {
            Ok(TableOutcome::Ao {
                modcount,
                last_ddl_time,
                entry,
                ddl,
            }) => {
                acc.ao.insert(
                    table.name.clone(),
                    AoTableState {
                        modcount,
                        lastddltime: last_ddl_time,
                    },
                );
                if let Some(entry) = entry {
                    acc.data_entries.push(entry);
                }
                if let Some(ddl) = ddl {
                    acc.ddls.push(ddl);
                }
            }
            Ok(TableOutcome::Heap { max_stat, entry }) => {
                acc.heap
                    .insert(table.name.clone(), HeapTableState { maxstat: max_stat });
                if let Some(entry) = entry {
                    acc.data_entries.push(entry);
                }
            }
            Err(e) => {
                warn!("backup table {} failed: {}", table.name, e);
                acc.fail_tables.push(table.name.clone());
            }
        }
    }

    Ok(())
}

/// Detect and (when needed) copy one table inside a snapshot-attached
/// transaction on the worker's session.
async fn process_table(
    client: &tokio_postgres::Client,
    ctx: &RunContext,
    prev: Option<&BackupManifest>,
    pool: &Arc<SshPool>,
    table: &TableInfo,
) -> BackupResult<TableOutcome> {
    db::begin_snapshot_txn(client, &ctx.snapshot).await?;

    let result = if table.is_ao() {
        process_ao_table(client, ctx, prev, table).await
    } else {
        process_heap_table(client, ctx, prev, pool, table).await
    };

    match &result {
        Ok(_) => db::commit_txn(client).await?,
        Err(_) => db::rollback_txn(client).await?,
    }

    result
}

async fn process_ao_table(
    client: &tokio_postgres::Client,
    ctx: &RunContext,
    prev: Option<&BackupManifest>,
    table: &TableInfo,
) -> BackupResult<TableOutcome> {
    let ao = table
        .ao
        .as_ref()
        .ok_or_else(|| BackupError::Internal(format!("{} has no ao info", table.name)))?;

    let modcount = catalog::ao_modcount(client, &ao.seg_relation).await?;

    let prev_state = prev.and_then(|m| m.incrementalmetadata.ao.get(&table.name));
    let action = decide_ao(
        prev.is_none(),
        modcount,
        &ao.last_ddl_time,
        prev_state,
        ao.pending_alter.as_deref(),
    );

    let (entry, ddl) = match action {
        TableAction::Copy => {
            let sql = mover::backup_copy_sql(
                &table.name,
                &table.columns,
                &ctx.gphome,
                &ctx.date,
                &ctx.timestamp,
                table.oid,
            );
            let duration = mover::run_copy(client, &sql).await?;
            info!(
                "backup ao table done: {}, duration: {:.2}s",
                table.name,
                duration.as_secs_f64()
            );
            (
                Some(DataEntry {
                    name: table.name.clone(),
                    oid: table.oid,
                    attributestring: table.columns.clone(),
                }),
                None,
            )
        }
        TableAction::Skip => (None, None),
        TableAction::SkipWithDdl(ddl) => (None, Some(ddl)),
    };

    Ok(TableOutcome::Ao {
        modcount,
        last_ddl_time: ao.last_ddl_time.clone(),
        entry,
        ddl,
    })
}

async fn process_heap_table(
    client: &tokio_postgres::Client,
    ctx: &RunContext,
    prev: Option<&BackupManifest>,
    pool: &Arc<SshPool>,
    table: &TableInfo,
) -> BackupResult<TableOutcome> {
    let locations = catalog::relfile_locations(client, table.oid).await?;
    let max_stat = heap_max_stat(pool, locations, ctx.db_oid, &ctx.catalog_version).await?;

    let prev_state = prev.and_then(|m| m.incrementalmetadata.heap.get(&table.name));
    let copy = if prev.is_none() {
        true
    } else if heap_mtime_advanced(max_stat, prev_state) {
        true
    } else {
        catalog::heap_ddl_count(client, &table.name, &ctx.timestamp).await? > 0
    };

    let entry = if copy {
        let sql = mover::backup_copy_sql(
            &table.name,
            &table.columns,
            &ctx.gphome,
            &ctx.date,
            &ctx.timestamp,
            table.oid,
        );
        let duration = mover::run_copy(client, &sql).await?;
        info!(
            "backup heap table done: {}, duration: {:.2}s",
            table.name,
            duration.as_secs_f64()
        );
        Some(DataEntry {
            name: table.name.clone(),
            oid: table.oid,
            attributestring: table.columns.clone(),
        })
    } else {
        None
    };

    Ok(TableOutcome::Heap { max_stat, entry })
}
