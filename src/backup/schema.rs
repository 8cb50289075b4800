//! Schema dumps
//!
//! The full dump runs the external schema-dump utility against the run's
//! snapshot token, then appends per-function definitions for every user
//! schema: the utility omits function bodies for this dialect, so they are
//! recovered from `pg_get_functiondef` inside a sibling snapshot
//! transaction. Incremental runs dump only the changed tables with
//! per-table flags.

use std::path::Path;

use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::catalog;
use crate::cli::Config;
use crate::db::{self, RunContext};
use crate::manifest::layout;
use crate::object_store::ObjectStore;

use super::{BackupError, BackupResult};

/// Dump the complete schema and upload it as `gpdbbr_<T>_all_metadata.sql`.
pub async fn dump_all_metadata(
    config: Config,
    ctx: std::sync::Arc<RunContext>,
    store: ObjectStore,
) -> BackupResult<()> {
    let staging = layout::all_metadata_staging_path(&ctx.timestamp);

    run_pg_dump(&[
        "-s",
        &format!("--snapshot={}", ctx.snapshot),
        &config.dbname,
        "-f",
        &staging.display().to_string(),
    ])
    .await?;

    append_function_definitions(&config.dbname, &ctx.snapshot, &staging).await?;

    let key = layout::all_metadata_key(&config.s3.folder, &ctx.date, &ctx.timestamp);
    info!("metadata write to {}", key);
    store.put_file(&staging, &key).await?;
    Ok(())
}

/// Dump the DDL of the given tables and upload it as
/// `gpdbbr_<T>_incr_metadata.sql`.
pub async fn dump_incremental_metadata(
    config: &Config,
    ctx: &RunContext,
    store: &ObjectStore,
    tables: &[String],
) -> BackupResult<()> {
    let staging = layout::incr_metadata_staging_path(&ctx.timestamp);
    let staging_str = staging.display().to_string();

    let mut args = vec![
        "-s".to_string(),
        format!("--snapshot={}", ctx.snapshot),
        config.dbname.clone(),
        "-f".to_string(),
        staging_str,
    ];
    for table in tables {
        args.push("-t".to_string());
        args.push(table.clone());
    }

    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    run_pg_dump(&arg_refs).await?;

    let key = layout::incr_metadata_key(&config.s3.folder, &ctx.date, &ctx.timestamp);
    info!("getting incremental metadata to {}", key);
    store.put_file(&staging, &key).await?;
    Ok(())
}

async fn run_pg_dump(args: &[&str]) -> BackupResult<()> {
    let output = tokio::process::Command::new("pg_dump")
        .args(args)
        .output()
        .await
        .map_err(|e| BackupError::Dump(e.to_string()))?;

    if !output.status.success() {
        return Err(BackupError::Dump(
            String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        ));
    }
    Ok(())
}

/// Append `pg_get_functiondef` output for every user schema to the dump
/// file, observing the run snapshot from a sibling transaction.
async fn append_function_definitions(
    dbname: &str,
    snapshot: &str,
    dump_path: &Path,
) -> BackupResult<()> {
    let client = db::connect(dbname).await?;

    client
        .batch_execute(&format!(
            "BEGIN; \
             SET TRANSACTION ISOLATION LEVEL SERIALIZABLE; \
             SET lock_timeout = 0; \
             SET idle_in_transaction_session_timeout = 0; \
             SET TRANSACTION SNAPSHOT '{}';",
            snapshot
        ))
        .await?;

    let schemas = catalog::schema_oids(&client).await?;

    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(dump_path)
        .await
        .map_err(|e| BackupError::Io(dump_path.display().to_string(), e))?;

    for schema_oid in schemas {
        for definition in catalog::function_definitions(&client, schema_oid).await? {
            file.write_all(format!("{};\n\n", definition).as_bytes())
                .await
                .map_err(|e| BackupError::Io(dump_path.display().to_string(), e))?;
        }
    }

    file.flush()
        .await
        .map_err(|e| BackupError::Io(dump_path.display().to_string(), e))?;

    db::rollback_txn(&client).await?;
    Ok(())
}
