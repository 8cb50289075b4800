//! Data movement via the external segment plugin
//!
//! All table data enters and leaves the database through one statement
//! shape: `COPY … TO/FROM PROGRAM '<pipeline>' … ON SEGMENT`. The pipeline
//! pipes CSV through gzip into the segment plugin, which pushes or pulls
//! the blob under `<SEG_DATA_DIR>/backups/<D>/<T>/gpdbbr_<SEGID>_<T>_<OID>.gz`.
//! The `<SEG_DATA_DIR>` and `<SEGID>` tokens are expanded per segment by
//! the database engine; this process never touches the blobs.

use std::time::{Duration, Instant};

use tokio_postgres::Client;

/// COPY … TO PROGRAM statement for one table's backup.
pub fn backup_copy_sql(
    table: &str,
    columns: &str,
    gphome: &str,
    date: &str,
    timestamp: &str,
    oid: u32,
) -> String {
    format!(
        "COPY {table}({columns}) TO PROGRAM \
         'gzip -c -1 | {gphome}/bin/gpbackup_s3_plugin backup_data \
         /tmp/gpdbbr_{timestamp}_s3.yaml \
         <SEG_DATA_DIR>/backups/{date}/{timestamp}/gpdbbr_<SEGID>_{timestamp}_{oid}.gz' \
         WITH CSV DELIMITER ',' ON SEGMENT IGNORE EXTERNAL PARTITIONS"
    )
}

/// COPY … FROM PROGRAM statement for one table's restore; the mirror of
/// [`backup_copy_sql`].
pub fn restore_copy_sql(
    table: &str,
    columns: &str,
    gphome: &str,
    date: &str,
    timestamp: &str,
    oid: u32,
) -> String {
    format!(
        "COPY {table}({columns}) FROM PROGRAM \
         '{gphome}/bin/gpbackup_s3_plugin restore_data \
         /tmp/gpdbbr_{timestamp}_s3.yaml \
         <SEG_DATA_DIR>/backups/{date}/{timestamp}/gpdbbr_<SEGID>_{timestamp}_{oid}.gz \
         | gzip -d -c' \
         WITH CSV DELIMITER ',' ON SEGMENT"
    )
}

/// Execute a COPY statement and report how long it took.
pub async fn run_copy(client: &Client, sql: &str) -> Result<Duration, tokio_postgres::Error> {
    let start = Instant::now();
    client.batch_execute(sql).await?;
    Ok(start.elapsed())
}
