//! The run's snapshot transaction
//!
//! One coordinator session takes a checkpoint, begins a serializable
//! transaction with lock and idle timeouts disabled, exports a snapshot
//! token and reads the coordinator clock exactly once. The token and the
//! derived run identifiers are immutable for the rest of the run.
//!
//! The transaction also carries the run-wide ACCESS SHARE locks: the token
//! fixes MVCC visibility, but only the locks keep concurrent DDL from
//! making the schema dump and the data dump disagree. Everything is
//! released at commit.

use tokio_postgres::Client;

use super::{connect, DbError, DbResult};

pub struct SnapshotTxn {
    client: Client,
    /// Exported snapshot token, importable by sibling sessions.
    pub snapshot: String,
    /// Coordinator clock at export time, unix seconds.
    pub unix_time: i64,
    /// 17-digit run timestamp `YYYYMMDDhh24missms`.
    pub timestamp: String,
    /// 8-digit run date `YYYYMMDD`.
    pub date: String,
}

impl SnapshotTxn {
    /// Open the coordinator session and export the run snapshot.
    ///
    /// Any failure here is fatal to the run.
    pub async fn open(dbname: &str) -> DbResult<Self> {
        let client = connect(dbname).await?;

        client
            .batch_execute("checkpoint")
            .await
            .map_err(DbError::Query)?;

        client
            .batch_execute(
                "BEGIN; \
                 SET TRANSACTION ISOLATION LEVEL SERIALIZABLE; \
                 SET lock_timeout = 0; \
                 SET idle_in_transaction_session_timeout = 0;",
            )
            .await
            .map_err(DbError::Query)?;

        let row = client
            .query_one(
                "SELECT FLOOR(EXTRACT(EPOCH FROM NOW()))::BIGINT AS unix_timestamp, \
                 TO_CHAR(CURRENT_TIMESTAMP, 'YYYYMMDDHH24MISSMS') AS formatted_time, \
                 TO_CHAR(CURRENT_TIMESTAMP, 'YYYYMMDD') AS formatted_date, \
                 pg_export_snapshot() AS snap_id",
                &[],
            )
            .await
            .map_err(DbError::Query)?;

        Ok(Self {
            snapshot: row.get("snap_id"),
            unix_time: row.get("unix_timestamp"),
            timestamp: row.get("formatted_time"),
            date: row.get("formatted_date"),
            client,
        })
    }

    /// The session holding the open transaction. Catalog reads that must
    /// observe the snapshot run on this client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Take coordinator-only ACCESS SHARE locks on every listed table.
    ///
    /// Blocks concurrent DDL while permitting reads and writes; held until
    /// commit.
    pub async fn lock_tables(&self, tables: &[String]) -> DbResult<()> {
        if tables.is_empty() {
            return Ok(());
        }

        let lock_sql = format!(
            "LOCK TABLE {} IN ACCESS SHARE MODE COORDINATOR ONLY",
            tables.join(", ")
        );
        self.client
            .batch_execute(&lock_sql)
            .await
            .map_err(DbError::Query)
    }

    /// Commit, releasing the snapshot and every lock.
    pub async fn commit(self) -> DbResult<()> {
        self.client
            .batch_execute("COMMIT")
            .await
            .map_err(DbError::Query)
    }
}
