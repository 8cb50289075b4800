//! Coordinator database sessions
//!
//! One coordinator session owns the run's snapshot transaction; every data
//! worker owns its own session and joins the snapshot by token. The token
//! stays importable for as long as the owning transaction is open, which is
//! the entire backup.

mod context;
mod errors;
mod snapshot;

pub use context::RunContext;
pub use errors::{DbError, DbResult};
pub use snapshot::SnapshotTxn;

use tokio_postgres::{Client, NoTls};
use tracing::warn;

const DB_USER: &str = "gpadmin";
const DB_PORT: u16 = 5432;

/// Open a session against the local coordinator.
///
/// The connection driver runs on its own task; a broken connection surfaces
/// as an error on the next statement.
pub async fn connect(dbname: &str) -> DbResult<Client> {
    let conn_str = format!(
        "host=localhost port={} user={} dbname={} sslmode=disable",
        DB_PORT, DB_USER, dbname
    );

    let (client, connection) = tokio_postgres::connect(&conn_str, NoTls)
        .await
        .map_err(|e| DbError::Connect(dbname.to_string(), e))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!("database connection error: {}", e);
        }
    });

    Ok(client)
}

/// Begin a sibling transaction that adopts the exported snapshot.
///
/// These must be the first statements of the transaction; anything executed
/// earlier would fix a different snapshot.
pub async fn begin_snapshot_txn(client: &Client, snapshot: &str) -> DbResult<()> {
    client
        .batch_execute(&format!(
            "BEGIN; \
             SET TRANSACTION ISOLATION LEVEL SERIALIZABLE; \
             SET TRANSACTION SNAPSHOT '{}';",
            snapshot
        ))
        .await
        .map_err(DbError::Query)
}

pub async fn commit_txn(client: &Client) -> DbResult<()> {
    client.batch_execute("COMMIT").await.map_err(DbError::Query)
}

pub async fn rollback_txn(client: &Client) -> DbResult<()> {
    client
        .batch_execute("ROLLBACK")
        .await
        .map_err(DbError::Query)
}

/// The server version string, reduced to the Greenplum release number.
pub async fn database_version(client: &Client) -> DbResult<String> {
    let row = client
        .query_one("select version()", &[])
        .await
        .map_err(DbError::Query)?;
    let full: String = row.get(0);

    parse_greenplum_version(&full).ok_or(DbError::VersionParse(full))
}

/// OID of the target database.
pub async fn database_oid(client: &Client, dbname: &str) -> DbResult<u32> {
    let row = client
        .query_one("select oid from pg_database where datname = $1", &[&dbname])
        .await
        .map_err(DbError::Query)?;
    Ok(row.get(0))
}

/// The catalog version number reported by `pg_controldata` against the
/// coordinator data directory. It names the tablespace path component for
/// non-default tablespaces.
pub async fn catalog_version_number(cn_dir: &str) -> DbResult<String> {
    let output = tokio::process::Command::new("pg_controldata")
        .arg("-D")
        .arg(cn_dir)
        .output()
        .await
        .map_err(|e| DbError::Subprocess("pg_controldata".into(), e.to_string()))?;

    if !output.status.success() {
        return Err(DbError::Subprocess(
            "pg_controldata".into(),
            String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_catalog_version(&stdout).ok_or_else(|| {
        DbError::Subprocess(
            "pg_controldata".into(),
            "catalog version number not found in output".into(),
        )
    })
}

fn parse_greenplum_version(version: &str) -> Option<String> {
    let marker = "Greenplum Database ";
    let begin = version.find(marker)? + marker.len();
    let end = version[begin..].find(')')?;
    Some(version[begin..begin + end].to_string())
}

fn parse_catalog_version(controldata: &str) -> Option<String> {
    for line in controldata.lines() {
        if line.contains("Catalog version number") {
            return line.split(':').nth(1).map(|v| v.trim().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_greenplum_version() {
        let full = "PostgreSQL 12.12 (Greenplum Database 7.1.0 build commit:e6da687) on x86_64-pc-linux-gnu";
        assert_eq!(parse_greenplum_version(full).as_deref(), Some("7.1.0 build commit:e6da687"));
    }

    #[test]
    fn test_parse_greenplum_version_missing_marker() {
        assert!(parse_greenplum_version("PostgreSQL 15.2 on x86_64").is_none());
    }

    #[test]
    fn test_parse_catalog_version() {
        let controldata = "\
pg_control version number:            12010700
Catalog version number:               302307241
Database system identifier:           7301059746559037451";
        assert_eq!(parse_catalog_version(controldata).as_deref(), Some("302307241"));
    }

    #[test]
    fn test_parse_catalog_version_absent() {
        assert!(parse_catalog_version("pg_control version number: 1").is_none());
    }
}
