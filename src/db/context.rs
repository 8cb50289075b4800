//! Immutable per-run state
//!
//! Everything here is written once during run setup and then shared
//! read-only with the worker pool and the schema-dump task.

/// Identifiers and environment fixed at the moment the snapshot is taken.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// 17-digit run timestamp `YYYYMMDDhh24missms`.
    pub timestamp: String,
    /// 8-digit run date `YYYYMMDD`.
    pub date: String,
    /// Coordinator clock at snapshot time, unix seconds.
    pub unix_time: i64,
    /// Exported snapshot token.
    pub snapshot: String,
    /// OID of the target database.
    pub db_oid: u32,
    /// Catalog version number from `pg_controldata`.
    pub catalog_version: String,
    /// Database install prefix on every host.
    pub gphome: String,
    /// Distinct primary segment hostnames.
    pub hosts: Vec<String>,
}
