//! gpdbbr - full and incremental backup/restore for Greenplum-class MPP databases
//!
//! One backup run exports schema and per-segment table data to an
//! S3-compatible object store inside a single serializable, snapshot-exported
//! transaction. Restore replays backups forward-only; row-check reconciles
//! live-tuple estimates against the backup manifest afterwards.

pub mod backup;
pub mod catalog;
pub mod cli;
pub mod db;
pub mod fanout;
pub mod logging;
pub mod manifest;
pub mod mover;
pub mod object_store;
pub mod restore;
pub mod rowcheck;
