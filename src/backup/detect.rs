//! Per-table change detection
//!
//! Append-optimized tables expose a segment-level modification counter, so
//! data change is a modcount comparison and DDL-only change falls out of
//! the last-DDL timestamp. Heap tables have neither; their change proxy is
//! the maximum filesystem mtime over the table's relfiles (and its toast
//! sibling's) across the coordinator and every primary segment, which
//! catches DML, truncate, vacuum full and rewrites without scanning data.
//!
//! A rewriting DDL bumps the AO modcount and advances heap mtimes, so both
//! families catch it on the data path; a pure tablespace/with alter does
//! not, and is cheaper to replay as a captured statement than to re-dump.

use std::sync::Arc;

use crate::catalog::RelfileLocation;
use crate::fanout::SshPool;
use crate::manifest::{AoTableState, HeapTableState};

use super::{BackupError, BackupResult};

/// Outcome of change detection for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableAction {
    /// Re-copy the table's data this run.
    Copy,
    /// Emit no data entry; metadata is re-recorded unchanged.
    Skip,
    /// Emit no data entry; replay this alter at restore instead.
    SkipWithDdl(String),
}

/// Decide an append-optimized table against the previous run's state.
///
/// An absent previous entry compares as `{modcount: 0, lastddltime: ""}`,
/// so a newly created table (whose last-DDL time is never empty) always
/// copies.
pub fn decide_ao(
    full: bool,
    modcount: i64,
    last_ddl_time: &str,
    prev: Option<&AoTableState>,
    pending_alter: Option<&str>,
) -> TableAction {
    if full {
        return TableAction::Copy;
    }

    let (prev_modcount, prev_ddl_time) = match prev {
        Some(state) => (state.modcount, state.lastddltime.as_str()),
        None => (0, ""),
    };

    if modcount != prev_modcount {
        return TableAction::Copy;
    }

    if last_ddl_time == prev_ddl_time {
        return TableAction::Skip;
    }

    match pending_alter {
        Some(ddl) => TableAction::SkipWithDdl(ddl.to_string()),
        None => TableAction::Copy,
    }
}

/// Whether a heap table's relfile mtime moved past the previous run's.
///
/// An absent previous entry compares as `maxstat == 0`, so any observed
/// mtime forces a copy.
pub fn heap_mtime_advanced(max_stat: i64, prev: Option<&HeapTableState>) -> bool {
    max_stat > prev.map(|state| state.maxstat).unwrap_or(0)
}

/// The mtime probe run on a segment host for one relfile location.
///
/// The trailing wildcard covers segmented heap relfiles (`.1`, `.2`, …);
/// integer-seconds output keeps manifests comparable across runs.
pub fn stat_command(location: &RelfileLocation, db_oid: u32, catalog_version: &str) -> String {
    if location.tablespace != 0 {
        format!(
            "stat -c %Y {}/pg_tblspc/{}/GPDB_7_{}/{}/{}* | sort -n | tail -1",
            location.data_dir, location.tablespace, catalog_version, db_oid, location.relfilenode
        )
    } else {
        format!(
            "stat -c %Y {}/base/{}/{}* | sort -n | tail -1",
            location.data_dir, db_oid, location.relfilenode
        )
    }
}

/// Fan the mtime probe out over every relfile location and take the max.
///
/// A table with no locations (no relfiles of its own) yields 0 without
/// touching any host.
pub async fn heap_max_stat(
    pool: &Arc<SshPool>,
    locations: Vec<RelfileLocation>,
    db_oid: u32,
    catalog_version: &str,
) -> BackupResult<i64> {
    let mut max_stat = 0i64;

    for location in locations {
        let command = stat_command(&location, db_oid, catalog_version);
        let host = location.host.clone();

        let pool = Arc::clone(pool);
        let output = tokio::task::spawn_blocking(move || pool.execute(&host, &command))
            .await
            .map_err(|e| BackupError::Internal(e.to_string()))??;

        let stat: i64 = output
            .trim()
            .parse()
            .map_err(|_| BackupError::MtimeParse(location.host.clone(), output))?;

        if stat > max_stat {
            max_stat = stat;
        }
    }

    Ok(max_stat)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prev_ao(modcount: i64, lastddltime: &str) -> AoTableState {
        AoTableState {
            modcount,
            lastddltime: lastddltime.to_string(),
        }
    }

    #[test]
    fn test_full_backup_always_copies() {
        let prev = prev_ao(5, "20250301115900000");
        assert_eq!(
            decide_ao(true, 5, "20250301115900000", Some(&prev), None),
            TableAction::Copy
        );
        assert!(heap_mtime_advanced(1, None));
    }

    #[test]
    fn test_ao_modcount_changed_copies() {
        let prev = prev_ao(5, "20250301115900000");
        assert_eq!(
            decide_ao(false, 6, "20250301115900000", Some(&prev), None),
            TableAction::Copy
        );
    }

    #[test]
    fn test_ao_unchanged_skips() {
        let prev = prev_ao(5, "20250301115900000");
        assert_eq!(
            decide_ao(false, 5, "20250301115900000", Some(&prev), None),
            TableAction::Skip
        );
    }

    #[test]
    fn test_ao_ddl_only_change_with_alter_emits_delta() {
        let prev = prev_ao(5, "20250301115900000");
        let action = decide_ao(
            false,
            5,
            "20250301120100000",
            Some(&prev),
            Some("ALTER TABLE s.a SET TABLESPACE tsb"),
        );
        assert_eq!(
            action,
            TableAction::SkipWithDdl("ALTER TABLE s.a SET TABLESPACE tsb".to_string())
        );
    }

    #[test]
    fn test_ao_ddl_only_change_without_alter_copies() {
        let prev = prev_ao(5, "20250301115900000");
        assert_eq!(
            decide_ao(false, 5, "20250301120100000", Some(&prev), None),
            TableAction::Copy
        );
    }

    #[test]
    fn test_ao_zero_modcount_can_skip() {
        let prev = prev_ao(0, "20250301115900000");
        assert_eq!(
            decide_ao(false, 0, "20250301115900000", Some(&prev), None),
            TableAction::Skip
        );
    }

    #[test]
    fn test_ao_new_table_copies() {
        assert_eq!(
            decide_ao(false, 0, "20250301120100000", None, None),
            TableAction::Copy
        );
    }

    #[test]
    fn test_heap_mtime_comparison() {
        let prev = HeapTableState { maxstat: 1740800000 };
        assert!(heap_mtime_advanced(1740800001, Some(&prev)));
        assert!(!heap_mtime_advanced(1740800000, Some(&prev)));
        assert!(!heap_mtime_advanced(1740799999, Some(&prev)));
        assert!(!heap_mtime_advanced(0, None));
    }

    #[test]
    fn test_stat_command_default_tablespace() {
        let location = RelfileLocation {
            tablespace: 0,
            relfilenode: 16388,
            host: "sdw1".into(),
            data_dir: "/data/primary/gpseg0".into(),
        };
        assert_eq!(
            stat_command(&location, 16999, "302307241"),
            "stat -c %Y /data/primary/gpseg0/base/16999/16388* | sort -n | tail -1"
        );
    }

    #[test]
    fn test_stat_command_custom_tablespace() {
        let location = RelfileLocation {
            tablespace: 17001,
            relfilenode: 16388,
            host: "sdw1".into(),
            data_dir: "/data/primary/gpseg0".into(),
        };
        assert_eq!(
            stat_command(&location, 16999, "302307241"),
            "stat -c %Y /data/primary/gpseg0/pg_tblspc/17001/GPDB_7_302307241/16999/16388* | sort -n | tail -1"
        );
    }
}
