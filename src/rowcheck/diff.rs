//! Row-count reconciliation
//!
//! Live-tuple counts are estimates refreshed by analyze, so the comparison
//! tolerates drift: a count difference is only reported when either side is
//! zero, or when it is both relatively large (> 5% of the backup count) and
//! absolutely large (> 300 rows).

use std::collections::BTreeMap;

use crate::manifest::DiffRow;

/// Outcome of diffing the manifest's row map against the database's.
#[derive(Debug, Default, PartialEq)]
pub struct RowDiff {
    /// Tables recorded in the backup but absent from the database.
    pub only_backup: Vec<String>,
    /// Tables present in the database but absent from the backup.
    pub only_db: Vec<String>,
    /// Tables whose counts differ beyond tolerance.
    pub diff_rows: Vec<DiffRow>,
}

impl RowDiff {
    pub fn is_clean(&self) -> bool {
        self.only_backup.is_empty() && self.only_db.is_empty() && self.diff_rows.is_empty()
    }
}

fn beyond_tolerance(backup_rows: f64, db_rows: f64) -> bool {
    if backup_rows == 0.0 || db_rows == 0.0 {
        return true;
    }
    let delta = (backup_rows - db_rows).abs();
    delta / backup_rows > 0.05 && delta > 300.0
}

/// Diff the backup manifest's row map against the restored database's.
pub fn diff_table_rows(
    backup: &BTreeMap<String, f64>,
    db: &BTreeMap<String, f64>,
) -> RowDiff {
    let mut diff = RowDiff::default();

    for (table, &backup_rows) in backup {
        match db.get(table) {
            None => diff.only_backup.push(table.clone()),
            Some(&db_rows) => {
                if backup_rows != db_rows && beyond_tolerance(backup_rows, db_rows) {
                    diff.diff_rows.push(DiffRow {
                        tabname: table.clone(),
                        bkrow: backup_rows,
                        dbrow: db_rows,
                    });
                }
            }
        }
    }

    for table in db.keys() {
        if !backup.contains_key(table) {
            diff.only_db.push(table.clone());
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(items: &[(&str, f64)]) -> BTreeMap<String, f64> {
        items.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_identical_maps_are_clean() {
        let backup = rows(&[("public.t", 100.0), ("s.a", 0.0)]);
        let diff = diff_table_rows(&backup, &backup.clone());
        assert!(diff.is_clean());
    }

    #[test]
    fn test_missing_tables_reported_on_both_sides() {
        let backup = rows(&[("public.t", 100.0), ("public.gone", 5.0)]);
        let db = rows(&[("public.t", 100.0), ("public.extra", 7.0)]);

        let diff = diff_table_rows(&backup, &db);
        assert_eq!(diff.only_backup, vec!["public.gone"]);
        assert_eq!(diff.only_db, vec!["public.extra"]);
        assert!(diff.diff_rows.is_empty());
    }

    #[test]
    fn test_small_relative_drift_tolerated() {
        // 1% off on a million rows: estimate noise, not a finding.
        let backup = rows(&[("public.t", 1_000_000.0)]);
        let db = rows(&[("public.t", 1_010_000.0)]);
        assert!(diff_table_rows(&backup, &db).is_clean());
    }

    #[test]
    fn test_large_relative_drift_reported() {
        let backup = rows(&[("public.t", 1_000_000.0)]);
        let db = rows(&[("public.t", 1_100_000.0)]);

        let diff = diff_table_rows(&backup, &db);
        assert_eq!(diff.diff_rows.len(), 1);
        assert_eq!(diff.diff_rows[0].tabname, "public.t");
        assert_eq!(diff.diff_rows[0].bkrow, 1_000_000.0);
        assert_eq!(diff.diff_rows[0].dbrow, 1_100_000.0);
    }

    #[test]
    fn test_small_absolute_drift_tolerated() {
        // 50% off but only 100 rows apart: below the absolute floor.
        let backup = rows(&[("public.t", 200.0)]);
        let db = rows(&[("public.t", 300.0)]);
        assert!(diff_table_rows(&backup, &db).is_clean());
    }

    #[test]
    fn test_zero_on_either_side_always_reported() {
        let backup = rows(&[("public.t", 10.0)]);
        let db = rows(&[("public.t", 0.0)]);
        assert_eq!(diff_table_rows(&backup, &db).diff_rows.len(), 1);

        let backup = rows(&[("public.t", 0.0)]);
        let db = rows(&[("public.t", 10.0)]);
        assert_eq!(diff_table_rows(&backup, &db).diff_rows.len(), 1);
    }

    #[test]
    fn test_empty_maps() {
        let diff = diff_table_rows(&BTreeMap::new(), &BTreeMap::new());
        assert!(diff.is_clean());
    }
}
