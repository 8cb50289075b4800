//! Object-store and local filesystem layout
//!
//! Every run is addressed by an 8-digit date `D` (`YYYYMMDD`) and a
//! 17-digit millisecond timestamp `T` (`YYYYMMDDhh24missms`) taken from the
//! coordinator clock. Both are carried as strings and compared
//! lexicographically; all enumeration and replay ordering depends on that.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

/// `<folder>/backups/`
pub fn backups_prefix(folder: &str) -> String {
    format!("{}/backups/", folder)
}

/// `<folder>/backups/<D>/`
pub fn date_prefix(folder: &str, date: &str) -> String {
    format!("{}/backups/{}/", folder, date)
}

/// `<folder>/backups/<D>/<T>/gpdbbr_<T>_jobinfo.yaml`
pub fn jobinfo_key(folder: &str, date: &str, timestamp: &str) -> String {
    format!(
        "{}/backups/{}/{}/gpdbbr_{}_jobinfo.yaml",
        folder, date, timestamp, timestamp
    )
}

/// `<folder>/backups/<D>/<T>/gpdbbr_<T>_all_metadata.sql`
pub fn all_metadata_key(folder: &str, date: &str, timestamp: &str) -> String {
    format!(
        "{}/backups/{}/{}/gpdbbr_{}_all_metadata.sql",
        folder, date, timestamp, timestamp
    )
}

/// `<folder>/backups/<D>/<T>/gpdbbr_<T>_incr_metadata.sql`
pub fn incr_metadata_key(folder: &str, date: &str, timestamp: &str) -> String {
    format!(
        "{}/backups/{}/{}/gpdbbr_{}_incr_metadata.sql",
        folder, date, timestamp, timestamp
    )
}

/// Plugin credentials file, present at the same path on every segment host.
pub fn plugin_config_path(timestamp: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/gpdbbr_{}_s3.yaml", timestamp))
}

/// Local staging file for the manifest before upload.
pub fn manifest_staging_path(timestamp: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/bkresult_{}.yaml", timestamp))
}

/// Local staging file for the full schema dump.
pub fn all_metadata_staging_path(timestamp: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/gpdbbr_{}_all_metadata.sql", timestamp))
}

/// Local staging file for the incremental schema dump.
pub fn incr_metadata_staging_path(timestamp: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/gpdbbr_{}_incr_metadata.sql", timestamp))
}

/// `<cnDir>/gpdbbr/<dbname>` - root of the local restore state.
pub fn restore_state_dir(cn_dir: &str, dbname: &str) -> PathBuf {
    PathBuf::from(cn_dir).join("gpdbbr").join(dbname)
}

/// `<cnDir>/gpdbbr/<dbname>/<D>/<T>`
pub fn restore_run_dir(cn_dir: &str, dbname: &str, date: &str, timestamp: &str) -> PathBuf {
    restore_state_dir(cn_dir, dbname).join(date).join(timestamp)
}

/// `gpdbbr_<T>_report` inside a restore run directory.
pub fn restore_report_name(timestamp: &str) -> String {
    format!("gpdbbr_{}_report", timestamp)
}

/// `rowcheck_<T>_report` inside a restore run directory, written by the
/// row checker when a discrepancy is found.
pub fn rowcheck_report_name(timestamp: &str) -> String {
    format!("rowcheck_{}_report", timestamp)
}

/// `rowchk_<T>_report` - the sibling name restore probes before chaining.
pub fn rowchk_block_name(timestamp: &str) -> String {
    format!("rowchk_{}_report", timestamp)
}

/// An 8-digit date directory name.
pub fn is_date_name(name: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{8}$").expect("valid date pattern"))
        .is_match(name)
}

/// A 17-digit timestamp directory name.
pub fn is_timestamp_name(name: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{17}$").expect("valid timestamp pattern"))
        .is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const D: &str = "20250301";
    const T: &str = "20250301120000000";

    #[test]
    fn test_object_keys() {
        assert_eq!(backups_prefix("sales"), "sales/backups/");
        assert_eq!(date_prefix("sales", D), "sales/backups/20250301/");
        assert_eq!(
            jobinfo_key("sales", D, T),
            "sales/backups/20250301/20250301120000000/gpdbbr_20250301120000000_jobinfo.yaml"
        );
        assert_eq!(
            all_metadata_key("sales", D, T),
            "sales/backups/20250301/20250301120000000/gpdbbr_20250301120000000_all_metadata.sql"
        );
        assert_eq!(
            incr_metadata_key("sales", D, T),
            "sales/backups/20250301/20250301120000000/gpdbbr_20250301120000000_incr_metadata.sql"
        );
    }

    #[test]
    fn test_local_paths() {
        assert_eq!(
            plugin_config_path(T),
            PathBuf::from("/tmp/gpdbbr_20250301120000000_s3.yaml")
        );
        assert_eq!(
            manifest_staging_path(T),
            PathBuf::from("/tmp/bkresult_20250301120000000.yaml")
        );
        assert_eq!(
            all_metadata_staging_path(T),
            PathBuf::from("/tmp/gpdbbr_20250301120000000_all_metadata.sql")
        );
    }

    #[test]
    fn test_restore_paths() {
        let run = restore_run_dir("/data/coordinator", "sales", D, T);
        assert_eq!(
            run,
            PathBuf::from("/data/coordinator/gpdbbr/sales/20250301/20250301120000000")
        );
        assert_eq!(restore_report_name(T), "gpdbbr_20250301120000000_report");
        assert_eq!(rowcheck_report_name(T), "rowcheck_20250301120000000_report");
        assert_eq!(rowchk_block_name(T), "rowchk_20250301120000000_report");
    }

    #[test]
    fn test_dir_name_validation() {
        assert!(is_date_name("20250301"));
        assert!(!is_date_name("2025030"));
        assert!(!is_date_name("2025030a"));
        assert!(is_timestamp_name("20250301120000000"));
        assert!(!is_timestamp_name("20250301120000"));
        assert!(!is_timestamp_name("20250301_20000000"));
    }

    #[test]
    fn test_date_and_timestamp_sort_lexicographically() {
        let mut dates = vec!["20250302", "20241231", "20250301"];
        dates.sort();
        assert_eq!(dates, vec!["20241231", "20250301", "20250302"]);

        let mut times = vec![
            "20250301120000001",
            "20250301115959999",
            "20250301120000000",
        ];
        times.sort();
        assert_eq!(
            times,
            vec![
                "20250301115959999",
                "20250301120000000",
                "20250301120000001",
            ]
        );
    }
}
