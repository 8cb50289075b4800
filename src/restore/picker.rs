//! Replay-target selection
//!
//! Restore is forward-only and gap-free: the next target is always the
//! smallest `(D, T)` strictly greater than the last restored one, compared
//! as strings. The local restore-state directory under the coordinator data
//! directory records what has already been replayed.

use std::path::Path;

use crate::manifest::layout;

use super::{RestoreError, RestoreResult};

/// Smallest candidate strictly greater than `floor` (or smallest overall
/// when no floor is given). Comparison is lexicographic, which for the
/// fixed-width digit names is also numeric order.
pub fn min_greater_than<I>(floor: Option<&str>, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    candidates
        .into_iter()
        .filter(|candidate| match floor {
            Some(floor) => candidate.as_str() > floor,
            None => true,
        })
        .min()
}

/// The most recent `(date, timestamp)` recorded under the local restore
/// state directory, or `None` if nothing has been restored yet.
///
/// A date directory without any timestamp directory underneath is state
/// corruption and fatal.
pub fn latest_local_run(state_dir: &Path) -> RestoreResult<Option<(String, String)>> {
    if !state_dir.exists() {
        return Ok(None);
    }

    let dates = list_matching_dirs(state_dir, layout::is_date_name)?;
    let Some(date) = dates.into_iter().max() else {
        return Ok(None);
    };

    let times = list_matching_dirs(&state_dir.join(&date), layout::is_timestamp_name)?;
    let Some(time) = times.into_iter().max() else {
        return Err(RestoreError::NoTimestampDir(date));
    };

    Ok(Some((date, time)))
}

fn list_matching_dirs(dir: &Path, matches: fn(&str) -> bool) -> RestoreResult<Vec<String>> {
    let mut names = Vec::new();

    let entries = std::fs::read_dir(dir)
        .map_err(|e| RestoreError::Io(dir.display().to_string(), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| RestoreError::Io(dir.display().to_string(), e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.path().is_dir() && matches(&name) {
            names.push(name);
        }
    }

    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_min_greater_than_with_floor() {
        let candidates = strings(&[
            "20250301120000000",
            "20250301130000000",
            "20250301110000000",
        ]);
        assert_eq!(
            min_greater_than(Some("20250301115959999"), candidates.clone()),
            Some("20250301120000000".to_string())
        );
        assert_eq!(min_greater_than(Some("20250301130000000"), candidates), None);
    }

    #[test]
    fn test_min_greater_than_without_floor() {
        let candidates = strings(&["20250302", "20250228", "20250301"]);
        assert_eq!(
            min_greater_than(None, candidates),
            Some("20250228".to_string())
        );
        assert_eq!(min_greater_than(None, Vec::new()), None);
    }

    #[test]
    fn test_selection_is_strictly_forward() {
        let candidates = strings(&["20250301", "20250302"]);
        // Equal to the floor is never selected.
        assert_eq!(
            min_greater_than(Some("20250302"), candidates),
            None
        );
    }

    #[test]
    fn test_latest_local_run_empty() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("gpdbbr").join("sales");
        assert_eq!(latest_local_run(&missing).unwrap(), None);

        fs::create_dir_all(&missing).unwrap();
        assert_eq!(latest_local_run(&missing).unwrap(), None);
    }

    #[test]
    fn test_latest_local_run_picks_max_date_and_time() {
        let temp = TempDir::new().unwrap();
        let state = temp.path().to_path_buf();

        for (date, times) in [
            ("20250301", vec!["20250301120000000", "20250301130000000"]),
            ("20250302", vec!["20250302090000000"]),
        ] {
            for time in times {
                fs::create_dir_all(state.join(date).join(time)).unwrap();
            }
        }

        assert_eq!(
            latest_local_run(&state).unwrap(),
            Some(("20250302".to_string(), "20250302090000000".to_string()))
        );
    }

    #[test]
    fn test_latest_local_run_ignores_foreign_entries() {
        let temp = TempDir::new().unwrap();
        let state = temp.path().to_path_buf();

        fs::create_dir_all(state.join("notadate")).unwrap();
        fs::write(state.join("20250399"), b"a plain file, not a dir").unwrap();
        fs::create_dir_all(state.join("20250301").join("20250301120000000")).unwrap();

        assert_eq!(
            latest_local_run(&state).unwrap(),
            Some(("20250301".to_string(), "20250301120000000".to_string()))
        );
    }

    #[test]
    fn test_latest_local_run_date_without_time_is_fatal() {
        let temp = TempDir::new().unwrap();
        let state = temp.path().to_path_buf();
        fs::create_dir_all(state.join("20250301")).unwrap();

        assert!(matches!(
            latest_local_run(&state),
            Err(RestoreError::NoTimestampDir(_))
        ));
    }
}
