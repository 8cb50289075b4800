//! Forward-only replay selection
//!
//! Restore must never select a `(D, T)` lexicographically at or before the
//! last restored one, and replay must be gap-free: repeatedly applying the
//! selection visits every backup exactly once, in order.

use gpdbbr::restore::{latest_local_run, min_greater_than};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// The selection rule applied to a whole catalog of runs: same date first,
/// then the first timestamp of the next date.
fn next_target(
    prior: Option<(&str, &str)>,
    runs: &[(&str, &str)],
) -> Option<(String, String)> {
    let dates: Vec<String> = {
        let mut dates: Vec<String> = runs.iter().map(|(d, _)| d.to_string()).collect();
        dates.dedup();
        dates
    };
    let times_under = |date: &str| -> Vec<String> {
        runs.iter()
            .filter(|(d, _)| *d == date)
            .map(|(_, t)| t.to_string())
            .collect()
    };

    match prior {
        Some((prior_date, prior_time)) => {
            if let Some(time) = min_greater_than(Some(prior_time), times_under(prior_date)) {
                return Some((prior_date.to_string(), time));
            }
            let date = min_greater_than(Some(prior_date), dates)?;
            let time = min_greater_than(None, times_under(&date))?;
            Some((date, time))
        }
        None => {
            let date = min_greater_than(None, dates)?;
            let time = min_greater_than(None, times_under(&date))?;
            Some((date, time))
        }
    }
}

#[test]
fn test_never_selects_at_or_before_prior() {
    let times = strings(&[
        "20250301110000000",
        "20250301120000000",
        "20250301130000000",
    ]);

    let selected = min_greater_than(Some("20250301120000000"), times.clone());
    assert_eq!(selected, Some("20250301130000000".to_string()));

    let selected = min_greater_than(Some("20250301130000000"), times);
    assert_eq!(selected, None);
}

#[test]
fn test_full_restore_starts_from_the_oldest_backup() {
    let runs = [
        ("20250301", "20250301120000000"),
        ("20250301", "20250301180000000"),
        ("20250302", "20250302090000000"),
    ];
    assert_eq!(
        next_target(None, &runs),
        Some(("20250301".to_string(), "20250301120000000".to_string()))
    );
}

#[test]
fn test_replay_is_gap_free_and_in_order() {
    let runs = [
        ("20250301", "20250301120000000"),
        ("20250301", "20250301180000000"),
        ("20250302", "20250302090000000"),
        ("20250304", "20250304070000000"),
        ("20250304", "20250304220000000"),
    ];

    let mut prior: Option<(String, String)> = None;
    let mut visited = Vec::new();
    while let Some(target) = next_target(
        prior.as_ref().map(|(d, t)| (d.as_str(), t.as_str())),
        &runs,
    ) {
        visited.push(target.clone());
        prior = Some(target);
    }

    let expected: Vec<(String, String)> = runs
        .iter()
        .map(|(d, t)| (d.to_string(), t.to_string()))
        .collect();
    assert_eq!(visited, expected);
}

#[test]
fn test_date_rollover_picks_first_time_of_next_date() {
    let runs = [
        ("20250301", "20250301230000000"),
        ("20250302", "20250302010000000"),
        ("20250302", "20250302020000000"),
    ];
    assert_eq!(
        next_target(Some(("20250301", "20250301230000000")), &runs),
        Some(("20250302".to_string(), "20250302010000000".to_string()))
    );
}

#[test]
fn test_caught_up_yields_no_target() {
    let runs = [("20250301", "20250301120000000")];
    assert_eq!(next_target(Some(("20250301", "20250301120000000")), &runs), None);
}

/// Identifiers spanning the supported date range stay correctly ordered
/// under string comparison.
#[test]
fn test_lexicographic_order_matches_numeric_order() {
    let mut dates = strings(&["20000101", "99991231", "20250301", "20991231"]);
    let mut sorted_as_numbers = dates.clone();
    dates.sort();
    sorted_as_numbers.sort_by_key(|d| d.parse::<u64>().unwrap());
    assert_eq!(dates, sorted_as_numbers);

    let mut times = strings(&[
        "20000101000000000",
        "99991231235959999",
        "20250301120000000",
    ]);
    let mut sorted_as_numbers = times.clone();
    times.sort();
    sorted_as_numbers.sort_by_key(|t| t.parse::<u64>().unwrap());
    assert_eq!(times, sorted_as_numbers);
}

#[test]
fn test_local_state_tracks_latest_restored_run() {
    let temp = tempfile::TempDir::new().unwrap();
    let state = temp.path().to_path_buf();

    std::fs::create_dir_all(state.join("20250301").join("20250301120000000")).unwrap();
    std::fs::create_dir_all(state.join("20250301").join("20250301180000000")).unwrap();

    assert_eq!(
        latest_local_run(&state).unwrap(),
        Some(("20250301".to_string(), "20250301180000000".to_string()))
    );
}
