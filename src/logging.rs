//! Tracing subscriber setup.
//!
//! All operator-facing output goes through `tracing`. Fatal paths log with
//! file and line so a failed run can be traced back to its source.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Called once from `main`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .init();
}
