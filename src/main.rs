//! gpdbbr CLI entry point
//!
//! main.rs only parses arguments and dispatches; every subsystem is reached
//! through `cli::run_command`.

use std::process;

use gpdbbr::cli::{run_command, Cli};
use gpdbbr::logging;

#[tokio::main]
async fn main() {
    logging::init();

    let cli = Cli::parse_args();

    if let Err(e) = run_command(cli).await {
        tracing::error!("{}", e);
        process::exit(1);
    }
}
