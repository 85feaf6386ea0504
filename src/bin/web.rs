#![cfg(not(tarpaulin_include))]

use clap::Parser;
use sheet_scrub::app;
use sheet_scrub::config::{ServerConfig, init_logging};

/// Web front end: serves the upload form and the processing endpoint.
///
/// Settings come from the command line or `SHEET_SCRUB_*` environment
/// variables; see `website --help`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let config = ServerConfig::parse();
    app::run(config).await
}
