use chrono::Local;
use clap::Parser;
use log::error;
use sheet_scrub::batch::FileOutcome;
use sheet_scrub::cli::run;
use sheet_scrub::config::{CliConfig, init_logging};
use std::process::ExitCode;

fn main() -> ExitCode {
    init_logging();
    let config = CliConfig::parse();

    let outcome = match run(&config, Local::now()) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    for file in &outcome.report.outcomes {
        match file {
            FileOutcome::Processed(file) => println!(
                "ok      {} -> {} ({} of {} text cells changed)",
                file.source_name, file.name, file.stats.changed_cells, file.stats.text_cells
            ),
            FileOutcome::Failed(file) => println!("failed  {}: {}", file.name, file.error),
        }
    }
    if let Some(path) = &outcome.written {
        println!("wrote   {}", path.display());
    }

    if outcome.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
