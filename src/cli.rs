use crate::batch::{BatchReport, process_paths};
use crate::config::CliConfig;
use crate::downloader::{bundle_report, prepare_download};
use crate::error::Result;
use chrono::{DateTime, Local};
use std::fs;
use std::path::PathBuf;

/// What one command-line run did.
#[derive(Debug)]
pub struct CliRun {
    pub report: BatchReport,
    /// The workbook or archive written to the output directory, if any.
    pub written: Option<PathBuf>,
}

impl CliRun {
    /// Every submitted file was processed.
    pub fn succeeded(&self) -> bool {
        !self.report.has_failures()
    }
}

/// Process the configured files and write the result into `out_dir`.
///
/// Output follows the web front end: one file comes back as
/// `processed_<name>`, several as one timestamped zip archive with
/// `failures.json` when anything failed. `--zip` forces the archive for a
/// single file too. Nothing is written when every file failed.
pub fn run(config: &CliConfig, now: DateTime<Local>) -> Result<CliRun> {
    let rule = config.rule.normalizer();
    let report = process_paths(config.files.as_slice(), &rule);

    let download = if config.zip {
        bundle_report(&report, now)?
    } else {
        prepare_download(&report, now)?
    };

    let written = match download {
        Some(download) => {
            fs::create_dir_all(&config.out_dir)?;
            let path = config.out_dir.join(&download.file_name);
            fs::write(&path, &download.bytes)?;
            Some(path)
        }
        None => None,
    };

    Ok(CliRun { report, written })
}
