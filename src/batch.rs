use crate::error::ScrubError;
use crate::loader::{UploadedFile, load_workbook, read_upload};
use crate::normalizer::Normalizer;
use crate::workbook::NormalizeStats;
use log::{debug, info, warn};
use serde::Serialize;
use std::path::Path;

/// Prefix added to the name of every processed file.
pub const OUTPUT_PREFIX: &str = "processed_";

/// `report.xlsx` -> `processed_report.xlsx`. Any directory part of the
/// original name is dropped: `q1/report.xlsx` -> `processed_report.xlsx`.
pub fn output_name(original: &str) -> String {
    let base = original.rsplit(['/', '\\']).next().unwrap_or(original);
    format!("{}{}", OUTPUT_PREFIX, base)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFile {
    /// Name of the upload this came from.
    pub source_name: String,
    /// `processed_` + source name.
    pub name: String,
    pub bytes: Vec<u8>,
    pub stats: NormalizeStats,
}

#[derive(Debug)]
pub struct FailedFile {
    pub name: String,
    pub error: ScrubError,
}

#[derive(Debug)]
pub enum FileOutcome {
    Processed(ProcessedFile),
    Failed(FailedFile),
}

impl FileOutcome {
    pub fn source_name(&self) -> &str {
        match self {
            FileOutcome::Processed(file) => &file.source_name,
            FileOutcome::Failed(file) => &file.name,
        }
    }
}

/// Per-file results of one batch, in submission order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
}

/// Serializable summary of a failed file.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailureSummary {
    pub file: String,
    pub error: String,
}

impl BatchReport {
    pub fn submitted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn processed(&self) -> impl Iterator<Item = &ProcessedFile> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            FileOutcome::Processed(file) => Some(file),
            FileOutcome::Failed(_) => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = &FailedFile> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            FileOutcome::Failed(file) => Some(file),
            FileOutcome::Processed(_) => None,
        })
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    pub fn all_failed(&self) -> bool {
        self.processed().next().is_none()
    }

    pub fn failure_summaries(&self) -> Vec<FailureSummary> {
        self.failed()
            .map(|file| FailureSummary {
                file: file.name.clone(),
                error: file.error.to_string(),
            })
            .collect()
    }
}

/// Decode, normalize and re-encode one file.
pub fn process_file(file: &UploadedFile, rule: &Normalizer) -> Result<ProcessedFile, ScrubError> {
    let mut document = load_workbook(file)?;
    let stats = rule.apply_to_workbook(document.workbook_mut());
    let bytes = document.to_bytes()?;
    Ok(ProcessedFile {
        source_name: file.name.clone(),
        name: output_name(&file.name),
        bytes,
        stats,
    })
}

/// Process every file in order. A failing file is recorded and the batch
/// moves on to the next one.
pub fn process_batch(files: &[UploadedFile], rule: &Normalizer) -> BatchReport {
    let mut report = BatchReport::default();
    for file in files {
        report.record(&file.name, process_file(file, rule));
    }
    report.log_summary(rule);
    report
}

/// Like [`process_batch`] for files on disk. A path that cannot be read
/// counts as a failed file named after the path.
pub fn process_paths<P: AsRef<Path>>(paths: &[P], rule: &Normalizer) -> BatchReport {
    let mut report = BatchReport::default();
    for path in paths {
        let path = path.as_ref();
        match read_upload(path) {
            Ok(file) => report.record(&file.name, process_file(&file, rule)),
            Err(error) => report.record(&path.display().to_string(), Err(error)),
        }
    }
    report.log_summary(rule);
    report
}

impl BatchReport {
    fn record(&mut self, name: &str, result: Result<ProcessedFile, ScrubError>) {
        match result {
            Ok(processed) => {
                debug!(
                    "{}: {} of {} text cells changed",
                    name, processed.stats.changed_cells, processed.stats.text_cells
                );
                self.outcomes.push(FileOutcome::Processed(processed));
            }
            Err(error) => {
                warn!("{}: {}", name, error);
                self.outcomes.push(FileOutcome::Failed(FailedFile {
                    name: name.to_string(),
                    error,
                }));
            }
        }
    }

    fn log_summary(&self, rule: &Normalizer) {
        info!(
            "batch done: {} submitted, {} processed, {} failed (mode {})",
            self.submitted(),
            self.processed().count(),
            self.failed().count(),
            rule.mode()
        );
    }
}
