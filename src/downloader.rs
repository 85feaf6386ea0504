use crate::batch::{BatchReport, OUTPUT_PREFIX, ProcessedFile};
use crate::error::Result;
use crate::xlsx::XLSX_CONTENT_TYPE;
use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const ZIP_CONTENT_TYPE: &str = "application/zip";
/// Name of the archive entry listing the files that could not be processed.
pub const FAILURES_ENTRY: &str = "failures.json";

/// A ready-to-send response body.
#[derive(Debug, Clone, PartialEq)]
pub struct Download {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Turn a batch report into what the user downloads.
///
/// A single submitted file comes back standalone. Several submitted files
/// come back as one zip archive, with a failure manifest when anything
/// failed. Returns `None` when nothing could be processed.
pub fn prepare_download(report: &BatchReport, now: DateTime<Local>) -> Result<Option<Download>> {
    if report.all_failed() {
        return Ok(None);
    }

    if report.submitted() == 1 {
        return Ok(report.processed().next().map(|file| Download {
            file_name: file.name.clone(),
            content_type: XLSX_CONTENT_TYPE,
            bytes: file.bytes.clone(),
        }));
    }

    bundle_report(report, now)
}

/// Zip every processed file of the report, whatever the number submitted,
/// with a failure manifest when anything failed. Returns `None` when
/// nothing could be processed.
pub fn bundle_report(report: &BatchReport, now: DateTime<Local>) -> Result<Option<Download>> {
    if report.all_failed() {
        return Ok(None);
    }

    let files: Vec<&ProcessedFile> = report.processed().collect();
    let failures = if report.has_failures() {
        Some(serde_json::to_vec_pretty(&report.failure_summaries()).map_err(std::io::Error::from)?)
    } else {
        None
    };

    Ok(Some(Download {
        file_name: archive_name(now),
        content_type: ZIP_CONTENT_TYPE,
        bytes: bundle_zip(&files, failures.as_deref())?,
    }))
}

/// `processed_files_20240131_235959.zip`
pub fn archive_name(now: DateTime<Local>) -> String {
    format!("{}files_{}.zip", OUTPUT_PREFIX, now.format("%Y%m%d_%H%M%S"))
}

/// Pack processed files (and an optional failure manifest) into a zip.
/// Repeated names get a ` (2)`, ` (3)`, ... suffix before the extension.
pub fn bundle_zip(files: &[&ProcessedFile], failures: Option<&[u8]>) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);
    let mut used = HashSet::new();
    used.insert(FAILURES_ENTRY.to_lowercase());

    for file in files {
        let entry = unique_entry_name(&file.name, &mut used);
        zip.start_file(entry, options)?;
        zip.write_all(&file.bytes)?;
    }

    if let Some(failures) = failures {
        zip.start_file(FAILURES_ENTRY, options)?;
        zip.write_all(failures)?;
    }

    Ok(zip.finish()?.into_inner())
}

fn unique_entry_name(name: &str, used: &mut HashSet<String>) -> String {
    // zip entries use `/` as separator; keep only the file name
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    if used.insert(name.to_lowercase()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{} ({}){}", stem, n, ext);
        if used.insert(candidate.to_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}
