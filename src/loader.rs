use crate::error::{Result, ScrubError};
use crate::xlsx::XlsxDocument;
use std::fs;
use std::path::Path;

/// A named blob received from the user.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        UploadedFile {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Read a file from disk as an upload named after its final path component.
///
/// # Examples
/// ```no_run
/// use sheet_scrub::loader::read_upload;
///
/// match read_upload("report.xlsx") {
///     Ok(file) => println!("read {} ({} bytes)", file.name, file.bytes.len()),
///     Err(e) => eprintln!("Error reading file: {}", e),
/// }
/// ```
pub fn read_upload(filepath: impl AsRef<Path>) -> Result<UploadedFile> {
    let path = filepath.as_ref();
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string());
    let bytes = fs::read(path)?;
    Ok(UploadedFile { name, bytes })
}

/// Detect the file type from its name and decode it.
///
/// Only `.xlsx` workbooks are accepted; anything else is rejected before its
/// bytes are looked at.
pub fn load_workbook(file: &UploadedFile) -> Result<XlsxDocument> {
    let extension = Path::new(&file.name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("xlsx") => XlsxDocument::from_bytes(file.bytes.clone()),
        Some(ext) => Err(ScrubError::UnsupportedFormat(format!(".{}", ext))),
        None => Err(ScrubError::UnsupportedFormat(format!(
            "'{}' has no extension",
            file.name
        ))),
    }
}
