use thiserror::Error;

/// Everything that can go wrong while turning one uploaded file into its
/// processed counterpart.
#[derive(Debug, Error)]
pub enum ScrubError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("missing xlsx part: {0}")]
    MissingPart(String),
    #[error("invalid xlsx: {0}")]
    Invalid(String),
    #[error("xlsx part is too large to load safely: {part} is {size} bytes (max {max} bytes)")]
    PartTooLarge { part: String, size: u64, max: u64 },
    #[error("unsupported file type: {0} (only .xlsx workbooks are accepted)")]
    UnsupportedFormat(String),
    #[error("unsupported edit: {0}")]
    UnsupportedEdit(String),
}

pub type Result<T> = std::result::Result<T, ScrubError>;
