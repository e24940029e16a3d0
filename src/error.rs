//! Error and warning types for the xlpack library.

use std::io;
use thiserror::Error;

/// Result type alias for xlpack operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a read or write.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file is not a spreadsheet container.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Error reading or writing the ZIP archive.
    #[error("ZIP archive error: {0}")]
    ZipArchive(String),

    /// Error parsing XML content.
    #[error("XML parse error in {part}: {message}")]
    XmlParse {
        /// Part being parsed
        part: String,
        /// Parser message
        message: String,
    },

    /// A required part is absent from the container.
    #[error("Missing part: {0}")]
    MissingPart(String),

    /// A reference to an index or part that does not exist.
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Invalid or malformed data in the container.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The requested sheet does not exist.
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    /// A resource guard threshold was exceeded.
    #[error("Security limit exceeded: {0}")]
    Security(#[from] SecurityViolation),
}

impl Error {
    /// Build an XML parse error for a named part.
    pub fn xml(part: impl Into<String>, message: impl ToString) -> Self {
        Error::XmlParse {
            part: part.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error describes a structurally broken container.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedFormat(_)
                | Error::ZipArchive(_)
                | Error::XmlParse { .. }
                | Error::MissingPart(_)
                | Error::InvalidReference(_)
                | Error::InvalidData(_)
                | Error::SheetNotFound(_)
        )
    }

    /// Whether this error came from a resource guard.
    pub fn is_security(&self) -> bool {
        matches!(self, Error::Security(_))
    }
}

/// The guard that rejected a container.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SecurityViolation {
    /// An entry expands far beyond its compressed size.
    #[error("entry {part} has compression ratio {ratio:.1} (max {max})")]
    CompressionRatio {
        /// Entry name
        part: String,
        /// Observed ratio
        ratio: f64,
        /// Configured maximum
        max: f64,
    },

    /// Total uncompressed size of the container is too large.
    #[error("uncompressed size {total} exceeds {max} bytes")]
    UncompressedSize {
        /// Observed or declared total
        total: u64,
        /// Configured maximum
        max: u64,
    },

    /// Too many entries in the archive.
    #[error("archive has {count} entries (max {max})")]
    EntryCount {
        /// Observed count
        count: usize,
        /// Configured maximum
        max: usize,
    },

    /// Too many cells across the workbook.
    #[error("workbook has more than {max} cells")]
    CellCount {
        /// Configured maximum
        max: u64,
    },

    /// A single string is too long.
    #[error("string of {len} characters in {part} exceeds {max}")]
    StringLength {
        /// Part containing the string
        part: String,
        /// Observed length
        len: usize,
        /// Configured maximum
        max: usize,
    },

    /// The XML declares a DTD with entities or external identifiers.
    #[error("DTD declaration in {0} is not allowed")]
    ExternalEntity(String),
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Error::Io(e),
            other => Error::ZipArchive(other.to_string()),
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::xml("<unknown>", err)
    }
}

/// A non-fatal problem found while reading or writing.
///
/// Warnings are collected next to a best-effort result so the caller can decide whether
/// to proceed.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// A cell referenced a shared string beyond the table; the cell was read as empty.
    SharedStringOutOfRange {
        /// Sheet name
        sheet: String,
        /// Cell reference (A1)
        cell: String,
        /// Index found in the cell
        index: usize,
    },

    /// A cell referenced a style beyond `cellXfs`; the default style was used.
    StyleOutOfRange {
        /// Sheet name
        sheet: String,
        /// Cell reference (A1)
        cell: String,
        /// Index found in the cell
        index: u32,
    },

    /// A cell had a type attribute that is not part of SpreadsheetML.
    UnsupportedCellType {
        /// Sheet name
        sheet: String,
        /// Cell reference (A1)
        cell: String,
        /// Raw `t` attribute
        cell_type: String,
    },

    /// The source container changed on disk after it was read.
    SourceChanged {
        /// Path of the source container
        path: String,
    },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::SharedStringOutOfRange { sheet, cell, index } => write!(
                f,
                "{sheet}!{cell}: shared string index {index} out of range, read as empty"
            ),
            Warning::StyleOutOfRange { sheet, cell, index } => {
                write!(f, "{sheet}!{cell}: style index {index} out of range")
            }
            Warning::UnsupportedCellType {
                sheet,
                cell,
                cell_type,
            } => write!(f, "{sheet}!{cell}: unsupported cell type {cell_type:?}"),
            Warning::SourceChanged { path } => {
                write!(f, "{path} changed since it was read; regenerated from model")
            }
        }
    }
}
