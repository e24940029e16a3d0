//! Format detection for spreadsheet containers.

use crate::container::OoxmlContainer;
use crate::content_types::{
    ContentTypes, CONTENT_TYPES_PART, CT_WORKBOOK, CT_WORKBOOK_MACRO, CT_WORKBOOK_TEMPLATE,
};
use crate::error::{Error, Result};
use crate::security::SecurityLimits;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// ZIP file magic bytes: PK\x03\x04
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Detected spreadsheet container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatType {
    /// Excel workbook (.xlsx)
    Xlsx,
    /// Macro-enabled workbook (.xlsm)
    Xlsm,
}

impl FormatType {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            FormatType::Xlsx => "xlsx",
            FormatType::Xlsm => "xlsm",
        }
    }

    /// Returns a human-readable name for this format.
    pub fn name(&self) -> &'static str {
        match self {
            FormatType::Xlsx => "Excel Workbook",
            FormatType::Xlsm => "Excel Macro-Enabled Workbook",
        }
    }
}

impl std::fmt::Display for FormatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Detect the format type from a file path.
///
/// # Example
///
/// ```no_run
/// use xlpack::detect::detect_format_from_path;
///
/// let format = detect_format_from_path("book.xlsx")?;
/// println!("Detected format: {}", format);
/// # Ok::<(), xlpack::Error>(())
/// ```
pub fn detect_format_from_path(path: impl AsRef<Path>) -> Result<FormatType> {
    let mut magic = [0u8; 4];
    let mut file = File::open(path.as_ref())?;
    if file.read_exact(&mut magic).is_err() || magic != ZIP_MAGIC {
        return Err(Error::UnsupportedFormat("not a ZIP container".to_string()));
    }
    let mut container = OoxmlContainer::open(path, &SecurityLimits::default())?;
    detect_format_from_container(&mut container)
}

/// Detect the format type from a byte slice.
pub fn detect_format_from_bytes(data: &[u8]) -> Result<FormatType> {
    if !is_zip_file(data) {
        return Err(Error::UnsupportedFormat("not a ZIP container".to_string()));
    }
    let mut container = OoxmlContainer::from_bytes(data.to_vec(), &SecurityLimits::default())?;
    detect_format_from_container(&mut container)
}

/// Detect the format of an opened container.
///
/// The main-part content type decides; a package without `[Content_Types].xml` falls
/// back to the presence of `xl/workbook.xml`.
pub(crate) fn detect_format_from_container(container: &mut OoxmlContainer) -> Result<FormatType> {
    let content_types = match container.read_optional_xml(CONTENT_TYPES_PART)? {
        Some(xml) => ContentTypes::parse(&xml)?,
        None => {
            return if container.exists("xl/workbook.xml") {
                Ok(FormatType::Xlsx)
            } else {
                Err(Error::UnsupportedFormat(
                    "no spreadsheet workbook part".to_string(),
                ))
            };
        }
    };

    if content_types.has_override_type(CT_WORKBOOK_MACRO) {
        Ok(FormatType::Xlsm)
    } else if content_types.has_override_type(CT_WORKBOOK)
        || content_types.has_override_type(CT_WORKBOOK_TEMPLATE)
    {
        Ok(FormatType::Xlsx)
    } else if container.exists("xl/workbook.xml") {
        Ok(FormatType::Xlsx)
    } else {
        Err(Error::UnsupportedFormat(
            "container is not a spreadsheet".to_string(),
        ))
    }
}

/// Check if data starts with ZIP magic bytes.
pub fn is_zip_file(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == ZIP_MAGIC
}
