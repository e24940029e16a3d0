//! SpreadsheetML parts: workbook, worksheets, shared strings and styles.
//!
//! Each submodule both parses its part and writes it back, either from scratch or as a
//! patch over the original bytes.

mod date;
pub(crate) mod shared_strings;
pub(crate) mod styles;
pub(crate) mod workbook_xml;
pub(crate) mod worksheet;
pub(crate) mod worksheet_writer;

pub use date::{iso_to_serial, serial_to_iso};
