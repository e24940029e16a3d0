//! In-memory spreadsheet model.
//!
//! Cells, styles and sheets are plain values. A [`Workbook`] read from a container also
//! carries its [`SourceContext`](crate::SourceContext), and every edit made through the
//! workbook is recorded so the writer can keep unchanged parts byte-identical.

mod cell;
mod sheet;
mod style;
mod workbook;

pub use cell::*;
pub use sheet::*;
pub use style::*;
pub use workbook::*;
